use std::path::PathBuf;

use defmap_model::{Access, Error, Flavor, GlobalRef, Kind, Result, Source};

use crate::writer::Writer;

/// A crude keyword-and-brace extractor for C-like languages. It
/// understands just enough lexical structure (comments, string literals,
/// block nesting, `package`/`namespace` declarations, def keywords) to
/// build the def hierarchy of a source file; every def it emits is
/// exported, public and flavorless. Real language frontends plug in at
/// the [`Writer`] seam instead.
#[derive(Default)]
pub struct TokenExtractor;

impl TokenExtractor {
    pub fn new() -> Self {
        Self
    }

    /// True if sources with extension `ext` can be processed.
    pub fn supports(ext: &str) -> bool {
        kinds_for(ext).is_some()
    }

    /// Processes each file in `paths` as one compilation unit. A unit
    /// that fails with a non-fatal error is logged and skipped; the
    /// session continues.
    pub fn process_files<I>(&self, paths: I, writer: &mut dyn Writer) -> Result<()>
    where
        I: IntoIterator<Item = PathBuf>,
    {
        writer.open_session()?;
        for path in paths {
            let source = Source::file(path.to_string_lossy());
            let code = match std::fs::read_to_string(&path) {
                Ok(code) => code,
                Err(e) => {
                    log::warn!("Failed to read {}: {e}", path.display());
                    continue;
                }
            };
            if let Err(e) = self.process_source(&source, &code, writer) {
                if e.is_fatal() {
                    return Err(e);
                }
                log::warn!("Skipping unit {source}: {e}");
                writer.abort_unit();
            }
        }
        writer.close_session()
    }

    /// Processes `code` as the contents of `file` in a one-unit session.
    pub fn process_str(&self, file: &str, code: &str, writer: &mut dyn Writer) -> Result<()> {
        writer.open_session()?;
        match self.process_source(&Source::file(file), code, writer) {
            Ok(()) => writer.close_session(),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                writer.abort_unit();
                writer.close_session()?;
                Err(e)
            }
        }
    }

    fn process_source(&self, source: &Source, code: &str, writer: &mut dyn Writer) -> Result<()> {
        let lang = source.file_ext().to_owned();
        let kinds = kinds_for(&lang)
            .ok_or_else(|| Error::Protocol(format!("unsupported language: {lang}")))?;

        // treat # as a line comment starter in C# so that we ignore
        // compiler directives
        let toks = tokenize(code, lang == "cs");

        writer.open_unit(source)?;

        let mut prevtok = String::new();
        // a def we have opened whose block (if any) we have not yet seen
        let mut curdef = false;
        let mut curid = GlobalRef::root();
        // for each open brace, whether it is the block of a def
        let mut blocks: Vec<bool> = Vec::new();

        let mut i = 0;
        while i < toks.len() {
            match &toks[i] {
                Tok::Punct { ch: '{', .. } => {
                    blocks.push(curdef);
                    curdef = false;
                    prevtok.clear();
                }
                Tok::Punct { ch: '}', offset } => {
                    // we may open a def with no block and then exit the
                    // enclosing block; that also exits the def
                    if curdef {
                        writer.close_def()?;
                        curid = parent_of(&curid);
                        curdef = false;
                    }
                    match blocks.pop() {
                        None => log::warn!(
                            "Mismatched close brace [source={source}, offset={offset}]"
                        ),
                        Some(true) => {
                            writer.close_def()?;
                            curid = parent_of(&curid);
                        }
                        Some(false) => {}
                    }
                    prevtok.clear();
                }
                Tok::Word { text, offset } => {
                    if prevtok == "package" || prevtok == "namespace" {
                        curid = curid.plus(text);
                        writer.open_def(
                            &curid,
                            text,
                            Kind::Module,
                            Flavor::None,
                            true,
                            Access::Public,
                            *offset,
                            *offset,
                            *offset,
                        )?;
                        curdef = true;
                        // a `package foo;` (or a scala package with no
                        // braces) makes the rest of the file its block
                        let next_semi = matches!(toks.get(i + 1), Some(Tok::Punct { ch: ';', .. }));
                        let next_brace = matches!(toks.get(i + 1), Some(Tok::Punct { ch: '{', .. }));
                        if next_semi || (lang == "scala" && !next_brace) {
                            blocks.push(true);
                            curdef = false;
                        }
                    } else if let Some(kind) = kind_of(kinds, &prevtok) {
                        // a def directly after a blockless def exits it
                        if curdef {
                            writer.close_def()?;
                            curid = parent_of(&curid);
                        }
                        curid = curid.plus(text);
                        writer.open_def(
                            &curid,
                            text,
                            kind,
                            Flavor::None,
                            true,
                            Access::Public,
                            *offset,
                            *offset,
                            *offset,
                        )?;
                        curdef = true;
                    }
                    prevtok.clear();
                    prevtok.push_str(text);
                }
                Tok::Punct { .. } => prevtok.clear(),
            }
            i += 1;
        }

        // close whatever is still dangling at end of file
        if curdef {
            writer.close_def()?;
            curid = parent_of(&curid);
        }
        while let Some(was_def) = blocks.pop() {
            if was_def {
                writer.close_def()?;
                curid = parent_of(&curid);
            }
        }

        writer.close_unit()
    }
}

fn parent_of(gref: &GlobalRef) -> GlobalRef {
    gref.parent().cloned().unwrap_or_else(GlobalRef::root)
}

/// Tokens that appear prior to an element declaration, by language.
fn kinds_for(ext: &str) -> Option<&'static [(&'static str, Kind)]> {
    match ext {
        "scala" => Some(&[
            ("class", Kind::Type),
            ("object", Kind::Module),
            ("trait", Kind::Type),
            ("def", Kind::Func),
            ("val", Kind::Value),
            ("var", Kind::Value),
        ]),
        "java" => Some(&[
            ("class", Kind::Type),
            ("interface", Kind::Type),
            ("enum", Kind::Type),
        ]),
        "cs" => Some(&[
            ("class", Kind::Type),
            ("interface", Kind::Type),
            ("enum", Kind::Type),
            ("struct", Kind::Type),
        ]),
        "as" => Some(&[("class", Kind::Type), ("interface", Kind::Type)]),
        _ => None,
    }
}

fn kind_of(kinds: &[(&str, Kind)], word: &str) -> Option<Kind> {
    kinds
        .iter()
        .find(|(kw, _)| *kw == word)
        .map(|&(_, kind)| kind)
}

enum Tok {
    Word { text: String, offset: u32 },
    Punct { ch: char, offset: u32 },
}

fn is_word_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_' || ch == '$'
}

fn is_word_part(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ch == '$' || ch == '.'
}

/// Splits `code` into word and punctuation tokens with character
/// offsets, skipping whitespace, comments and quoted literals.
fn tokenize(code: &str, hash_comments: bool) -> Vec<Tok> {
    let chars: Vec<char> = code.chars().collect();
    let mut toks = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        if ch.is_whitespace() {
            i += 1;
        } else if ch == '/' && chars.get(i + 1) == Some(&'/') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
        } else if ch == '/' && chars.get(i + 1) == Some(&'*') {
            i += 2;
            while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                i += 1;
            }
            i = (i + 2).min(chars.len());
        } else if hash_comments && ch == '#' {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
        } else if ch == '"' || ch == '\'' {
            let quote = ch;
            i += 1;
            while i < chars.len() && chars[i] != quote && chars[i] != '\n' {
                if chars[i] == '\\' {
                    i += 1;
                }
                i += 1;
            }
            i += 1;
        } else if is_word_start(ch) {
            let start = i;
            while i < chars.len() && is_word_part(chars[i]) {
                i += 1;
            }
            toks.push(Tok::Word {
                text: chars[start..i].iter().collect(),
                offset: start as u32,
            });
        } else {
            toks.push(Tok::Punct {
                ch,
                offset: i as u32,
            });
            i += 1;
        }
    }
    toks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::TextWriter;

    const TESTA: &str = "package com.test\n\
                         \n\
                         object Foo {\n\
                         \x20 class Bar {\n\
                         \x20   def baz () {}\n\
                         \x20   val BAZ = 1\n\
                         \x20 }\n\
                         \x20 trait Bippy {\n\
                         \x20   def bangle ()\n\
                         \x20 }\n\
                         \x20 def fiddle (foo :Int, bar :Int) = monkey\n\
                         }\n";

    #[test]
    fn nested_defs_come_out_balanced() {
        let ex = TokenExtractor::new();
        let mut out = TextWriter::new(Vec::new());
        ex.process_str("TestA.scala", TESTA, &mut out).unwrap();
        let text = String::from_utf8(out.into_inner()).unwrap();

        assert!(text.contains("def com.test\n"));
        assert!(text.contains("def com.test Foo\n"));
        assert!(text.contains("def com.test Foo Bar\n"));
        assert!(text.contains("def com.test Foo Bar baz\n"));
        assert!(text.contains("def com.test Foo Bar BAZ\n"));
        assert!(text.contains("def com.test Foo Bippy bangle\n"));
        assert!(text.contains("def com.test Foo fiddle\n"));
        // parameters are not defs for this extractor
        assert!(!text.contains("def com.test Foo fiddle foo\n"));
    }

    #[test]
    fn comments_and_strings_are_skipped() {
        let code = "package com.test\n\
                    // class NotReal {\n\
                    /* class AlsoNot { */\n\
                    object S { val s = \"class Fake {\" }\n";
        let ex = TokenExtractor::new();
        let mut out = TextWriter::new(Vec::new());
        ex.process_str("S.scala", code, &mut out).unwrap();
        let text = String::from_utf8(out.into_inner()).unwrap();

        assert!(text.contains("def com.test S\n"));
        assert!(!text.contains("NotReal"));
        assert!(!text.contains("AlsoNot"));
        assert!(!text.contains("Fake"));
    }

    #[test]
    fn unsupported_language_is_an_error() {
        let ex = TokenExtractor::new();
        let mut out = TextWriter::new(Vec::new());
        let err = ex.process_str("main.rs", "fn main() {}", &mut out).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn name_offsets_point_at_the_name_token() {
        let code = "package pkg\nobject Foo {}\n";
        let ex = TokenExtractor::new();
        let mut out = TextWriter::new(Vec::new());
        ex.process_str("Foo.scala", code, &mut out).unwrap();
        let text = String::from_utf8(out.into_inner()).unwrap();

        let pkg_off = code.find("pkg").unwrap();
        let foo_off = code.find("Foo").unwrap();
        assert!(text.contains(&format!("offset {pkg_off}\n")));
        assert!(text.contains(&format!("offset {foo_off}\n")));
    }
}
