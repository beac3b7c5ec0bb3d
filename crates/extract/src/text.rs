use std::io::Write as IoWrite;

use defmap_model::{Access, Flavor, GlobalRef, Kind, Relation, Result, Source};

use crate::writer::Writer;

/// A [`Writer`] that renders the event stream as indented text. Useful
/// for eyeballing extractor output and for tests that assert on emitted
/// events without standing up a store.
pub struct TextWriter<W: IoWrite> {
    out: W,
    indent: usize,
}

impl<W: IoWrite> TextWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out, indent: 0 }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, key: &str, value: impl std::fmt::Display) -> Result<()> {
        writeln!(
            self.out,
            "{:indent$}{key} {value}",
            "",
            indent = self.indent
        )?;
        Ok(())
    }

    fn emit2(
        &mut self,
        key: &str,
        v1: impl std::fmt::Display,
        v2: impl std::fmt::Display,
    ) -> Result<()> {
        writeln!(
            self.out,
            "{:indent$}{key} {v1} {v2}",
            "",
            indent = self.indent
        )?;
        Ok(())
    }
}

impl<W: IoWrite> Writer for TextWriter<W> {
    fn open_session(&mut self) -> Result<()> {
        Ok(())
    }

    fn open_unit(&mut self, source: &Source) -> Result<()> {
        self.emit("unit", source)?;
        self.indent += 1;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn open_def(
        &mut self,
        id: &GlobalRef,
        name: &str,
        kind: Kind,
        flavor: Flavor,
        exported: bool,
        access: Access,
        offset: u32,
        body_start: u32,
        body_end: u32,
    ) -> Result<()> {
        self.emit("def", id)?;
        self.emit("name", name)?;
        self.emit("kind", kind)?;
        self.emit("flavor", flavor)?;
        self.emit("exported", exported)?;
        self.emit("access", access)?;
        self.emit("offset", offset)?;
        self.emit2("body", body_start, body_end)?;
        self.indent += 1;
        Ok(())
    }

    fn emit_sig(&mut self, text: &str) -> Result<()> {
        self.emit("sig", text.replace('\n', "\t"))
    }

    fn emit_sig_use(
        &mut self,
        target: &GlobalRef,
        kind: Kind,
        offset: u32,
        length: u32,
    ) -> Result<()> {
        self.emit2("siguse", "target", target)?;
        self.emit2("siguse", "kind", kind)?;
        self.emit2("siguse", "offset", offset)?;
        self.emit2("siguse", "length", length)
    }

    fn emit_doc(&mut self, offset: u32, length: u32) -> Result<()> {
        self.emit2("doc", "offset", offset)?;
        self.emit2("doc", "length", length)
    }

    fn emit_doc_use(
        &mut self,
        target: &GlobalRef,
        kind: Kind,
        offset: u32,
        length: u32,
    ) -> Result<()> {
        self.emit2("docuse", "target", target)?;
        self.emit2("docuse", "kind", kind)?;
        self.emit2("docuse", "offset", offset)?;
        self.emit2("docuse", "length", length)
    }

    fn emit_relation(&mut self, relation: Relation, target: &GlobalRef) -> Result<()> {
        self.emit2("relation", relation, target)
    }

    fn emit_use(&mut self, target: &GlobalRef, kind: Kind, offset: u32, length: u32) -> Result<()> {
        self.emit2("use", "target", target)?;
        self.emit2("use", "kind", kind)?;
        self.emit2("use", "offset", offset)?;
        self.emit2("use", "length", length)
    }

    fn close_def(&mut self) -> Result<()> {
        self.indent -= 1;
        Ok(())
    }

    fn close_unit(&mut self) -> Result<()> {
        self.indent -= 1;
        Ok(())
    }

    fn close_session(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}
