use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::time::UNIX_EPOCH;

/// The places source code comes from: a file in the file system, or an
/// entry inside an archive file (zip, jar, etc.).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Source {
    /// A source file, identified by its absolute path.
    File { path: String },
    /// A source file inside an archive, identified by the archive's
    /// absolute path and the entry path within it.
    ArchiveEntry {
        archive_path: String,
        entry_path: String,
    },
}

impl Source {
    pub fn file(path: impl Into<String>) -> Source {
        Source::File { path: path.into() }
    }

    pub fn archive_entry(archive_path: impl Into<String>, entry_path: impl Into<String>) -> Source {
        Source::ArchiveEntry {
            archive_path: archive_path.into(),
            entry_path: entry_path.into(),
        }
    }

    /// Parses the serialized form produced by `Display`: a plain path, or
    /// `<archive>!<entry>`. A leading `/` on the entry path is stripped;
    /// some producers prepend one and it never belongs there.
    pub fn from_string(s: &str) -> Source {
        match s.find('!') {
            None => Source::file(s),
            Some(eidx) => {
                let archive = &s[..eidx];
                let entry = s[eidx + 1..].trim_start_matches('/');
                Source::archive_entry(archive, entry)
            }
        }
    }

    fn entry(&self) -> &str {
        match self {
            Source::File { path } => path,
            Source::ArchiveEntry { entry_path, .. } => entry_path,
        }
    }

    fn path_separator(&self) -> char {
        match self {
            Source::File { .. } => std::path::MAIN_SEPARATOR,
            // zip entry paths always use '/'
            Source::ArchiveEntry { .. } => '/',
        }
    }

    /// The name of the file represented by this source.
    pub fn file_name(&self) -> &str {
        let path = self.entry();
        match path.rfind(self.path_separator()) {
            Some(idx) => &path[idx + 1..],
            None => path,
        }
    }

    /// The extension of the file represented by this source, or "" if it
    /// has none.
    pub fn file_ext(&self) -> &str {
        let path = self.entry();
        match path.rfind('.') {
            Some(didx) => &path[didx + 1..],
            None => "",
        }
    }

    /// The path to this source with `root` stripped from it, if applicable.
    pub fn relative_path(&self, root: &str) -> &str {
        let mut path = self.entry();
        if let Some(rest) = path.strip_prefix(root) {
            path = rest;
        }
        path.strip_prefix(self.path_separator()).unwrap_or(path)
    }

    /// Last-modified time of the backing file, in millis since the epoch.
    pub fn last_modified(&self) -> io::Result<i64> {
        let path = match self {
            Source::File { path } => path,
            Source::ArchiveEntry { archive_path, .. } => archive_path,
        };
        let modified = std::fs::metadata(Path::new(path))?.modified()?;
        let since = modified
            .duration_since(UNIX_EPOCH)
            .map_err(|e| io::Error::other(e.to_string()))?;
        Ok(since.as_millis() as i64)
    }

    /// Opens a reader over the contents of this source. Archive entries
    /// are not readable in this build.
    pub fn reader(&self) -> io::Result<Box<dyn Read>> {
        match self {
            Source::File { path } => Ok(Box::new(File::open(path)?)),
            Source::ArchiveEntry { archive_path, .. } => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("archive sources are not readable: {archive_path}"),
            )),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::File { path } => f.write_str(path),
            Source::ArchiveEntry {
                archive_path,
                entry_path,
            } => write!(f, "{archive_path}!{entry_path}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn file_round_trips() {
        let src = Source::file("/code/proj/Foo.java");
        assert_eq!(src.to_string(), "/code/proj/Foo.java");
        assert_eq!(Source::from_string("/code/proj/Foo.java"), src);
    }

    #[test]
    fn archive_entry_round_trips() {
        let src = Source::archive_entry("/deps/lib-sources.jar", "com/test/Foo.java");
        assert_eq!(src.to_string(), "/deps/lib-sources.jar!com/test/Foo.java");
        assert_eq!(
            Source::from_string("/deps/lib-sources.jar!com/test/Foo.java"),
            src
        );
    }

    #[test]
    fn leading_slash_on_entry_is_stripped() {
        assert_eq!(
            Source::from_string("/deps/lib.jar!/com/test/Foo.java"),
            Source::archive_entry("/deps/lib.jar", "com/test/Foo.java")
        );
    }

    #[test]
    fn name_and_ext() {
        let src = Source::archive_entry("/deps/lib.jar", "com/test/Foo.java");
        assert_eq!(src.file_name(), "Foo.java");
        assert_eq!(src.file_ext(), "java");
        assert_eq!(Source::file("README").file_ext(), "");
    }

    #[test]
    fn relative_path_strips_root() {
        let src = Source::file("/code/proj/src/Foo.java");
        assert_eq!(src.relative_path("/code/proj"), "src/Foo.java");
        assert_eq!(src.relative_path("/elsewhere"), "/code/proj/src/Foo.java");
    }
}
