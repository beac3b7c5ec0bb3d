use std::path::{Path, PathBuf};

use ignore::WalkBuilder;

use crate::token::TokenExtractor;

/// Walks a project directory collecting the source files the bundled
/// extractor can process. Respects `.gitignore` and skips hidden files.
pub struct FileScanner {
    root: PathBuf,
}

impl FileScanner {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Returns the supported source files under the root, sorted.
    pub fn scan(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for entry in WalkBuilder::new(&self.root).build() {
            match entry {
                Ok(entry) => {
                    if !entry.file_type().is_some_and(|t| t.is_file()) {
                        continue;
                    }
                    let path = entry.into_path();
                    let ext = path
                        .extension()
                        .and_then(|ext| ext.to_str())
                        .unwrap_or("");
                    if TokenExtractor::supports(ext) {
                        files.push(path);
                    }
                }
                Err(err) => log::warn!("Scan error under {}: {err}", self.root.display()),
            }
        }
        files.sort();
        files
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_supported_sources_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/Foo.scala"), "object Foo {}").unwrap();
        std::fs::write(dir.path().join("src/Bar.java"), "class Bar {}").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "nope").unwrap();

        let files = FileScanner::new(dir.path()).scan();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_owned())
            .collect();
        assert_eq!(names, vec!["Bar.java", "Foo.scala"]);
    }
}
