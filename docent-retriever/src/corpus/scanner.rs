//! Corpus discovery: every supported file under the corpus root.

use crate::error::{Result, RetrieverError};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Category given to files that sit directly in the corpus root.
pub const ROOT_CATEGORY: &str = ".";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SourceKind {
    PlainText,
    Pdf,
}

impl SourceKind {
    /// Classify a path by extension; `None` for unsupported files.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref()
        {
            Some("txt") | Some("md") | Some("markdown") => Some(SourceKind::PlainText),
            Some("pdf") => Some(SourceKind::Pdf),
            _ => None,
        }
    }
}

/// A supported document discovered under the corpus root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFile {
    pub absolute_path: PathBuf,
    /// Path relative to the corpus root, `/`-joined
    pub relative_path: String,
    /// Containing directory of `relative_path`, or `"."` at the root
    pub category: String,
    pub kind: SourceKind,
}

impl SourceFile {
    pub fn filename(&self) -> &str {
        self.relative_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.relative_path)
    }
}

fn to_slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn category_of(relative: &Path) -> String {
    match relative.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => to_slash_path(parent),
        _ => ROOT_CATEGORY.to_string(),
    }
}

/// Recursively list the supported files under `root`, sorted by relative path.
///
/// Hidden files and ignore files are not special: every file is visited.
/// Unsupported extensions are skipped silently.
pub fn scan(root: &Path) -> Result<Vec<SourceFile>> {
    let root = &std::fs::canonicalize(root).map_err(|e| RetrieverError::io(root, e))?;
    let metadata = std::fs::metadata(root).map_err(|e| RetrieverError::io(root, e))?;
    if !metadata.is_dir() {
        return Err(RetrieverError::io(
            root,
            std::io::Error::new(std::io::ErrorKind::NotADirectory, "corpus root is not a directory"),
        ));
    }

    let mut files = Vec::new();
    let walker = ignore::WalkBuilder::new(root)
        .standard_filters(false)
        .follow_links(false)
        .build();

    for entry in walker {
        let entry = entry.map_err(|e| {
            RetrieverError::io(root, std::io::Error::other(e.to_string()))
        })?;
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }

        let path = entry.path();
        let Some(kind) = SourceKind::from_path(path) else {
            debug!("Skipping unsupported file {}", path.display());
            continue;
        };

        let relative = path.strip_prefix(root).unwrap_or(path);
        files.push(SourceFile {
            absolute_path: path.to_path_buf(),
            relative_path: to_slash_path(relative),
            category: category_of(relative),
            kind,
        });
    }

    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    debug!("Scanned {} supported files under {}", files.len(), root.display());
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_scan_classifies_and_categorizes() -> anyhow::Result<()> {
        let dir = tempdir()?;
        std::fs::create_dir_all(dir.path().join("animals/mammals"))?;
        std::fs::write(dir.path().join("animals/mammals/cats.txt"), "Cats purr.")?;
        std::fs::write(dir.path().join("animals/guide.pdf"), b"%PDF-1.4")?;
        std::fs::write(dir.path().join("readme.md"), "# Docs")?;
        std::fs::write(dir.path().join("image.png"), [0u8; 4])?;
        std::fs::write(dir.path().join(".hidden.txt"), "still indexed")?;

        let files = scan(dir.path())?;
        let summary: Vec<(&str, &str, SourceKind)> = files
            .iter()
            .map(|f| (f.relative_path.as_str(), f.category.as_str(), f.kind))
            .collect();

        assert_eq!(
            summary,
            vec![
                (".hidden.txt", ".", SourceKind::PlainText),
                ("animals/guide.pdf", "animals", SourceKind::Pdf),
                ("animals/mammals/cats.txt", "animals/mammals", SourceKind::PlainText),
                ("readme.md", ".", SourceKind::PlainText),
            ]
        );
        assert_eq!(files[2].filename(), "cats.txt");
        Ok(())
    }

    #[test]
    fn test_scan_empty_directory() -> anyhow::Result<()> {
        let dir = tempdir()?;
        assert!(scan(dir.path())?.is_empty());
        Ok(())
    }

    #[test]
    fn test_scan_missing_root() {
        let err = scan(Path::new("/nonexistent/docent/docs")).unwrap_err();
        assert!(matches!(err, RetrieverError::Io { .. }));
    }

    #[test]
    fn test_extension_case_insensitive() {
        assert_eq!(SourceKind::from_path(Path::new("A.PDF")), Some(SourceKind::Pdf));
        assert_eq!(SourceKind::from_path(Path::new("notes")), None);
        assert_eq!(SourceKind::from_path(Path::new(".docent-cache.json")), None);
    }
}
