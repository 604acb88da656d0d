//! Discovering PDFs under a source directory and extracting their text.

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use serde_json::json;
use walkdir::WalkDir;

use crate::documents::{Document, Metadata, SOURCE_KEY};

/// Loads every `.pdf` under `root` (recursively, sorted by path) as one [`Document`].
/// Files with no extractable text are skipped with a warning; if nothing is left the
/// load fails with [`LoadError::NoDocuments`].
pub fn load_pdf_dir(root: &Path) -> Result<Vec<Document>, LoadError> {
    if !root.is_dir() {
        return Err(LoadError::NotADirectory(root.to_path_buf()));
    }
    let mut docs = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e))
    {
        let entry = entry.map_err(|e| LoadError::Walk(e.to_string()))?;
        let path = entry.path();
        if !is_pdf(path) || !entry.file_type().is_file() {
            continue;
        }
        let text = extract_text(path)?;
        if text.trim().is_empty() {
            tracing::warn!(path = %path.display(), "no extractable text, skipping");
            continue;
        }
        tracing::debug!(path = %path.display(), chars = text.chars().count(), "loaded pdf");
        docs.push(Document::new(text, provenance(path)));
    }
    if docs.is_empty() {
        return Err(LoadError::NoDocuments(root.to_path_buf()));
    }
    tracing::info!(count = docs.len(), root = %root.display(), "loaded documents");
    Ok(docs)
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| e.eq_ignore_ascii_case("pdf"))
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

/// pdf-extract can panic on malformed fonts; turn that into an error for this file.
fn extract_text(path: &Path) -> Result<String, LoadError> {
    match panic::catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text(path))) {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(LoadError::Extract {
            path: path.to_path_buf(),
            message: e.to_string(),
        }),
        Err(_) => Err(LoadError::Extract {
            path: path.to_path_buf(),
            message: "parser panicked".to_string(),
        }),
    }
}

fn provenance(path: &Path) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert(SOURCE_KEY.into(), json!(path.to_string_lossy()));
    if let Some(name) = path.file_name() {
        metadata.insert("file_name".into(), json!(name.to_string_lossy()));
    }
    metadata
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("walk error: {0}")]
    Walk(String),
    #[error("failed to extract text from {path}: {message}")]
    Extract { path: PathBuf, message: String },
    #[error("no PDF with extractable text under {0}")]
    NoDocuments(PathBuf),
}
