//! Source documents for the corpus.
//!
//! A corpus is a flat directory of text files. Each file is one document,
//! identified by its file name.

use crate::error::{RagEvalError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// A single source document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// File name, used as the document's name in chunk records.
    pub name: String,
    /// Original file path (if loaded from file).
    pub path: Option<PathBuf>,
    /// Full text content.
    pub content: String,
}

impl Document {
    /// Create a document from raw text content.
    pub fn from_text(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
            content: content.into(),
        }
    }

    /// Load a text file as a document.
    pub fn from_text_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| RagEvalError::io(path, e))?;

        let name = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("untitled")
            .to_string();

        Ok(Self {
            name,
            path: Some(path.to_path_buf()),
            content,
        })
    }

    /// Length in characters (Unicode scalar values).
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

/// Load every regular file directly inside `dir`, ordered by file name.
pub fn load_corpus(dir: &Path) -> Result<Vec<Document>> {
    if !dir.is_dir() {
        return Err(RagEvalError::InvalidCorpusPath(dir.to_path_buf()));
    }

    let mut documents = Vec::new();

    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dir).to_path_buf();
            match e.into_io_error() {
                Some(source) => RagEvalError::io(path, source),
                None => RagEvalError::InvalidCorpusPath(path),
            }
        })?;

        if !entry.file_type().is_file() {
            continue;
        }

        let document = Document::from_text_file(entry.path())?;
        debug!(name = %document.name, chars = document.char_len(), "loaded document");
        documents.push(document);
    }

    if documents.is_empty() {
        return Err(RagEvalError::EmptyCorpus(dir.to_path_buf()));
    }

    Ok(documents)
}
