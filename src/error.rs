//! Error types for the RAG evaluator.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our custom error.
pub type Result<T> = std::result::Result<T, RagEvalError>;

/// Errors that can occur while indexing, retrieving or evaluating.
#[derive(Error, Debug)]
pub enum RagEvalError {
    /// Error reading or writing files.
    #[error("I/O error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error during serialization/deserialization.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The corpus directory does not exist or is not a directory.
    #[error("Corpus path '{0}' does not exist or is not a directory")]
    InvalidCorpusPath(PathBuf),

    /// No documents found in the corpus.
    #[error("No documents found in corpus at '{0}'")]
    EmptyCorpus(PathBuf),

    /// The index file does not exist.
    #[error("Index file not found at '{0}'")]
    IndexNotFound(PathBuf),

    /// Some other artifact a stage depends on does not exist.
    #[error("Artifact not found at '{0}'. Run the producing stage first.")]
    ArtifactNotFound(PathBuf),

    /// Invalid configuration: bad chunk stride, top-k out of range, empty batch.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Inconsistent data: row counts, dimensions or degenerate vectors.
    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    /// A metric is undefined for its inputs.
    #[error("Metrics domain error: {0}")]
    MetricsDomain(String),

    /// A query identifier was written twice to the results collection.
    #[error("Query {0} already has a result")]
    DuplicateQuery(u64),

    /// Generation or judge oracle failure.
    #[error("Oracle call failed: {0}")]
    Oracle(String),

    /// Embedding gateway failure.
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// LLM API error.
    #[error("LLM API error: {0}")]
    LlmApi(String),

    /// LLM response parsing error.
    #[error("Failed to parse LLM response: {0}")]
    LlmParse(String),

    /// HTTP request error.
    #[error("HTTP request failed: {0}")]
    Http(String),
}

impl RagEvalError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<reqwest::Error> for RagEvalError {
    fn from(err: reqwest::Error) -> Self {
        RagEvalError::Http(err.to_string())
    }
}

impl From<serde_json::Error> for RagEvalError {
    fn from(err: serde_json::Error) -> Self {
        RagEvalError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = RagEvalError::DuplicateQuery(7);
        assert_eq!(err.to_string(), "Query 7 already has a result");

        let err = RagEvalError::Config("chunk overlap must be smaller than chunk size".into());
        assert!(err.to_string().starts_with("Configuration error"));
    }
}
