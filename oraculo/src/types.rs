//! Shared error type for the engine crate.

use thiserror::Error;

use crate::index::IndexError;

/// Errors surfaced by extraction, embedding, retrieval, and persistence.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration is missing or invalid (bad env values, absent credential).
    #[error("configuration error: {0}")]
    Config(String),

    /// A training record could not be turned into normalized documents.
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// The embedding service rejected the request or returned a bad payload.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// The chat completion service rejected the request or returned a bad payload.
    #[error("completion failed: {0}")]
    Completion(String),

    /// Persisted index artifacts could not be loaded or written.
    #[error(transparent)]
    Index(#[from] IndexError),

    /// The relational record store failed.
    #[error("storage error: {0}")]
    Storage(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<tokio_rusqlite::Error> for EngineError {
    fn from(err: tokio_rusqlite::Error) -> Self {
        EngineError::Storage(err.to_string())
    }
}

impl From<tokio_rusqlite::rusqlite::Error> for EngineError {
    fn from(err: tokio_rusqlite::rusqlite::Error) -> Self {
        EngineError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Storage(err.to_string())
    }
}
