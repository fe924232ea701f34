//! Error types for the document engine

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for document operations
pub type Result<T> = std::result::Result<T, DocumentError>;

/// Errors that can occur while opening, editing, saving, or resolving a document
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The package is not a directory or lacks its descriptor entry.
    /// A corrupted document cannot be opened.
    #[error("Document at {path} is corrupted: {reason}")]
    Corrupted { path: PathBuf, reason: String },

    #[error("Index {index} out of range (length: {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Coordinated access to {path} failed: {reason}")]
    Coordination { path: PathBuf, reason: String },

    #[error("Version store error: {0}")]
    Version(String),

    #[error("Document already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("Document is not open: {0}")]
    NotOpen(PathBuf),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "watch")]
    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Background task failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl DocumentError {
    /// True for failures that leave the document unopenable
    pub fn is_fatal(&self) -> bool {
        matches!(self, DocumentError::Corrupted { .. })
    }
}
