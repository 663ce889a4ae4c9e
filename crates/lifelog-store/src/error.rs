//! Error types for lifelog-store.

use std::path::PathBuf;

/// Result type for lifelog-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in lifelog-store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database error from SQLite.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failed to create database directory.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The persisted queue blob could not be decoded.
    #[error("Corrupt queue blob: {0}")]
    CorruptQueue(serde_json::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
