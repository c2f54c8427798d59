//! Error types for the tree store.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading a serialized tree.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Malformed schema header: {0}")]
    MalformedHeader(String),

    #[error("Unsupported schema version: {0}")]
    UnsupportedVersion(u32),

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by nodes, documents and containers.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Node is read-only: {0}")]
    ReadOnly(String),

    #[error("Node not found: {0}")]
    NotFound(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<config::ConfigError> for StorageError {
    fn from(err: config::ConfigError) -> Self {
        StorageError::ConfigError(err.to_string())
    }
}
