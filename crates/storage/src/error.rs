//! Storage area errors.

use kvarea_core::{KeyError, ValueError};
use kvarea_engine::EngineError;
use thiserror::Error;

/// Errors surfaced by storage area operations.
///
/// Cloneable because a single connection attempt or iterator step may be
/// awaited by several callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error(transparent)]
    InvalidKey(#[from] KeyError),

    #[error("Connection error: {0}")]
    Connection(EngineError),

    #[error("kv-storage: database \"{database}\" corrupted")]
    Corrupted { database: String },

    #[error("Transaction error: {0}")]
    Transaction(#[from] EngineError),

    #[error("Deletion error: {0}")]
    Deletion(EngineError),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<ValueError> for StorageError {
    fn from(err: ValueError) -> Self {
        match err {
            ValueError::Serialization(msg) => StorageError::Serialization(msg),
        }
    }
}

/// Result type for storage area operations.
pub type Result<T> = std::result::Result<T, StorageError>;
