//! Engine errors.

use kvarea_core::KeyError;
use thiserror::Error;

/// Errors reported by the engine.
///
/// Cloneable so that a failed open can be handed to every caller waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Invalid version {0}: versions start at 1")]
    InvalidVersion(u32),

    #[error("Requested version {requested} is lower than the existing version {existing}")]
    VersionError { requested: u32, existing: u32 },

    #[error("Database {0} is blocked by connections that did not close")]
    Blocked(String),

    #[error("Object store not found: {0}")]
    StoreNotFound(String),

    #[error("Constraint error: {0}")]
    Constraint(String),

    #[error("Transaction is read-only")]
    ReadOnly,

    #[error("Database connection is closed")]
    Closed,

    #[error("Data error: {0}")]
    Data(#[from] KeyError),
}

impl From<sled::Error> for EngineError {
    fn from(e: sled::Error) -> Self {
        EngineError::Backend(e.to_string())
    }
}

impl From<bincode::Error> for EngineError {
    fn from(e: bincode::Error) -> Self {
        EngineError::Encoding(e.to_string())
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
