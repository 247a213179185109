//! Error types for the client layer.

use common::EngineError;

/// Error type for database operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Storage-related errors from the underlying engine.
    Storage(String),

    /// Buffer packing or decoding errors.
    Encoding(String),

    /// Invalid input or parameter errors.
    InvalidInput(String),

    /// Internal errors indicating bugs or invariant violations.
    Internal(String),

    /// The database has not been opened or has been closed.
    NotOpen,
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Storage(msg) => write!(f, "Storage error: {}", msg),
            Error::Encoding(msg) => write!(f, "Encoding error: {}", msg),
            Error::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            Error::Internal(msg) => write!(f, "Internal error: {}", msg),
            Error::NotOpen => write!(f, "Database is not open"),
        }
    }
}

impl From<EngineError> for Error {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Storage(msg) => Error::Storage(msg),
            EngineError::Internal(msg) => Error::Internal(msg),
        }
    }
}

/// Result type alias for database operations.
pub type Result<T> = std::result::Result<T, Error>;
