//! Error types for the querybridge library.
//!
//! Infrastructure faults (store, model, database, configuration) are reported
//! through [`QueryBridgeError`]. Chat-path outcomes that the caller is expected
//! to render (schema not indexed, blocked SQL, classified execution failures)
//! are values of [`crate::service::ChatOutcome`] instead.

use thiserror::Error;

/// Errors that can occur in the querybridge application.
#[derive(Error, Debug)]
pub enum QueryBridgeError {
    /// The database could not be reached while indexing
    #[error("Database unreachable: {0}")]
    Connectivity(String),

    /// Enum sampling failed for one column
    #[error("Enum sampling failed for {table}.{column}: {message}")]
    EnumSampling {
        /// Qualified table name
        table: String,
        /// Column name
        column: String,
        /// Underlying failure
        message: String,
    },

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Connection pool errors
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Schema store errors
    #[error("Schema store error: {0}")]
    Store(String),

    /// Language model call failed or returned an unusable payload
    #[error("Model error: {0}")]
    Model(String),

    /// An external call exceeded its time budget
    #[error("{operation} timed out after {secs}s")]
    Timeout {
        /// Which call timed out
        operation: String,
        /// Budget that was exceeded
        secs: u64,
    },

    /// Caller supplied an invalid message or history
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// CSV rendering errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Binary serialization errors
    #[error("Binary serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    /// General error with context
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Result with QueryBridgeError
pub type Result<T> = std::result::Result<T, QueryBridgeError>;

impl QueryBridgeError {
    /// Message as reported by the underlying driver, without our prefix.
    #[must_use]
    pub fn raw_message(&self) -> String {
        match self {
            Self::Database(e) => e.to_string(),
            Self::Pool(e) => e.to_string(),
            Self::Connectivity(m) | Self::Store(m) | Self::Model(m) | Self::Other(m) => m.clone(),
            other => other.to_string(),
        }
    }
}

impl From<anyhow::Error> for QueryBridgeError {
    fn from(err: anyhow::Error) -> Self {
        QueryBridgeError::Other(err.to_string())
    }
}

impl From<sled::Error> for QueryBridgeError {
    fn from(err: sled::Error) -> Self {
        QueryBridgeError::Store(err.to_string())
    }
}

impl From<reqwest::Error> for QueryBridgeError {
    fn from(err: reqwest::Error) -> Self {
        QueryBridgeError::Model(err.to_string())
    }
}

impl From<tokio::task::JoinError> for QueryBridgeError {
    fn from(err: tokio::task::JoinError) -> Self {
        QueryBridgeError::Other(format!("background task failed: {err}"))
    }
}
