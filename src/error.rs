//! Error handling module
//!
//! Provides the unified error type for a snapshot run. Every variant except
//! `Cancelled` corresponds to one failure kind a run can abort with.

use std::path::PathBuf;
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Missing or invalid endpoint/authentication settings, raised before any cluster call
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested database is absent from the cluster response
    #[error("Not found: {0}")]
    NotFound(String),

    /// The cluster answered, but with an error or with data we cannot decode
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// Transport-level failure talking to the cluster or the identity provider
    #[error("Cluster request failed: {0}")]
    Cluster(#[from] reqwest::Error),

    #[error("Write error at {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Operation cancelled")]
    Cancelled,
}

impl AppError {
    /// Process exit status reported for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Cancelled => 130,
            _ => 1,
        }
    }
}

/// Result type alias used across the crate
pub type AppResult<T> = Result<T, AppError>;

/// Helper function to create a retrieval error
pub fn retrieval_error(msg: impl Into<String>) -> AppError {
    AppError::Retrieval(msg.into())
}

/// Helper function to create a not found error
pub fn not_found_error(msg: impl Into<String>) -> AppError {
    AppError::NotFound(msg.into())
}

/// Helper function to create a write error for a path
pub fn write_error(path: impl Into<PathBuf>, source: std::io::Error) -> AppError {
    AppError::Write {
        path: path.into(),
        source,
    }
}
