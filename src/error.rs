//! Error types for expbox
//!
//! Validation errors (identifier, configuration, lookup) propagate to the
//! caller. Version-control and logger-release failures never reach this type;
//! they are absorbed where they happen.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// expbox error types
#[derive(Error, Debug)]
pub enum Error {
    /// Identifier is not usable as a directory name
    #[error("Invalid experiment id: {0}")]
    InvalidIdentifier(String),

    /// Unknown logger kind, unreadable config file, or config that is not a mapping
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// No experiment (meta.json) exists for the requested identifier
    #[error("Experiment not found: {0}")]
    NotFound(String),

    /// The active-box handle was used before any experiment was made current
    #[error("No active experiment: call create or reload first")]
    NotActive,

    /// A logger was used after it was closed
    #[error("Logger already closed")]
    LoggerClosed,

    /// External tracking service request failed
    #[error("Tracking backend error: {0}")]
    Tracking(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}
