//! Error types for lead-pipeline

use thiserror::Error;

/// Failure at the persistence surface boundary.
///
/// These never escape the core as panics or hard failures: readers fall back,
/// writers log and carry on.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The surface is disabled or denied access (private mode, quota, permissions)
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// Stored data did not decode into the expected shape
    #[error("malformed data under {key}: {message}")]
    Malformed { key: String, message: String },

    /// IO error from a file-backed surface
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Value could not be encoded
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Main error type for the lead-pipeline library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV writing error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Analytics collaborator rejected an event
    #[error("analytics bridge error: {0}")]
    Bridge(String),

    /// Email/notification dispatch failed
    #[error("dispatch error: {0}")]
    Dispatch(String),

    /// Caller supplied something unusable
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Result type alias for lead-pipeline
pub type Result<T> = std::result::Result<T, Error>;
