//! Error types for the connwatch-core library.

use thiserror::Error;

/// Result type alias for connwatch operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during connection monitoring and process management.
#[derive(Error, Debug)]
pub enum Error {
    /// The OS connection table could not be obtained. Aborts the current
    /// refresh cycle only; the previous snapshot stays published.
    #[error("Connection table unavailable: {0}")]
    TableUnavailable(String),

    /// Every candidate row of a kill request was a protected system process.
    #[error("All requested targets are protected system processes")]
    AllTargetsProtected,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
