//! Error types for scenario loading and execution

use thiserror::Error;

/// Errors that stop a run before (or instead of) generating load.
///
/// Failures of individual requests are not represented here; those are
/// recorded as [`RequestError`] samples and never abort a run.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Invalid scenario: {0}")]
    InvalidConfig(String),

    #[error("Invalid duration '{0}'")]
    InvalidDuration(String),

    #[error("Invalid threshold '{expression}' on {metric}: {reason}")]
    InvalidThreshold {
        metric: String,
        expression: String,
        reason: String,
    },

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Failed to build request: {0}")]
    Request(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LoadError>;

/// Outcome of a single request that did not produce a response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("Connection refused or host unreachable")]
    Connect,

    #[error("Timeout")]
    Timeout,

    #[error("Connection closed unexpectedly")]
    Closed,

    #[error("Invalid request: {0}")]
    Invalid(String),

    #[error("Unknown network error: {0}")]
    Other(String),
}

impl RequestError {
    /// Key used in the status breakdown of the summary.
    pub fn status_key(&self) -> &'static str {
        match self {
            RequestError::Timeout => "TIMEOUT",
            _ => "REQUEST_ERROR",
        }
    }
}
