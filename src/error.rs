//! Error handling for the inspection station client

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error category used by the camera retry policy and for
/// user-facing classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Backend unreachable (connection refused, DNS, timeout)
    Network,
    /// Camera reports disconnected / no frame
    Hardware,
    /// Endpoint missing or misconfigured (404-class)
    Configuration,
    /// Server error (5xx-class)
    Api,
    /// Malformed or missing expected fields in a response
    Data,
    /// Uncategorized
    Unknown,
}

impl ErrorKind {
    /// Convert to string for logging/serialization
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::Hardware => "hardware",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Api => "api",
            ErrorKind::Data => "data",
            ErrorKind::Unknown => "unknown",
        }
    }
}

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Backend unreachable
    #[error("Network error: {0}")]
    Network(String),

    /// Camera-side failure (disconnected, no frame)
    #[error("Hardware error: {0}")]
    Hardware(String),

    /// Endpoint missing / misconfigured
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Backend server error
    #[error("API error: {0}")]
    Api(String),

    /// Response missing expected fields
    #[error("Data error: {0}")]
    Data(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Classify this error into the retry-policy taxonomy.
    ///
    /// Transport-level reqwest failures (refused connection, DNS, timeout)
    /// are network errors; body decode failures are data errors. Explicit
    /// variants map directly.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Network(_) => ErrorKind::Network,
            Error::Hardware(_) => ErrorKind::Hardware,
            Error::Configuration(_) => ErrorKind::Configuration,
            Error::Api(_) => ErrorKind::Api,
            Error::Data(_) => ErrorKind::Data,
            Error::Serialization(_) => ErrorKind::Data,
            Error::Http(e) => {
                if e.is_decode() || e.is_body() {
                    ErrorKind::Data
                } else if e.is_connect() || e.is_timeout() || e.is_request() {
                    ErrorKind::Network
                } else if let Some(status) = e.status() {
                    Self::kind_for_status(status)
                } else {
                    ErrorKind::Unknown
                }
            }
            Error::Io(_) | Error::Internal(_) => ErrorKind::Unknown,
        }
    }

    /// Map an HTTP status to an error kind.
    pub fn kind_for_status(status: StatusCode) -> ErrorKind {
        if status == StatusCode::NOT_FOUND {
            ErrorKind::Configuration
        } else if status.is_server_error() {
            ErrorKind::Api
        } else {
            ErrorKind::Unknown
        }
    }

    /// Build an error from a non-success HTTP status.
    pub fn from_status(status: StatusCode, context: &str) -> Self {
        match Self::kind_for_status(status) {
            ErrorKind::Configuration => {
                Error::Configuration(format!("{}: endpoint not found ({})", context, status))
            }
            ErrorKind::Api => Error::Api(format!("{}: server error ({})", context, status)),
            _ => Error::Internal(format!("{}: unexpected status {}", context, status)),
        }
    }
}
