//! Error types for the cluster orchestrator
//!
//! Every component reports through one [`Error`] enum. Errors fall into
//! four kinds (see [`ErrorKind`]); the API surface does not distinguish
//! them on the wire, but the retry layer and logs do.

use thiserror::Error;

/// Unified error type for the orchestrator
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Connectivity Errors
    // =========================================================================
    #[error("Coordination store error: {0}")]
    Store(String),

    #[error("Failed to connect as admin after {attempts} attempt(s): {reason}")]
    AdminConnect { attempts: u32, reason: String },

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    // =========================================================================
    // Cluster Command Errors
    // =========================================================================
    #[error("Command '{command}' failed: {message}")]
    Command { command: String, message: String },

    // =========================================================================
    // State Errors
    // =========================================================================
    #[error("Malformed state: {0}")]
    MalformedState(String),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    // =========================================================================
    // Request Errors
    // =========================================================================
    #[error("Validation failed: {0}")]
    Validation(String),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Store round-trip or admin connection failed
    TransientConnectivity,
    /// Data from the store or the cluster could not be parsed
    MalformedState,
    /// Caller-supplied input rejected before any network call
    Validation,
    /// The storage cluster reported failure
    DownstreamCommand,
    /// Local configuration or process errors
    Internal,
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Store(_) | Error::AdminConnect { .. } | Error::Http(_) => {
                ErrorKind::TransientConnectivity
            }
            Error::MalformedState(_) | Error::JsonParse(_) => ErrorKind::MalformedState,
            Error::Validation(_) => ErrorKind::Validation,
            Error::Command { .. } => ErrorKind::DownstreamCommand,
            Error::Internal(_) | Error::Configuration(_) | Error::Io(_) => ErrorKind::Internal,
        }
    }

    /// Check if this error is transient
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::TransientConnectivity
    }

    pub(crate) fn malformed(what: impl std::fmt::Display, detail: impl std::fmt::Display) -> Self {
        Error::MalformedState(format!("{}: {}", what, detail))
    }
}

/// Result type alias for the orchestrator
pub type Result<T> = std::result::Result<T, Error>;
