//! Error types for protosync.
//!
//! Library crates use [`ProtoSyncError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level error type for all protosync operations.
#[derive(Debug, thiserror::Error)]
pub enum ProtoSyncError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Transport-level failure talking to the index service.
    #[error("network error: {message}")]
    Network { message: String, transient: bool },

    /// The index service answered with a non-success status.
    #[error("search error: HTTP {status}: {reason}")]
    Search { status: u16, reason: String },

    /// The schema compiler exited with a non-zero status.
    #[error("compiler failed ({code}): {command}\n{stdout}{stderr}")]
    Compiler {
        command: String,
        code: String,
        stdout: String,
        stderr: String,
    },

    /// An operation exceeded its time budget.
    #[error("timed out after {elapsed:?}: {operation}")]
    Timeout { operation: String, elapsed: Duration },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Malformed input (mapping config, service response, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ProtoSyncError>;

impl ProtoSyncError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a network error. `transient` marks it as safe to retry.
    pub fn network(msg: impl Into<String>, transient: bool) -> Self {
        Self::Network {
            message: msg.into(),
            transient,
        }
    }

    /// Create a search error from an HTTP status and response reason.
    pub fn search(status: u16, reason: impl Into<String>) -> Self {
        Self::Search {
            status,
            reason: reason.into(),
        }
    }

    /// Create a timeout error for the named operation.
    pub fn timeout(operation: impl Into<String>, elapsed: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed,
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether retrying the same request could plausibly succeed.
    ///
    /// Connect failures, request timeouts, HTTP 429 and HTTP 5xx are
    /// transient. Everything else (including mapping conflicts) is not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network { transient, .. } => *transient,
            Self::Search { status, .. } => *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }
}
