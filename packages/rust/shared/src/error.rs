//! Error types for SiteGen.
//!
//! Library crates use [`SitegenError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all SiteGen operations.
#[derive(Debug, thiserror::Error)]
pub enum SitegenError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// The text source has no API key to call the service with.
    #[error("no credentials configured: set the {env_var} environment variable")]
    MissingCredentials { env_var: String },

    /// Network/HTTP transport error talking to the text source.
    #[error("transport error: {0}")]
    Transport(String),

    /// The text-completion service answered with a non-success status.
    #[error("provider error (HTTP {status}): {message}")]
    Provider { status: u16, message: String },

    /// The completion stream broke off or carried an error event.
    #[error("stream error: {0}")]
    Stream(String),

    /// Structured decoding error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (missing artifact, bad input, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Illegal state transition on a step or pipeline.
    #[error("state error: {message}")]
    State { message: String },

    /// Work was cancelled before it could finish.
    #[error("cancelled")]
    Cancelled,
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SitegenError>;

impl SitegenError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a state-transition error from any displayable message.
    pub fn state(msg: impl Into<String>) -> Self {
        Self::State {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether a step that failed with this error may be attempted again.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}
