//! Error types for LeadSourcer.
//!
//! Library crates use [`SourcerError`] via `thiserror`.
//! The CLI app wraps this with `color-eyre` for rich diagnostics.
//!
//! The variants encode the failure taxonomy the job executor relies on:
//! transient errors ([`SourcerError::Network`], [`SourcerError::RateLimited`])
//! are retried inside the API gate, permanent errors are surfaced
//! immediately, and [`SourcerError::Cancelled`] is a distinct terminal
//! signal rather than a failure.

use std::path::PathBuf;

/// Top-level error type for all LeadSourcer operations.
#[derive(Debug, thiserror::Error)]
pub enum SourcerError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Data validation error (unparseable repository URL, bad params, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Transient network/HTTP error (timeout, 5xx, connection failure).
    #[error("network error: {0}")]
    Network(String),

    /// The provider signalled quota exhaustion.
    #[error("rate limited by {provider}")]
    RateLimited {
        provider: String,
        /// Seconds until the quota window resets, when the provider said so.
        retry_after_secs: Option<u64>,
    },

    /// Permanent provider error (non-rate-limit 4xx, malformed response).
    #[error("provider error ({status}): {message}")]
    Provider { status: u16, message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Enrichment error (search, profile extraction, or oracle).
    #[error("enrichment error: {0}")]
    Enrichment(String),

    /// A sourcing job for this repository is already pending or running.
    #[error("sourcing already in progress for {repository}")]
    AlreadyInProgress { repository: String },

    /// The job's cancellation flag was observed. Not a failure.
    #[error("job cancelled")]
    Cancelled,

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SourcerError>;

impl SourcerError {
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

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the API gate should retry this error with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::RateLimited { .. })
    }
}
