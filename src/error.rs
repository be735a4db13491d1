//! Error types for the voice relay

use thiserror::Error;

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the voice relay
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid settings; fatal at startup
    #[error("configuration error: {0}")]
    Config(String),

    /// Messaging transport failure (download, upload, send)
    #[error("channel error: {0}")]
    Channel(String),

    /// Speech or conversation backend failure
    ///
    /// `status` is the HTTP status, the terminal run status, or a short
    /// local classification such as `request` or `empty_audio`.
    #[error("backend error ({status}): {message}")]
    Backend {
        /// Remote status or local classification
        status: String,
        /// Remote message or response body
        message: String,
    },

    /// A bounded wait expired
    #[error("timed out: {0}")]
    Timeout(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build a backend error from a status and message
    pub fn backend(status: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            status: status.into(),
            message: message.into(),
        }
    }

    /// Whether this error is a timeout (poll bound or request deadline)
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}
