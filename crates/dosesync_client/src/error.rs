//! Error types for the sync client.

use dosesync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The request did not complete within the configured timeout.
    #[error("operation timed out")]
    Timeout,

    /// The server rejected the access key.
    #[error("access key rejected")]
    Unauthorized,

    /// The server's request budget for this client is exhausted.
    #[error("rate limited by server")]
    RateLimited,

    /// The server answered with an unexpected status.
    #[error("server returned {status}: {code}")]
    Server {
        /// HTTP status.
        status: u16,
        /// Error code from the response body, if any.
        code: String,
    },

    /// Response could not be interpreted.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Payload rejected before sending.
    #[error(transparent)]
    InvalidPayload(#[from] ProtocolError),

    /// The applier failed to take a document.
    #[error("apply failed: {0}")]
    Apply(String),
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Maps a non-success HTTP status and its error code.
    pub fn from_status(status: u16, code: Option<String>) -> Self {
        match status {
            401 => Self::Unauthorized,
            429 => Self::RateLimited,
            _ => Self::Server {
                status,
                code: code.unwrap_or_else(|| "unknown".into()),
            },
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Timeout | SyncError::RateLimited => true,
            SyncError::Server { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
