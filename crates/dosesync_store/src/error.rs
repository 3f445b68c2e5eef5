//! Error types for store operations.

use dosesync_protocol::{DocumentKind, ProtocolError};
use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Another process holds the data directory.
    #[error("data directory locked: another process owns it")]
    Locked,

    /// The backing file exists but does not hold a valid document.
    #[error("{kind} document corrupted: {reason}")]
    Corrupted {
        /// Document that failed to load.
        kind: DocumentKind,
        /// What was wrong with it.
        reason: String,
    },

    /// The payload was rejected before touching disk.
    #[error(transparent)]
    InvalidPayload(#[from] ProtocolError),

    /// Serialization failed.
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

impl StoreError {
    /// Creates a corruption error.
    pub fn corrupted(kind: DocumentKind, reason: impl Into<String>) -> Self {
        Self::Corrupted {
            kind,
            reason: reason.into(),
        }
    }
}
