//! Error types for protocol operations.

use crate::document::DocumentKind;
use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while interpreting wire data.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Payload does not have the shape required by its document.
    #[error("invalid {kind} payload: expected {expected}")]
    InvalidPayload {
        /// Document the payload was submitted for.
        kind: DocumentKind,
        /// Required JSON shape.
        expected: &'static str,
    },

    /// Unknown document name.
    #[error("unknown document: {0}")]
    UnknownDocument(String),

    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
