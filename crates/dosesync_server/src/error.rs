//! Error types for the data server.

use dosesync_protocol::{DocumentKind, ErrorCode};
use dosesync_store::StoreError;
use std::net::IpAddr;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the data server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Missing or wrong access key.
    #[error("invalid access key")]
    InvalidAccessKey,

    /// Caller exhausted its request budget.
    #[error("rate limited")]
    RateLimited,

    /// Payload does not have the shape its document requires.
    #[error("invalid {0} payload")]
    InvalidPayload(DocumentKind),

    /// Unknown path or method.
    #[error("not found")]
    NotFound,

    /// Store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// No port in the fallback range could be bound.
    #[error("could not bind {host}:{first_port} after {attempts} attempts")]
    Bind {
        /// Host address.
        host: IpAddr,
        /// First port tried.
        first_port: u16,
        /// Number of ports tried.
        attempts: u16,
    },

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServerError::InvalidAccessKey
                | ServerError::RateLimited
                | ServerError::InvalidPayload(_)
                | ServerError::NotFound
        )
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            ServerError::Store(_) | ServerError::Internal(_) | ServerError::Io(_)
        )
    }

    /// Returns the wire error code for a request-level failure.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            ServerError::InvalidAccessKey => ErrorCode::InvalidAccessKey,
            ServerError::RateLimited => ErrorCode::RateLimited,
            ServerError::InvalidPayload(kind) => kind.invalid_payload_code(),
            ServerError::NotFound => ErrorCode::NotFound,
            ServerError::Store(_)
            | ServerError::Bind { .. }
            | ServerError::Internal(_)
            | ServerError::Io(_) => ErrorCode::StorageError,
        }
    }
}

impl From<ErrorCode> for ServerError {
    fn from(code: ErrorCode) -> Self {
        match code {
            ErrorCode::InvalidAccessKey => ServerError::InvalidAccessKey,
            ErrorCode::RateLimited => ServerError::RateLimited,
            ErrorCode::InvalidTrackerPayload => ServerError::InvalidPayload(DocumentKind::Tracker),
            ErrorCode::InvalidLibraryPayload => ServerError::InvalidPayload(DocumentKind::Library),
            ErrorCode::NotFound => ServerError::NotFound,
            ErrorCode::StorageError => ServerError::Internal("storage error".into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert!(ServerError::InvalidAccessKey.is_client_error());
        assert!(ServerError::InvalidPayload(DocumentKind::Library).is_client_error());
        assert!(ServerError::Internal("oops".into()).is_server_error());
        assert!(!ServerError::NotFound.is_server_error());
    }

    #[test]
    fn error_codes() {
        assert_eq!(
            ServerError::InvalidPayload(DocumentKind::Tracker).error_code(),
            ErrorCode::InvalidTrackerPayload
        );
        assert_eq!(ServerError::RateLimited.error_code().status(), 429);
        assert_eq!(
            ServerError::Store(StoreError::Locked).error_code(),
            ErrorCode::StorageError
        );
        assert_eq!(
            ServerError::from(ErrorCode::InvalidLibraryPayload).error_code(),
            ErrorCode::InvalidLibraryPayload
        );
    }

    #[test]
    fn error_display() {
        let err = ServerError::Bind {
            host: "0.0.0.0".parse().unwrap(),
            first_port: 8765,
            attempts: 20,
        };
        let msg = err.to_string();
        assert!(msg.contains("8765"));
        assert!(msg.contains("20"));
    }
}
