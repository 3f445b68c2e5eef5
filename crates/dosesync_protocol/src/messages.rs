//! JSON response bodies.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Machine-readable error code carried in every failure body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Access key missing or wrong.
    InvalidAccessKey,
    /// Caller exceeded its request budget.
    RateLimited,
    /// Tracker payload was not a JSON object.
    InvalidTrackerPayload,
    /// Library payload was not a JSON array.
    InvalidLibraryPayload,
    /// Unknown path or method.
    NotFound,
    /// The host failed to persist or read a document.
    StorageError,
}

impl ErrorCode {
    /// HTTP status code this error is reported with.
    pub fn status(&self) -> u16 {
        match self {
            ErrorCode::InvalidAccessKey => 401,
            ErrorCode::RateLimited => 429,
            ErrorCode::InvalidTrackerPayload | ErrorCode::InvalidLibraryPayload => 400,
            ErrorCode::NotFound => 404,
            ErrorCode::StorageError => 500,
        }
    }

    /// Returns the wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidAccessKey => "invalid_access_key",
            ErrorCode::RateLimited => "rate_limited",
            ErrorCode::InvalidTrackerPayload => "invalid_tracker_payload",
            ErrorCode::InvalidLibraryPayload => "invalid_library_payload",
            ErrorCode::NotFound => "not_found",
            ErrorCode::StorageError => "storage_error",
        }
    }

    /// Returns true if a denial with this code is written to the audit log.
    pub fn is_audited(&self) -> bool {
        !matches!(self, ErrorCode::NotFound | ErrorCode::StorageError)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure body: `{ok:false, error:<code>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Always false.
    pub ok: bool,
    /// Error code.
    pub error: ErrorCode,
}

impl ErrorResponse {
    /// Creates a failure body.
    pub fn new(error: ErrorCode) -> Self {
        Self { ok: false, error }
    }
}

/// Body of a successful `ping`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingResponse {
    /// Always true.
    pub ok: bool,
    /// Host time in epoch seconds.
    pub ts: f64,
}

impl PingResponse {
    /// Creates a ping body stamped with the current time.
    pub fn now() -> Self {
        Self {
            ok: true,
            ts: unix_seconds(SystemTime::now()),
        }
    }
}

/// Body of a successful `tracker-meta` probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaResponse {
    /// Always true.
    pub ok: bool,
    /// Modification time of the tracker file in epoch seconds, 0 if absent.
    pub mtime: f64,
}

impl MetaResponse {
    /// Creates a meta body.
    pub fn new(mtime: f64) -> Self {
        Self { ok: true, mtime }
    }
}

/// Body of a successful `put`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckResponse {
    /// Always true.
    pub ok: bool,
}

impl AckResponse {
    /// Creates an acknowledgment.
    pub fn ok() -> Self {
        Self { ok: true }
    }
}

/// Converts a timestamp to fractional seconds since the Unix epoch.
///
/// Times before the epoch map to 0.
pub fn unix_seconds(time: SystemTime) -> f64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
