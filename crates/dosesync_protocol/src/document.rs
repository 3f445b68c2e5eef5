//! The two synchronized documents.

use crate::error::{ProtocolError, ProtocolResult};
use crate::messages::ErrorCode;
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

/// A named, independently versioned JSON document.
///
/// The sync layer treats payloads as opaque beyond the top-level type:
/// `tracker` must be an object, `library` must be an array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    /// Dose log and settings (`{schema_version, logs, ...}`).
    Tracker,
    /// Ordered list of library records.
    Library,
}

impl DocumentKind {
    /// All document kinds.
    pub const ALL: [DocumentKind; 2] = [DocumentKind::Tracker, DocumentKind::Library];

    /// Returns the document name used on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            DocumentKind::Tracker => "tracker",
            DocumentKind::Library => "library",
        }
    }

    /// Returns the backing file name inside the data directory.
    pub fn file_name(&self) -> &'static str {
        match self {
            DocumentKind::Tracker => "tracker.json",
            DocumentKind::Library => "library.json",
        }
    }

    /// Returns the document served when nothing has been stored yet.
    pub fn default_document(&self) -> Value {
        match self {
            DocumentKind::Tracker => json!({ "schema_version": 1, "logs": [] }),
            DocumentKind::Library => json!([]),
        }
    }

    /// Returns true if `value` has the top-level shape this document requires.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            DocumentKind::Tracker => value.is_object(),
            DocumentKind::Library => value.is_array(),
        }
    }

    /// Checks the top-level shape of a payload.
    pub fn validate(&self, value: &Value) -> ProtocolResult<()> {
        if self.accepts(value) {
            Ok(())
        } else {
            Err(ProtocolError::InvalidPayload {
                kind: *self,
                expected: self.expected_shape(),
            })
        }
    }

    /// Error code reported when a payload fails [`validate`](Self::validate).
    pub fn invalid_payload_code(&self) -> ErrorCode {
        match self {
            DocumentKind::Tracker => ErrorCode::InvalidTrackerPayload,
            DocumentKind::Library => ErrorCode::InvalidLibraryPayload,
        }
    }

    fn expected_shape(&self) -> &'static str {
        match self {
            DocumentKind::Tracker => "object",
            DocumentKind::Library => "array",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DocumentKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tracker" => Ok(DocumentKind::Tracker),
            "library" => Ok(DocumentKind::Library),
            other => Err(ProtocolError::UnknownDocument(other.to_string())),
        }
    }
}
