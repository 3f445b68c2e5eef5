//! # DoseSync Protocol
//!
//! Wire types for the DoseSync LAN sync protocol.
//!
//! This crate provides:
//! - [`DocumentKind`] for the two synchronized documents and their shape rules
//! - [`Endpoint`] routing for the `/api/network/` path set
//! - JSON response bodies and [`ErrorCode`]s
//! - Access-key transport names shared by host and client
//!
//! This is a pure protocol crate with no I/O operations.
//!
//! ## Wire summary
//!
//! | Method | Path | Response |
//! |---|---|---|
//! | GET | `/api/network/ping` | `{ok, ts}` |
//! | GET | `/api/network/tracker-meta` | `{ok, mtime}` |
//! | GET/PUT | `/api/network/tracker-data` | tracker object / `{ok}` |
//! | GET/PUT | `/api/network/library-data` | library array / `{ok}` |

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod document;
mod endpoint;
mod error;
mod messages;

pub use document::DocumentKind;
pub use endpoint::{normalize_path, Endpoint, Method, API_PREFIX};
pub use error::{ProtocolError, ProtocolResult};
pub use messages::{
    unix_seconds, AckResponse, ErrorCode, ErrorResponse, MetaResponse, PingResponse,
};

/// Header carrying the access key.
pub const ACCESS_KEY_HEADER: &str = "x-access-key";

/// Query parameter carrying the access key when no header is sent.
pub const ACCESS_KEY_QUERY: &str = "key";
