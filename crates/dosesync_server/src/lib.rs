//! # DoseSync Server
//!
//! LAN data server for DoseSync.
//!
//! This crate provides:
//! - HTTP endpoints under `/api/network/` (ping, tracker meta, document
//!   get/put)
//! - Access control: shared access key, per-caller request budget, bounded
//!   audit log
//! - Port binding with sequential fallback
//!
//! # Architecture
//!
//! ```text
//! HTTP (axum) ──► RequestHandler ──► AccessController ──► DocumentStore
//! ```
//!
//! The HTTP layer only translates requests. Routing, access control and
//! storage live in [`RequestHandler`], which can be driven directly in tests.
//!
//! # Authentication
//!
//! Authentication is optional. With a key configured, callers send it in the
//! `X-Access-Key` header or the `key` query parameter:
//!
//! ```rust,ignore
//! use dosesync_server::{AccessConfig, DataServer, ServerConfig};
//!
//! let config = ServerConfig::new("data")
//!     .with_access(AccessConfig::new().with_access_key("kitchen-tablet"));
//! let server = DataServer::spawn(config).await?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod access;
mod config;
mod error;
mod handler;
mod server;

pub use access::{authorize, AccessConfig, AccessController, AuditStats};
pub use config::{ServerConfig, DEFAULT_PORT};
pub use error::{ServerError, ServerResult};
pub use handler::{ApiRequest, ApiResponse, HandlerContext, RequestHandler};
pub use server::{bind_with_fallback, DataServer};
