//! # DoseSync Store
//!
//! Crash-safe JSON document storage for the DoseSync host.
//!
//! The store owns a data directory:
//!
//! ```text
//! <data_dir>/
//! ├─ LOCK              # Advisory lock for single-process ownership
//! ├─ tracker.json      # Tracker document (object)
//! └─ library.json      # Library document (array)
//! ```
//!
//! ## Guarantees
//!
//! - A document file is either absent or a complete, shape-valid document
//! - Writes go to a temp file in the same directory, are fsynced, then
//!   renamed over the target
//! - Renames for one document are serialized; the two documents never
//!   block each other
//! - Reads take no lock
//!
//! ## Example
//!
//! ```rust
//! use dosesync_protocol::DocumentKind;
//! use dosesync_store::DocumentStore;
//! use serde_json::json;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let store = DocumentStore::open(dir.path()).unwrap();
//! store.write(DocumentKind::Library, &json!([{"name": "caffeine"}])).unwrap();
//! assert_eq!(store.read(DocumentKind::Library), json!([{"name": "caffeine"}]));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod dir;
mod error;
mod store;

pub use dir::DataDir;
pub use error::{StoreError, StoreResult};
pub use store::DocumentStore;
