//! # DoseSync Client
//!
//! Polling sync client for DoseSync.
//!
//! This crate provides:
//! - A poll cycle that probes `tracker-meta` and fetches the tracker only
//!   when it changed
//! - A connection-health state machine (connected → interrupted →
//!   disconnected) with a one-shot teardown signal
//! - A blocking HTTP transport and a mock transport for tests
//! - A tokio poller task
//!
//! ## Architecture
//!
//! ```text
//! poller tick ──► SyncClient::poll ──► SyncTransport ──► data server
//!                        │
//!                        ├──► ConnectionHealth
//!                        └──► SyncApplier (apply, refresh, teardown)
//! ```
//!
//! ## Key Invariants
//!
//! - At most one poll is in flight; overlapping polls are dropped
//! - The full tracker is fetched only when its modification time changed
//! - Teardown fires at most once per disconnect episode
//! - Failures never propagate out of `poll`; they become state transitions

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod config;
mod error;
mod health;
mod http;
mod transport;

pub use client::{MemoryApplier, PollOutcome, PollerHandle, SyncApplier, SyncClient, SyncStats};
pub use config::SyncConfig;
pub use error::{SyncError, SyncResult};
pub use health::{ConnectionHealth, ConnectionState, HealthUpdate};
pub use http::HttpTransport;
pub use transport::{MockTransport, SyncTransport};
