//! Transport layer abstraction for sync operations.

use crate::error::{SyncError, SyncResult};
use dosesync_protocol::DocumentKind;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// A sync transport handles network communication with the data server.
///
/// Calls block until the server answers or the transport's timeout elapses.
/// The poller runs them on the blocking pool.
pub trait SyncTransport: Send + Sync {
    /// Liveness probe. Returns the server time in epoch seconds.
    fn ping(&self) -> SyncResult<f64>;

    /// Returns the tracker document's modification time, 0 if absent.
    fn tracker_meta(&self) -> SyncResult<f64>;

    /// Fetches a full document.
    fn fetch(&self, kind: DocumentKind) -> SyncResult<Value>;

    /// Replaces a document.
    fn push(&self, kind: DocumentKind, document: &Value) -> SyncResult<()>;
}

impl<T: SyncTransport + ?Sized> SyncTransport for std::sync::Arc<T> {
    fn ping(&self) -> SyncResult<f64> {
        (**self).ping()
    }

    fn tracker_meta(&self) -> SyncResult<f64> {
        (**self).tracker_meta()
    }

    fn fetch(&self, kind: DocumentKind) -> SyncResult<Value> {
        (**self).fetch(kind)
    }

    fn push(&self, kind: DocumentKind, document: &Value) -> SyncResult<()> {
        (**self).push(kind, document)
    }
}

/// A mock transport for testing.
///
/// Holds both documents in memory. Storing the tracker advances its
/// modification time by one second.
#[derive(Debug)]
pub struct MockTransport {
    connected: AtomicBool,
    latency: Mutex<Duration>,
    documents: Mutex<HashMap<DocumentKind, Value>>,
    tracker_mtime: Mutex<f64>,
    meta_calls: AtomicU64,
    fetch_calls: AtomicU64,
}

impl MockTransport {
    /// Creates a connected mock transport holding default documents.
    pub fn new() -> Self {
        let documents = DocumentKind::ALL
            .iter()
            .map(|kind| (*kind, kind.default_document()))
            .collect();
        Self {
            connected: AtomicBool::new(true),
            latency: Mutex::new(Duration::ZERO),
            documents: Mutex::new(documents),
            tracker_mtime: Mutex::new(0.0),
            meta_calls: AtomicU64::new(0),
            fetch_calls: AtomicU64::new(0),
        }
    }

    /// Sets the connected state. While disconnected every call fails.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Delays every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Replaces a document as if another client had pushed it.
    pub fn set_document(&self, kind: DocumentKind, document: Value) {
        self.documents.lock().insert(kind, document);
        if kind == DocumentKind::Tracker {
            *self.tracker_mtime.lock() += 1.0;
        }
    }

    /// Returns the stored document.
    pub fn document(&self, kind: DocumentKind) -> Value {
        self.documents
            .lock()
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| kind.default_document())
    }

    /// Returns the number of `tracker_meta` calls.
    pub fn meta_calls(&self) -> u64 {
        self.meta_calls.load(Ordering::SeqCst)
    }

    /// Returns the number of `fetch` calls.
    pub fn fetch_calls(&self) -> u64 {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    fn begin(&self) -> SyncResult<()> {
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SyncError::transport_retryable("connection refused"))
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncTransport for MockTransport {
    fn ping(&self) -> SyncResult<f64> {
        self.begin()?;
        Ok(dosesync_protocol::unix_seconds(std::time::SystemTime::now()))
    }

    fn tracker_meta(&self) -> SyncResult<f64> {
        self.meta_calls.fetch_add(1, Ordering::SeqCst);
        self.begin()?;
        Ok(*self.tracker_mtime.lock())
    }

    fn fetch(&self, kind: DocumentKind) -> SyncResult<Value> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.begin()?;
        Ok(self.document(kind))
    }

    fn push(&self, kind: DocumentKind, document: &Value) -> SyncResult<()> {
        self.begin()?;
        kind.validate(document)?;
        self.set_document(kind, document.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mock_transport_serves_defaults() {
        let transport = MockTransport::new();
        assert_eq!(transport.tracker_meta().unwrap(), 0.0);
        assert_eq!(
            transport.fetch(DocumentKind::Library).unwrap(),
            json!([])
        );
        assert_eq!(transport.meta_calls(), 1);
        assert_eq!(transport.fetch_calls(), 1);
    }

    #[test]
    fn mock_transport_not_connected_error() {
        let transport = MockTransport::new();
        transport.set_connected(false);

        let err = transport.ping().unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn mock_transport_push_bumps_tracker_mtime() {
        let transport = MockTransport::new();
        let doc = json!({"schema_version": 1, "logs": [1]});
        transport.push(DocumentKind::Tracker, &doc).unwrap();

        assert_eq!(transport.tracker_meta().unwrap(), 1.0);
        assert_eq!(transport.fetch(DocumentKind::Tracker).unwrap(), doc);
    }

    #[test]
    fn mock_transport_rejects_wrong_shape() {
        let transport = MockTransport::new();
        let err = transport
            .push(DocumentKind::Library, &json!({"not": "a list"}))
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidPayload(_)));
        assert_eq!(transport.document(DocumentKind::Library), json!([]));
    }
}
