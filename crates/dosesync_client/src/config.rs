//! Configuration for the sync client.

use std::time::Duration;

/// Configuration for a sync client.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL of the data server (e.g. `http://192.168.1.20:8765`).
    pub base_url: String,
    /// Access key sent with every request.
    pub access_key: Option<String>,
    /// Time between polls.
    pub poll_interval: Duration,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Consecutive failures after which the connection counts as
    /// disconnected.
    pub max_missed_polls: u32,
    /// Longest failure streak tolerated before the session is torn down.
    pub disconnect_timeout: Duration,
    /// Extra time granted to a client that has never connected.
    pub handshake_grace: Duration,
}

impl SyncConfig {
    /// Creates a configuration for the server at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            access_key: None,
            poll_interval: Duration::from_secs(3),
            timeout: Duration::from_secs(5),
            max_missed_polls: 3,
            disconnect_timeout: Duration::from_secs(30),
            handshake_grace: Duration::from_secs(30),
        }
    }

    /// Creates a configuration for `host:port` over plain HTTP.
    pub fn for_host(host: &str, port: u16) -> Self {
        if host.contains(':') && !host.starts_with('[') {
            Self::new(format!("http://[{host}]:{port}"))
        } else {
            Self::new(format!("http://{host}:{port}"))
        }
    }

    /// Sets the access key. An empty key means none.
    pub fn with_access_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.access_key = if key.is_empty() { None } else { Some(key) };
        self
    }

    /// Sets the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the failure count that marks the connection disconnected.
    pub fn with_max_missed_polls(mut self, polls: u32) -> Self {
        self.max_missed_polls = polls.max(1);
        self
    }

    /// Sets the disconnect timeout.
    pub fn with_disconnect_timeout(mut self, timeout: Duration) -> Self {
        self.disconnect_timeout = timeout;
        self
    }

    /// Sets the grace period for a client that has never connected.
    pub fn with_handshake_grace(mut self, grace: Duration) -> Self {
        self.handshake_grace = grace;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::for_host("127.0.0.1", 8765)
    }
}
