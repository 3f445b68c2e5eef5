//! Server configuration.

use crate::access::AccessConfig;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

/// Default listening port.
pub const DEFAULT_PORT: u16 = 8765;

/// Configuration for the data server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_host: IpAddr,
    /// Preferred port.
    pub port: u16,
    /// Ports tried, starting at `port`, before giving up.
    pub max_bind_attempts: u16,
    /// Directory holding the documents.
    pub data_dir: PathBuf,
    /// Largest accepted request body.
    pub max_body_bytes: usize,
    /// How long shutdown waits for in-flight requests.
    pub shutdown_grace: Duration,
    /// Access key, rate limit and audit settings.
    pub access: AccessConfig,
}

impl ServerConfig {
    /// Creates a configuration serving `data_dir` on all interfaces.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            bind_host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            max_bind_attempts: 20,
            data_dir: data_dir.into(),
            max_body_bytes: 16 * 1024 * 1024,
            shutdown_grace: Duration::from_secs(5),
            access: AccessConfig::default(),
        }
    }

    /// Sets the bind address.
    pub fn with_bind_host(mut self, host: IpAddr) -> Self {
        self.bind_host = host;
        self
    }

    /// Sets the preferred port. Port 0 binds an ephemeral port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the number of ports tried before giving up.
    pub fn with_max_bind_attempts(mut self, attempts: u16) -> Self {
        self.max_bind_attempts = attempts.max(1);
        self
    }

    /// Sets the largest accepted request body.
    pub fn with_max_body_bytes(mut self, bytes: usize) -> Self {
        self.max_body_bytes = bytes;
        self
    }

    /// Sets the shutdown grace period.
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Sets the access control configuration.
    pub fn with_access(mut self, access: AccessConfig) -> Self {
        self.access = access;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new("dosesync-data")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.max_bind_attempts, 20);
        assert!(config.access.access_key.is_none());
    }

    #[test]
    fn config_builder() {
        let config = ServerConfig::new("/tmp/data")
            .with_bind_host("127.0.0.1".parse().unwrap())
            .with_port(9000)
            .with_max_bind_attempts(0)
            .with_access(AccessConfig::new().with_access_key("k"));

        assert_eq!(config.bind_host, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(config.port, 9000);
        assert_eq!(config.max_bind_attempts, 1);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/data"));
        assert_eq!(config.access.access_key.as_deref(), Some("k"));
    }
}
