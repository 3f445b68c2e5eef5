//! HTTP transport implementation.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::transport::SyncTransport;
use dosesync_protocol::{
    DocumentKind, Endpoint, ErrorResponse, MetaResponse, PingResponse, ACCESS_KEY_HEADER,
};
use serde_json::Value;
use std::io;
use tracing::debug;

/// Blocking HTTP transport backed by a `ureq` agent.
///
/// Every request carries the configured timeout and, when set, the access
/// key header.
pub struct HttpTransport {
    base_url: String,
    access_key: Option<String>,
    agent: ureq::Agent,
}

impl HttpTransport {
    /// Creates a transport for the server described by `config`.
    pub fn new(config: &SyncConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(config.timeout)
            .timeout(config.timeout)
            .build();
        Self {
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            access_key: config.access_key.clone(),
            agent,
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn send(&self, endpoint: Endpoint, body: Option<&Value>) -> SyncResult<Value> {
        let url = format!("{}{}", self.base_url, endpoint.path());
        let mut request = self.agent.request(endpoint.method().as_str(), &url);
        if let Some(key) = &self.access_key {
            request = request.set(ACCESS_KEY_HEADER, key);
        }

        let response = match body {
            Some(body) => request.send_json(body),
            None => request.call(),
        };

        match response {
            Ok(resp) => resp
                .into_json::<Value>()
                .map_err(|err| SyncError::Protocol(format!("unreadable response body: {err}"))),
            Err(ureq::Error::Status(status, resp)) => {
                let code = resp
                    .into_json::<ErrorResponse>()
                    .ok()
                    .map(|body| body.error.as_str().to_owned());
                debug!(url = %url, status, code = ?code, "request rejected");
                Err(SyncError::from_status(status, code))
            }
            Err(ureq::Error::Transport(transport)) => Err(map_transport(&transport)),
        }
    }
}

fn map_transport(transport: &ureq::Transport) -> SyncError {
    let timed_out = std::error::Error::source(transport)
        .and_then(|source| source.downcast_ref::<io::Error>())
        .is_some_and(|err| {
            matches!(
                err.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
            )
        });
    if timed_out {
        return SyncError::Timeout;
    }

    match transport.kind() {
        ureq::ErrorKind::InvalidUrl | ureq::ErrorKind::UnknownScheme => {
            SyncError::transport_fatal(transport.to_string())
        }
        _ => SyncError::transport_retryable(transport.to_string()),
    }
}

fn decode<T: serde::de::DeserializeOwned>(value: Value) -> SyncResult<T> {
    serde_json::from_value(value)
        .map_err(|err| SyncError::Protocol(format!("unexpected response shape: {err}")))
}

impl SyncTransport for HttpTransport {
    fn ping(&self) -> SyncResult<f64> {
        let body: PingResponse = decode(self.send(Endpoint::Ping, None)?)?;
        Ok(body.ts)
    }

    fn tracker_meta(&self) -> SyncResult<f64> {
        let body: MetaResponse = decode(self.send(Endpoint::TrackerMeta, None)?)?;
        Ok(body.mtime)
    }

    fn fetch(&self, kind: DocumentKind) -> SyncResult<Value> {
        let document = self.send(Endpoint::Fetch(kind), None)?;
        if !kind.accepts(&document) {
            return Err(SyncError::Protocol(format!(
                "server sent a malformed {kind} document"
            )));
        }
        Ok(document)
    }

    fn push(&self, kind: DocumentKind, document: &Value) -> SyncResult<()> {
        kind.validate(document)?;
        self.send(Endpoint::Store(kind), Some(document))?;
        Ok(())
    }
}
