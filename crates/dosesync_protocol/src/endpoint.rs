//! Endpoint routing table.

use crate::document::DocumentKind;

/// Common prefix of every endpoint path.
pub const API_PREFIX: &str = "/api/network";

/// HTTP methods used by the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Read.
    Get,
    /// Wholesale replace.
    Put,
}

impl Method {
    /// Parses a method name. Only `GET` and `PUT` are part of the protocol.
    pub fn parse(method: &str) -> Option<Self> {
        if method.eq_ignore_ascii_case("GET") {
            Some(Method::Get)
        } else if method.eq_ignore_ascii_case("PUT") {
            Some(Method::Put)
        } else {
            None
        }
    }

    /// Returns the method name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Put => "PUT",
        }
    }
}

/// A protocol endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Liveness probe.
    Ping,
    /// Modification time of the tracker document.
    TrackerMeta,
    /// Full document read.
    Fetch(DocumentKind),
    /// Full document replace.
    Store(DocumentKind),
}

impl Endpoint {
    /// Resolves a method and path to an endpoint.
    ///
    /// Paths are trailing-slash-insensitive. Returns `None` for unknown paths
    /// and for known paths with an unsupported method.
    pub fn route(method: &str, path: &str) -> Option<Self> {
        let method = Method::parse(method)?;
        let resource = normalize_path(path).strip_prefix(API_PREFIX)?;

        let endpoint = match (method, resource) {
            (Method::Get, "/ping") => Endpoint::Ping,
            (Method::Get, "/tracker-meta") => Endpoint::TrackerMeta,
            (Method::Get, "/tracker-data") => Endpoint::Fetch(DocumentKind::Tracker),
            (Method::Put, "/tracker-data") => Endpoint::Store(DocumentKind::Tracker),
            (Method::Get, "/library-data") => Endpoint::Fetch(DocumentKind::Library),
            (Method::Put, "/library-data") => Endpoint::Store(DocumentKind::Library),
            _ => return None,
        };
        Some(endpoint)
    }

    /// Returns the method this endpoint is served on.
    pub fn method(&self) -> Method {
        match self {
            Endpoint::Store(_) => Method::Put,
            _ => Method::Get,
        }
    }

    /// Returns the canonical path (no trailing slash).
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::Ping => "/api/network/ping",
            Endpoint::TrackerMeta => "/api/network/tracker-meta",
            Endpoint::Fetch(DocumentKind::Tracker) | Endpoint::Store(DocumentKind::Tracker) => {
                "/api/network/tracker-data"
            }
            Endpoint::Fetch(DocumentKind::Library) | Endpoint::Store(DocumentKind::Library) => {
                "/api/network/library-data"
            }
        }
    }
}

/// Strips trailing slashes, keeping a bare `/`.
pub fn normalize_path(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/"
    } else {
        trimmed
    }
}
