//! Request handling for the `/api/network/` endpoints.
//!
//! The handler is transport-agnostic: the HTTP layer in `server.rs` turns
//! each request into an [`ApiRequest`] and writes back the [`ApiResponse`].

use crate::access::AccessController;
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use bytes::Bytes;
use dosesync_protocol::{
    AckResponse, DocumentKind, Endpoint, ErrorResponse, MetaResponse, PingResponse,
};
use dosesync_store::DocumentStore;
use serde::Serialize;
use serde_json::Value;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, error};

/// A request as seen by the handler.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: String,
    /// Request path, without query string.
    pub path: String,
    /// Access key supplied by the caller.
    pub access_key: Option<String>,
    /// Caller address.
    pub caller: IpAddr,
    /// Raw request body.
    pub body: Bytes,
}

impl ApiRequest {
    /// Creates a bodiless request.
    pub fn new(method: impl Into<String>, path: impl Into<String>, caller: IpAddr) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            access_key: None,
            caller,
            body: Bytes::new(),
        }
    }

    /// Attaches an access key.
    pub fn with_access_key(mut self, key: impl Into<String>) -> Self {
        self.access_key = Some(key.into());
        self
    }

    /// Attaches a body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

/// A JSON response with its status code.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// JSON body.
    pub body: Value,
}

impl ApiResponse {
    /// 200 with the given body.
    pub fn ok(body: impl Serialize) -> Self {
        match serde_json::to_value(body) {
            Ok(body) => Self { status: 200, body },
            Err(err) => Self::from_error(&ServerError::Internal(err.to_string())),
        }
    }

    /// Failure response for an error.
    pub fn from_error(err: &ServerError) -> Self {
        let code = err.error_code();
        Self {
            status: code.status(),
            body: serde_json::to_value(ErrorResponse::new(code)).unwrap_or(Value::Null),
        }
    }

    /// Returns true for 2xx responses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Shared state behind every request.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// Document store (shared across all handlers).
    pub store: Arc<DocumentStore>,
    /// Access controller (shared across all handlers).
    pub access: AccessController,
}

impl HandlerContext {
    /// Creates a handler context.
    pub fn new(config: ServerConfig, store: Arc<DocumentStore>) -> Self {
        let access = AccessController::new(config.access.clone());
        Self {
            config,
            store,
            access,
        }
    }
}

/// Handler for data server requests.
#[derive(Clone)]
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Returns the shared context.
    pub fn context(&self) -> &HandlerContext {
        &self.context
    }

    /// Handles one request.
    ///
    /// Access control runs before routing and before the body is parsed.
    /// Every failure becomes a JSON error response.
    pub fn handle(&self, request: &ApiRequest) -> ApiResponse {
        match self.gate(request.access_key.as_deref(), request.caller) {
            Ok(()) => self.handle_admitted(request),
            Err(denied) => denied,
        }
    }

    /// Runs the access gates ahead of reading the request body.
    ///
    /// A denial is audited and returned as the response to send.
    pub fn gate(&self, access_key: Option<&str>, caller: IpAddr) -> Result<(), ApiResponse> {
        self.context.access.check(access_key, caller).map_err(|code| {
            let err = ServerError::from(code);
            debug!(caller = %caller, error = %err, "request denied at gate");
            ApiResponse::from_error(&err)
        })
    }

    /// Handles a request that already passed [`gate`](Self::gate).
    pub fn handle_admitted(&self, request: &ApiRequest) -> ApiResponse {
        match self.dispatch(request) {
            Ok(response) => response,
            Err(err) => {
                if err.is_server_error() {
                    error!(path = %request.path, error = %err, "request failed");
                } else {
                    debug!(path = %request.path, error = %err, "request rejected");
                }
                ApiResponse::from_error(&err)
            }
        }
    }

    fn dispatch(&self, request: &ApiRequest) -> ServerResult<ApiResponse> {
        let endpoint =
            Endpoint::route(&request.method, &request.path).ok_or(ServerError::NotFound)?;
        debug!(?endpoint, caller = %request.caller, "request");

        let store = &self.context.store;
        match endpoint {
            Endpoint::Ping => Ok(ApiResponse::ok(PingResponse::now())),
            Endpoint::TrackerMeta => {
                let mtime = store.mtime(DocumentKind::Tracker)?;
                Ok(ApiResponse::ok(MetaResponse::new(mtime)))
            }
            Endpoint::Fetch(kind) => Ok(ApiResponse {
                status: 200,
                body: store.read(kind),
            }),
            Endpoint::Store(kind) => {
                let document = self.parse_payload(kind, request)?;
                store.write(kind, &document)?;
                Ok(ApiResponse::ok(AckResponse::ok()))
            }
        }
    }

    /// Parses and shape-checks a payload, auditing rejects.
    fn parse_payload(&self, kind: DocumentKind, request: &ApiRequest) -> ServerResult<Value> {
        let parsed = serde_json::from_slice::<Value>(&request.body)
            .ok()
            .filter(|document| kind.accepts(document));

        parsed.ok_or_else(|| {
            self.context
                .access
                .audit(kind.invalid_payload_code(), request.caller);
            ServerError::InvalidPayload(kind)
        })
    }
}
