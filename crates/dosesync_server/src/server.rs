//! HTTP data server.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::{ApiRequest, ApiResponse, HandlerContext, RequestHandler};
use axum::body::to_bytes;
use axum::extract::{ConnectInfo, Query, Request, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use bytes::Bytes;
use dosesync_protocol::{ACCESS_KEY_HEADER, ACCESS_KEY_QUERY};
use dosesync_store::DocumentStore;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// The data server.
///
/// Serves the tracker and library documents over HTTP until
/// [`shutdown`](Self::shutdown) is called. Each connection runs on its own
/// task and each request is handled on the blocking pool, so file I/O never
/// stalls the accept loop.
///
/// # Example
///
/// ```no_run
/// use dosesync_server::{DataServer, ServerConfig};
///
/// # async fn run() -> dosesync_server::ServerResult<()> {
/// let server = DataServer::spawn(ServerConfig::new("data")).await?;
/// println!("listening on port {}", server.port());
/// server.shutdown().await?;
/// # Ok(())
/// # }
/// ```
pub struct DataServer {
    local_addr: SocketAddr,
    handler: RequestHandler,
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<std::io::Result<()>>,
}

impl DataServer {
    /// Opens the store in `config.data_dir` and starts serving.
    ///
    /// # Errors
    ///
    /// - [`ServerError::Store`] if the data directory cannot be opened or is
    ///   owned by another process
    /// - [`ServerError::Bind`] if no port in the fallback range is free
    pub async fn spawn(config: ServerConfig) -> ServerResult<Self> {
        let store = Arc::new(DocumentStore::open(&config.data_dir)?);
        Self::spawn_with_store(config, store).await
    }

    /// Starts serving an already opened store.
    pub async fn spawn_with_store(
        config: ServerConfig,
        store: Arc<DocumentStore>,
    ) -> ServerResult<Self> {
        let listener =
            bind_with_fallback(config.bind_host, config.port, config.max_bind_attempts).await?;
        let local_addr = listener.local_addr()?;

        let context = Arc::new(HandlerContext::new(config, store));
        let handler = RequestHandler::new(context);
        let app = Router::new()
            .fallback(serve_request)
            .with_state(handler.clone());

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
        });

        info!(
            addr = %local_addr,
            auth = handler.context().access.requires_key(),
            "data server listening"
        );

        Ok(Self {
            local_addr,
            handler,
            shutdown_tx,
            task,
        })
    }

    /// Returns the bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns the bound port.
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Returns the request handler, e.g. to inspect audit counters.
    pub fn handler(&self) -> &RequestHandler {
        &self.handler
    }

    /// Stops accepting connections and releases the port.
    ///
    /// In-flight requests get `shutdown_grace` to finish; after that the
    /// server task is aborted. A write already past its rename is unaffected
    /// either way.
    pub async fn shutdown(self) -> ServerResult<()> {
        let grace = self.handler.context().config.shutdown_grace;
        let _ = self.shutdown_tx.send(());

        let mut task = self.task;
        let result = match tokio::time::timeout(grace, &mut task).await {
            Ok(Ok(result)) => result.map_err(ServerError::from),
            Ok(Err(err)) if err.is_cancelled() => Ok(()),
            Ok(Err(err)) => Err(ServerError::Internal(format!("server task panicked: {err}"))),
            Err(_) => {
                warn!("shutdown grace elapsed, aborting open connections");
                task.abort();
                Ok(())
            }
        };
        info!(addr = %self.local_addr, "data server stopped");
        result
    }
}

/// Binds `port`, moving to the next port while the current one is taken.
///
/// Port 0 asks the OS for an ephemeral port and is tried once.
pub async fn bind_with_fallback(
    host: IpAddr,
    port: u16,
    max_attempts: u16,
) -> ServerResult<TcpListener> {
    let attempts = if port == 0 { 1 } else { max_attempts.max(1) };

    for offset in 0..attempts {
        let Some(candidate) = port.checked_add(offset) else {
            break;
        };
        match TcpListener::bind((host, candidate)).await {
            Ok(listener) => {
                if offset > 0 {
                    info!(
                        preferred = port,
                        bound = candidate,
                        "preferred port busy, using fallback"
                    );
                }
                return Ok(listener);
            }
            Err(err) => debug!(port = candidate, error = %err, "bind failed"),
        }
    }

    Err(ServerError::Bind {
        host,
        first_port: port,
        attempts,
    })
}

async fn serve_request(
    State(handler): State<RequestHandler>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
) -> Response {
    let limit = handler.context().config.max_body_bytes;
    let (parts, body) = request.into_parts();

    let access_key = parts
        .headers
        .get(ACCESS_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
        .or_else(|| {
            Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
                .ok()
                .and_then(|Query(mut params)| params.remove(ACCESS_KEY_QUERY))
        });

    // Denied callers are answered before any of their body is read.
    if let Err(denied) = handler.gate(access_key.as_deref(), peer.ip()) {
        return into_http(denied);
    }

    // Only stores carry a body. An unreadable or oversized one fails the
    // payload check downstream.
    let body = if parts.method == Method::PUT {
        to_bytes(body, limit).await.unwrap_or_default()
    } else {
        Bytes::new()
    };

    let api_request = ApiRequest {
        method: parts.method.as_str().to_owned(),
        path: parts.uri.path().to_owned(),
        access_key,
        caller: peer.ip(),
        body,
    };

    let response =
        match tokio::task::spawn_blocking(move || handler.handle_admitted(&api_request)).await {
            Ok(response) => response,
            Err(err) => ApiResponse::from_error(&ServerError::Internal(format!(
                "handler task failed: {err}"
            ))),
        };
    into_http(response)
}

fn into_http(response: ApiResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(response.body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::AccessConfig;
    use std::net::Ipv4Addr;
    use std::time::Duration;
    use tempfile::tempdir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    #[tokio::test]
    async fn binds_ephemeral_port() {
        let listener = bind_with_fallback(LOCALHOST, 0, 20).await.unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn falls_back_to_next_port() {
        let taken = std::net::TcpListener::bind((LOCALHOST, 0)).unwrap();
        let port = taken.local_addr().unwrap().port();

        match bind_with_fallback(LOCALHOST, port, 20).await {
            Ok(listener) => {
                let bound = listener.local_addr().unwrap().port();
                assert!(bound > port && bound < port.saturating_add(20));
            }
            // The neighbouring ports may all be in use on a busy machine.
            Err(err) => assert!(matches!(err, ServerError::Bind { .. })),
        }
    }

    #[tokio::test]
    async fn gives_up_after_attempts() {
        let taken = std::net::TcpListener::bind((LOCALHOST, 0)).unwrap();
        let port = taken.local_addr().unwrap().port();

        let err = bind_with_fallback(LOCALHOST, port, 1).await.unwrap_err();
        assert!(matches!(
            err,
            ServerError::Bind { first_port, attempts: 1, .. } if first_port == port
        ));
    }

    #[tokio::test]
    async fn spawn_and_shutdown_releases_port() {
        let dir = tempdir().unwrap();
        let config = ServerConfig::new(dir.path())
            .with_bind_host(LOCALHOST)
            .with_port(0);

        let server = DataServer::spawn(config).await.unwrap();
        let addr = server.local_addr();
        assert_ne!(addr.port(), 0);
        server.shutdown().await.unwrap();

        let rebound = std::net::TcpListener::bind(addr);
        assert!(rebound.is_ok());
    }

    #[tokio::test]
    async fn second_server_on_same_data_dir_fails() {
        let dir = tempdir().unwrap();
        let config = ServerConfig::new(dir.path())
            .with_bind_host(LOCALHOST)
            .with_port(0);

        let server = DataServer::spawn(config.clone()).await.unwrap();
        let second = DataServer::spawn(config).await;
        assert!(matches!(
            second,
            Err(ServerError::Store(dosesync_store::StoreError::Locked))
        ));
        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn denied_put_is_answered_without_reading_body() {
        let dir = tempdir().unwrap();
        let config = ServerConfig::new(dir.path())
            .with_bind_host(LOCALHOST)
            .with_port(0)
            .with_access(AccessConfig::new().with_access_key("k3y"));
        let server = DataServer::spawn(config).await.unwrap();

        // Announce a large body but send only its first byte.
        let mut stream = TcpStream::connect(server.local_addr()).await.unwrap();
        stream
            .write_all(
                b"PUT /api/network/tracker-data HTTP/1.1\r\n\
                  Host: localhost\r\n\
                  Content-Length: 1000000\r\n\r\n{",
            )
            .await
            .unwrap();

        let mut buf = vec![0u8; 1024];
        let n = tokio::time::timeout(Duration::from_secs(2), stream.read(&mut buf))
            .await
            .expect("denial should not wait for the body")
            .unwrap();
        let head = String::from_utf8_lossy(&buf[..n]);
        assert!(head.starts_with("HTTP/1.1 401"), "unexpected response: {head}");
        assert!(!dir.path().join("tracker.json").exists());

        drop(stream);
        server.shutdown().await.unwrap();
    }
}
