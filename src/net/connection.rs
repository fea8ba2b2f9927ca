//! Per-connection serving.
//!
//! # Responsibilities
//! - Carry an accepted socket from the listener to a worker
//! - Generate unique connection IDs for tracing
//! - Drive one HTTP/1.1 connection through the router under a deadline
//! - Count the connection as active for its whole lifetime

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ConnectInfo;
use axum::Router;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tower::ServiceExt;

use crate::config::ListenerConfig;
use crate::observability::MetricsRegistry;

/// Using relaxed ordering is sufficient since we only need uniqueness.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// An accepted connection waiting in the dispatch queue.
#[derive(Debug)]
pub struct ConnectionTask {
    pub id: ConnectionId,
    pub stream: TcpStream,
    pub peer: SocketAddr,
    pub accepted_at: Instant,
}

impl ConnectionTask {
    pub fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            id: ConnectionId::new(),
            stream,
            peer,
            accepted_at: Instant::now(),
        }
    }
}

/// Serves dequeued connections through the application router.
#[derive(Clone)]
pub struct ConnectionHandler {
    app: Router,
    metrics: Arc<MetricsRegistry>,
    timeout: Duration,
    keep_alive: bool,
}

impl ConnectionHandler {
    pub fn new(app: Router, metrics: Arc<MetricsRegistry>, config: &ListenerConfig) -> Self {
        Self {
            app,
            metrics,
            timeout: config.timeout(),
            keep_alive: config.keep_alive,
        }
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// Serve every request on `task` until the peer closes, the connection
    /// finishes (without keep-alive, after one response) or the deadline
    /// passes. Dropping the connection future closes the socket.
    pub async fn handle(&self, task: ConnectionTask) {
        let started = Instant::now();
        let _guard = self.metrics.track_connection();
        let ConnectionTask {
            id,
            stream,
            peer,
            accepted_at,
        } = task;

        tracing::debug!(
            connection_id = %id,
            peer_addr = %peer,
            queued_ms = accepted_at.elapsed().as_millis() as u64,
            "Connection dequeued"
        );

        let app = self.app.clone();
        let service = service_fn(move |mut request: Request<Incoming>| {
            request.extensions_mut().insert(ConnectInfo(peer));
            app.clone().oneshot(request)
        });

        let connection = http1::Builder::new()
            .keep_alive(self.keep_alive)
            .serve_connection(TokioIo::new(stream), service);

        match tokio::time::timeout(self.timeout, connection).await {
            Ok(Ok(())) => {
                tracing::trace!(connection_id = %id, "Connection closed");
            }
            Ok(Err(e)) if e.is_parse() || e.is_parse_too_large() => {
                // hyper answers unparseable requests itself, before the router.
                self.metrics.record_response(400, 0, started.elapsed());
                tracing::debug!(connection_id = %id, peer_addr = %peer, error = %e, "Malformed request");
            }
            Ok(Err(e)) => {
                tracing::debug!(connection_id = %id, error = %e, "Connection error");
            }
            Err(_) => {
                tracing::warn!(
                    connection_id = %id,
                    peer_addr = %peer,
                    timeout_secs = self.timeout.as_secs(),
                    "Connection exceeded timeout, closing"
                );
            }
        }
    }
}
