//! TCP accept loop with backpressure.
//!
//! # Responsibilities
//! - Accept incoming TCP connections
//! - Enqueue each connection for the worker pool without blocking
//! - Reject connections the queue has no room for with a canned 503
//! - Stop accepting when shutdown is signalled
//!
//! # Design Decisions
//! - The accept loop never waits on the queue; a full queue is answered
//!   immediately so the client is not left hanging
//! - Rejections are written from a small bounded set of tasks that also
//!   drain the unread request, so the peer sees the 503 instead of a reset

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Semaphore};

use crate::error::ServeError;
use crate::http::response::{capacity_exceeded_bytes, error_html};
use crate::net::connection::ConnectionTask;
use crate::net::pool::{DispatchError, WorkerPool};
use crate::observability::metrics::{self, MetricsRegistry};

/// Concurrent rejection writers; beyond this, rejected sockets are dropped.
const MAX_PENDING_REJECTIONS: usize = 64;
/// Upper bound on writing and draining one rejected connection.
const REJECTION_DEADLINE: Duration = Duration::from_millis(500);
/// Pause after an accept error such as descriptor exhaustion.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

pub struct Listener {
    inner: TcpListener,
    metrics: Arc<MetricsRegistry>,
    rejections: Arc<Semaphore>,
    rejection: Arc<[u8]>,
    rejection_body_len: u64,
}

impl Listener {
    pub fn new(inner: TcpListener, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            inner,
            metrics,
            rejections: Arc::new(Semaphore::new(MAX_PENDING_REJECTIONS)),
            rejection: capacity_exceeded_bytes().into(),
            rejection_body_len: error_html(ServeError::CapacityExceeded.status()).len() as u64,
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    /// Accept until `shutdown` fires, dispatching into `pool`.
    pub async fn run(&self, pool: &WorkerPool, mut shutdown: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                accepted = self.inner.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let task = ConnectionTask::new(stream, peer);
                        tracing::trace!(connection_id = %task.id, peer_addr = %peer, "Connection accepted");
                        match pool.try_dispatch(task) {
                            Ok(()) => {}
                            Err(DispatchError::Full(task)) => self.reject(task),
                            Err(DispatchError::Closed(task)) => {
                                tracing::debug!(connection_id = %task.id, "Pool closed, dropping connection");
                                break;
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to accept connection");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },
                _ = shutdown.recv() => {
                    tracing::info!("Listener stopping");
                    break;
                }
            }
        }
    }

    /// Answer a connection the queue could not take with 503 and close it.
    fn reject(&self, task: ConnectionTask) {
        let started = Instant::now();
        tracing::warn!(
            connection_id = %task.id,
            peer_addr = %task.peer,
            "Dispatch queue full, rejecting connection"
        );
        metrics::record_connection_rejected();
        self.metrics.record_response(
            ServeError::CapacityExceeded.status().as_u16(),
            self.rejection_body_len,
            started.elapsed(),
        );

        let Ok(permit) = Arc::clone(&self.rejections).try_acquire_owned() else {
            return;
        };
        let response = Arc::clone(&self.rejection);
        tokio::spawn(async move {
            let _permit = permit;
            let mut stream = task.stream;
            let write = async {
                stream.write_all(&response).await?;
                stream.shutdown().await?;
                let mut sink = [0u8; 1024];
                while stream.read(&mut sink).await? > 0 {}
                Ok::<_, std::io::Error>(())
            };
            if let Ok(Err(e)) = tokio::time::timeout(REJECTION_DEADLINE, write).await {
                tracing::debug!(error = %e, "Failed to write rejection");
            }
        });
    }
}
