//! Fixed-size worker pool fed by a bounded dispatch queue.
//!
//! # Responsibilities
//! - Start `thread_pool_size` long-lived workers at startup
//! - Hand accepted connections to workers through a queue of `queue_depth`
//! - Report a full queue to the listener instead of waiting
//! - Keep workers alive across faults in connection handling
//!
//! # Design Decisions
//! - Workers share one receiver behind an async mutex; only the worker
//!   waiting for the next task holds it
//! - A panic while serving is caught per connection, logged and counted as
//!   a 500; the worker then takes the next task
//! - Shutdown closes the queue; workers drain what is already queued and exit

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures_util::FutureExt;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::net::connection::{ConnectionHandler, ConnectionTask};

/// Why a connection could not be queued.
#[derive(Debug)]
pub enum DispatchError {
    /// Queue is at capacity.
    Full(ConnectionTask),
    /// Pool is shutting down.
    Closed(ConnectionTask),
}

pub struct WorkerPool {
    sender: mpsc::Sender<ConnectionTask>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `size` workers sharing a queue of `queue_depth` slots.
    pub fn start(size: usize, queue_depth: usize, handler: ConnectionHandler) -> Self {
        let size = size.max(1);
        let queue_depth = queue_depth.max(1);
        let (sender, receiver) = mpsc::channel(queue_depth);
        let receiver = Arc::new(Mutex::new(receiver));
        let handler = Arc::new(handler);

        let workers = (0..size)
            .map(|worker| {
                let receiver = Arc::clone(&receiver);
                let handler = Arc::clone(&handler);
                tokio::spawn(worker_loop(worker, receiver, handler))
            })
            .collect();

        tracing::info!(workers = size, queue_depth, "Worker pool started");

        Self { sender, workers }
    }

    /// Queue a connection without waiting.
    pub fn try_dispatch(&self, task: ConnectionTask) -> Result<(), DispatchError> {
        self.sender.try_send(task).map_err(|e| match e {
            TrySendError::Full(task) => DispatchError::Full(task),
            TrySendError::Closed(task) => DispatchError::Closed(task),
        })
    }

    /// Close the queue and wait for every worker to finish.
    pub async fn shutdown(self) {
        drop(self.sender);
        for worker in self.workers {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "Worker task ended abnormally");
            }
        }
        tracing::info!("Worker pool stopped");
    }
}

async fn worker_loop(
    worker: usize,
    receiver: Arc<Mutex<mpsc::Receiver<ConnectionTask>>>,
    handler: Arc<ConnectionHandler>,
) {
    loop {
        let next = receiver.lock().await.recv().await;
        let Some(task) = next else {
            break;
        };

        let id = task.id;
        let started = Instant::now();
        let outcome = AssertUnwindSafe(handler.handle(task)).catch_unwind().await;

        if let Err(panic) = outcome {
            tracing::error!(
                worker,
                connection_id = %id,
                panic = %panic_message(panic.as_ref()),
                "Worker recovered from fault while serving connection"
            );
            handler.metrics().record_response(500, 0, started.elapsed());
        }
    }
    tracing::debug!(worker, "Worker exiting");
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
