//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop)
//!     → pool.rs (bounded queue; full → canned 503 and close)
//!     → worker
//!     → connection.rs (HTTP/1.1 via hyper, deadline, active count)
//!     → Hand off to the HTTP router
//! ```
//!
//! # Design Decisions
//! - Concurrency is fixed at startup: `thread_pool_size` workers, never
//!   one task per connection
//! - A fault while serving one connection never takes its worker down

pub mod connection;
pub mod listener;
pub mod pool;

pub use connection::{ConnectionHandler, ConnectionId, ConnectionTask};
pub use listener::Listener;
pub use pool::{DispatchError, WorkerPool};
