//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, latency sums)
//!
//! Consumers:
//!     → Log output (stdout)
//!     → `/metrics` JSON endpoint
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - The registry is an owned value injected into workers, not a global
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;

pub use metrics::{ConnectionGuard, MetricsRegistry, MetricsSnapshot};
