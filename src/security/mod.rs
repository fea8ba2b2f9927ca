//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs (per-client fixed window, 429 before any other work)
//!     → access_control.rs (allowed methods, 405)
//!     → Pass to routing
//! Outgoing response:
//!     → headers.rs (Server, CORS)
//! ```
//!
//! # Design Decisions
//! - Fail fast: rejected requests never reach the cache or filesystem
//! - Fail closed: reject on any security check failure
//! - No trust in client input

pub mod access_control;
pub mod headers;
pub mod rate_limit;

pub use access_control::AllowedMethods;
pub use rate_limit::{RateLimitResult, RateLimiter};
