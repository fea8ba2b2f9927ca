//! Response caching subsystem.
//!
//! # Data Flow
//! ```text
//! Static request (rate limit and method already admitted)
//!     → response_cache.rs (lookup by normalized path)
//!     → hit: stored body + headers
//!     → miss: resolver reads file → response_cache.rs (store)
//!     → compression.rs (per-request gzip negotiation)
//! ```
//!
//! # Design Decisions
//! - `/health` and `/metrics` never touch the cache
//! - The cache holds identity bodies; compression is applied afterwards
//! - No invalidation API beyond TTL expiry and capacity eviction

pub mod compression;
pub mod response_cache;

pub use compression::{negotiate, Encoded};
pub use response_cache::{CacheEntry, CacheStats, ResponseCache};
