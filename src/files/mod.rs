//! Static file subsystem.
//!
//! # Data Flow
//! ```text
//! Request path
//!     → resolver.rs (decode, normalize, confine to root)
//!     → file: size check → read
//!     → directory: index file, or listing.rs (HTML index), or 403
//! ```

pub mod listing;
pub mod resolver;

pub use resolver::{normalize_path, FileResolver, Resolved};
