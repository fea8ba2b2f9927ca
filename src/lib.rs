//! Concurrent static file server library.

// Core subsystems
pub mod config;
pub mod error;
pub mod files;
pub mod http;
pub mod net;

// Request admission and reuse
pub mod cache;
pub mod security;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::schema::ServerConfig;
pub use error::ServeError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
