//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Connection from a worker
//!     → server.rs (Axum router, middleware stack)
//!     → request.rs (client key, request ID)
//!     → handlers.rs (/health, /metrics, static files)
//!     → response.rs (error pages, JSON bodies)
//!     → Send to client
//! ```

pub mod handlers;
pub mod request;
pub mod response;
pub mod server;

pub use handlers::AppState;
pub use request::X_REQUEST_ID;
pub use server::HttpServer;
