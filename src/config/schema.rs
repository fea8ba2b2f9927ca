//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the file server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener and worker pool settings.
    pub listener: ListenerConfig,

    /// Admission control (rate limiting, methods, size limits, CORS).
    pub security: SecurityConfig,

    /// Document root and directory handling.
    pub files: FilesConfig,

    /// Response cache settings.
    pub cache: CacheConfig,

    /// Response compression settings.
    pub compression: CompressionConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl ServerConfig {
    /// `host:port` string for binding.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.listener.host, self.listener.port)
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Interface to bind.
    pub host: String,

    /// TCP port to bind.
    pub port: u16,

    /// Number of workers draining the dispatch queue.
    pub thread_pool_size: usize,

    /// Maximum accepted connections waiting for a worker (backpressure).
    pub queue_depth: usize,

    /// Per-connection deadline in seconds.
    pub timeout_secs: u64,

    /// Serve more than one request per connection.
    pub keep_alive: bool,
}

impl ListenerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            thread_pool_size: 10,
            queue_depth: 128,
            timeout_secs: 30,
            keep_alive: false,
        }
    }
}

/// Security configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Enable per-client rate limiting.
    pub rate_limit_enabled: bool,

    /// Requests admitted per client per window.
    pub rate_limit: u32,

    /// Rate limiting window length in seconds.
    pub window_secs: u64,

    /// Largest file served, in bytes.
    pub max_file_size: u64,

    /// Request methods admitted (upper case tokens).
    pub allowed_methods: Vec<String>,

    /// Attach CORS headers to every response.
    pub cors_enabled: bool,

    /// Values for `Access-Control-Allow-Origin`.
    pub cors_origins: Vec<String>,
}

impl SecurityConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            rate_limit_enabled: true,
            rate_limit: 100,
            window_secs: 60,
            max_file_size: 10 * 1024 * 1024, // 10MB
            allowed_methods: vec!["GET".to_string(), "HEAD".to_string(), "POST".to_string()],
            cors_enabled: true,
            cors_origins: vec!["*".to_string()],
        }
    }
}

/// Static file configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FilesConfig {
    /// Document root.
    pub root: PathBuf,

    /// Files served in place of a directory listing, in priority order.
    pub index_files: Vec<String>,

    /// Generate listings for directories without an index file.
    pub directory_listing: bool,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            index_files: vec!["index.html".to_string(), "index.htm".to_string()],
            directory_listing: true,
        }
    }
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,

    /// Maximum number of cached responses.
    pub max_size: usize,

    /// Entry lifetime in seconds.
    pub ttl_secs: u64,

    /// Bodies larger than this are never cached.
    pub max_entry_bytes: usize,

    /// Interval of the expired-entry sweep in seconds (0 disables it).
    pub sweep_interval_secs: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size: 1000,
            ttl_secs: 3600,
            max_entry_bytes: 1024 * 1024,
            sweep_interval_secs: 60,
        }
    }
}

/// Compression configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CompressionConfig {
    pub enabled: bool,

    /// Bodies smaller than this are sent as-is.
    pub min_size: usize,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_size: 256,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Install the Prometheus exporter.
    pub prometheus_enabled: bool,

    /// Prometheus scrape endpoint bind address.
    pub prometheus_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            prometheus_enabled: false,
            prometheus_address: "127.0.0.1:9090".to_string(),
        }
    }
}
