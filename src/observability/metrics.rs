//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Aggregate request counters, byte counts, status codes and latency
//! - Track in-flight connections
//! - Mirror every update to the `metrics` facade for Prometheus scraping
//!
//! # Metrics
//! - `http_requests_total` (counter): completed requests by status
//! - `http_response_bytes_total` (counter): body bytes written
//! - `http_request_duration_seconds` (histogram): handling latency
//! - `http_active_connections` (gauge): connections owned by workers
//! - `cache_hits_total` / `cache_misses_total` (counter)
//! - `rate_limited_total` (counter)
//! - `connections_rejected_total` (counter): dispatch queue full
//!
//! # Design Decisions
//! - Each field is an independent atomic; a snapshot is not a single
//!   consistent cut across fields, which is acceptable for monitoring
//! - Average latency is derived on read from a running sum and count

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{body::Body, extract::State, http::Request, middleware::Next, response::Response};
use dashmap::DashMap;
use hyper::body::Body as _;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use serde::Serialize;

/// Lower bound on uptime when computing request rate.
const MIN_UPTIME_SECS: f64 = 1e-3;

/// Process-wide request statistics shared by all workers.
#[derive(Debug)]
pub struct MetricsRegistry {
    started: Instant,
    total_requests: AtomicU64,
    bytes_served: AtomicU64,
    status_codes: DashMap<u16, u64>,
    response_time_micros: AtomicU64,
    response_count: AtomicU64,
    active_connections: Arc<AtomicU64>,
}

/// Point-in-time view of the registry, as served by `/metrics`.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_seconds: f64,
    pub total_requests: u64,
    pub active_connections: u64,
    /// Mean handling time in seconds.
    pub average_response_time: f64,
    pub bytes_served: u64,
    pub requests_per_second: f64,
    pub status_codes: BTreeMap<String, u64>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            total_requests: AtomicU64::new(0),
            bytes_served: AtomicU64::new(0),
            status_codes: DashMap::new(),
            response_time_micros: AtomicU64::new(0),
            response_count: AtomicU64::new(0),
            active_connections: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Record one completed response, whatever its outcome.
    pub fn record_response(&self, status: u16, bytes: u64, elapsed: Duration) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.bytes_served.fetch_add(bytes, Ordering::Relaxed);
        *self.status_codes.entry(status).or_insert(0) += 1;
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.response_time_micros.fetch_add(micros, Ordering::Relaxed);
        self.response_count.fetch_add(1, Ordering::Relaxed);

        record_request(status, bytes, elapsed);
    }

    /// Count a connection as active until the returned guard is dropped.
    pub fn track_connection(&self) -> ConnectionGuard {
        let now = self.active_connections.fetch_add(1, Ordering::SeqCst) + 1;
        record_active_connections(now);
        ConnectionGuard {
            active: Arc::clone(&self.active_connections),
        }
    }

    pub fn active_connections(&self) -> u64 {
        self.active_connections.load(Ordering::SeqCst)
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn bytes_served(&self) -> u64 {
        self.bytes_served.load(Ordering::Relaxed)
    }

    pub fn status_count(&self, status: u16) -> u64 {
        self.status_codes.get(&status).map(|c| *c).unwrap_or(0)
    }

    /// Mean response time, zero before the first response.
    pub fn average_response_time(&self) -> Duration {
        let count = self.response_count.load(Ordering::Relaxed);
        if count == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(self.response_time_micros.load(Ordering::Relaxed) / count)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let uptime = self.uptime().as_secs_f64();
        let total_requests = self.total_requests();
        MetricsSnapshot {
            uptime_seconds: uptime,
            total_requests,
            active_connections: self.active_connections(),
            average_response_time: self.average_response_time().as_secs_f64(),
            bytes_served: self.bytes_served(),
            requests_per_second: total_requests as f64 / uptime.max(MIN_UPTIME_SECS),
            status_codes: self
                .status_codes
                .iter()
                .map(|e| (e.key().to_string(), *e.value()))
                .collect(),
        }
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard that tracks a connection's lifetime.
/// Decrements the active count when dropped, including on unwind.
#[derive(Debug)]
pub struct ConnectionGuard {
    active: Arc<AtomicU64>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let now = self.active.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        record_active_connections(now);
    }
}

/// Install the Prometheus exporter with an HTTP scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_prometheus(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Prometheus exporter listening");
    Ok(())
}

pub fn record_request(status: u16, bytes: u64, elapsed: Duration) {
    ::metrics::counter!("http_requests_total", "status" => status.to_string()).increment(1);
    ::metrics::counter!("http_response_bytes_total").increment(bytes);
    ::metrics::histogram!("http_request_duration_seconds").record(elapsed.as_secs_f64());
}

pub fn record_active_connections(active: u64) {
    ::metrics::gauge!("http_active_connections").set(active as f64);
}

pub fn record_cache_lookup(hit: bool) {
    if hit {
        ::metrics::counter!("cache_hits_total").increment(1);
    } else {
        ::metrics::counter!("cache_misses_total").increment(1);
    }
}

pub fn record_rate_limited() {
    ::metrics::counter!("rate_limited_total").increment(1);
}

pub fn record_connection_rejected() {
    ::metrics::counter!("connections_rejected_total").increment(1);
}

/// Middleware recording every response that passes through the router.
///
/// Sits outside the timeout and panic layers so 408 and 500 responses
/// produced there are counted too. Byte counts use the exact body length,
/// which is zero for HEAD responses.
pub async fn track_requests(
    State(registry): State<Arc<MetricsRegistry>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let start = Instant::now();
    let response = next.run(request).await;
    let bytes = response.body().size_hint().exact().unwrap_or(0);
    registry.record_response(response.status().as_u16(), bytes, start.elapsed());
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty() {
        let registry = MetricsRegistry::new();
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.total_requests, 0);
        assert_eq!(snapshot.bytes_served, 0);
        assert_eq!(snapshot.active_connections, 0);
        assert_eq!(snapshot.average_response_time, 0.0);
        assert!(snapshot.requests_per_second.is_finite());
    }

    #[test]
    fn records_responses() {
        let registry = MetricsRegistry::new();
        registry.record_response(200, 1024, Duration::from_millis(10));
        registry.record_response(404, 300, Duration::from_millis(30));

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.total_requests, 2);
        assert_eq!(snapshot.bytes_served, 1324);
        assert_eq!(snapshot.status_codes.get("200"), Some(&1));
        assert_eq!(snapshot.status_codes.get("404"), Some(&1));
        assert_eq!(registry.average_response_time(), Duration::from_millis(20));
    }

    #[test]
    fn n_requests_of_b_bytes() {
        let registry = Arc::new(MetricsRegistry::new());
        std::thread::scope(|scope| {
            for _ in 0..4 {
                let registry = Arc::clone(&registry);
                scope.spawn(move || {
                    for _ in 0..250 {
                        registry.record_response(200, 512, Duration::from_micros(100));
                    }
                });
            }
        });
        assert_eq!(registry.total_requests(), 1000);
        assert_eq!(registry.bytes_served(), 1000 * 512);
        assert_eq!(registry.status_count(200), 1000);
    }

    #[test]
    fn connection_guard_counts() {
        let registry = MetricsRegistry::new();
        let guard1 = registry.track_connection();
        let guard2 = registry.track_connection();
        assert_eq!(registry.active_connections(), 2);

        drop(guard1);
        assert_eq!(registry.active_connections(), 1);
        drop(guard2);
        assert_eq!(registry.active_connections(), 0);
    }
}
