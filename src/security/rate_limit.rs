//! Per-client rate limiting with fixed counting windows.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;

use crate::config::SecurityConfig;
use crate::error::ServeError;
use crate::http::request::client_key;
use crate::observability::metrics;

/// Request accounting for one client.
#[derive(Debug, Clone, Copy)]
struct RateWindow {
    window_start: Instant,
    count: u32,
}

/// Outcome of an admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitResult {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

impl RateLimitResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitResult::Allowed { .. })
    }
}

/// Fixed-window rate limiter keyed by client address.
///
/// Each key's window is updated under its map entry's lock, so concurrent
/// checks for the same client are serialized and at most `limit` requests are
/// admitted per window.
pub struct RateLimiter {
    windows: DashMap<IpAddr, RateWindow>,
    limit: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            limit,
            window,
        }
    }

    pub fn from_config(config: &SecurityConfig) -> Self {
        Self::new(config.rate_limit, config.window())
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn check(&self, key: IpAddr) -> RateLimitResult {
        self.check_at(key, Instant::now())
    }

    pub fn check_at(&self, key: IpAddr, now: Instant) -> RateLimitResult {
        let mut window = self.windows.entry(key).or_insert(RateWindow {
            window_start: now,
            count: 0,
        });

        if now.saturating_duration_since(window.window_start) >= self.window {
            window.window_start = now;
            window.count = 0;
        }

        if window.count >= self.limit {
            let resets_at = window.window_start + self.window;
            return RateLimitResult::Limited {
                retry_after: resets_at.saturating_duration_since(now),
            };
        }

        window.count += 1;
        RateLimitResult::Allowed {
            remaining: self.limit - window.count,
        }
    }

    /// Forget clients whose window has ended. Returns how many were dropped.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows
            .retain(|_, w| now.saturating_duration_since(w.window_start) < self.window);
        before.saturating_sub(self.windows.len())
    }

    /// Number of clients currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }
}

/// Middleware rejecting clients over their limit before any other work.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let client = client_key(&request);

    match limiter.check(client) {
        RateLimitResult::Allowed { .. } => next.run(request).await,
        RateLimitResult::Limited { retry_after } => {
            tracing::warn!(
                client = %client,
                window_secs = limiter.window().as_secs(),
                "Rate limit exceeded"
            );
            metrics::record_rate_limited();

            let mut response = ServeError::RateLimited.into_response();
            let secs = retry_after.as_secs().max(1);
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicU32, Ordering};

    const CLIENT: IpAddr = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1));

    #[test]
    fn admits_exactly_limit_per_window() {
        let limiter = RateLimiter::new(10, Duration::from_secs(60));
        let t0 = Instant::now();

        for i in 0..10 {
            let result = limiter.check_at(CLIENT, t0 + Duration::from_millis(i));
            assert_eq!(result, RateLimitResult::Allowed { remaining: 9 - i as u32 });
        }
        assert!(!limiter.check_at(CLIENT, t0 + Duration::from_secs(59)).is_allowed());
    }

    #[test]
    fn new_window_after_expiry() {
        let limiter = RateLimiter::new(2, Duration::from_secs(1));
        let t0 = Instant::now();

        assert!(limiter.check_at(CLIENT, t0).is_allowed());
        assert!(limiter.check_at(CLIENT, t0).is_allowed());
        match limiter.check_at(CLIENT, t0 + Duration::from_millis(400)) {
            RateLimitResult::Limited { retry_after } => {
                assert_eq!(retry_after, Duration::from_millis(600))
            }
            other => panic!("expected limit, got {other:?}"),
        }
        assert!(limiter.check_at(CLIENT, t0 + Duration::from_secs(1)).is_allowed());
    }

    #[test]
    fn clients_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let other = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 2));

        assert!(limiter.check(CLIENT).is_allowed());
        assert!(limiter.check(other).is_allowed());
        assert!(!limiter.check(CLIENT).is_allowed());
        assert!(!limiter.check(other).is_allowed());
    }

    #[test]
    fn sweep_reclaims_stale_windows() {
        let limiter = RateLimiter::new(5, Duration::from_secs(10));
        let t0 = Instant::now();
        limiter.check_at(CLIENT, t0);
        limiter.check_at(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), t0 + Duration::from_secs(8));

        assert_eq!(limiter.sweep_at(t0 + Duration::from_secs(12)), 1);
        assert_eq!(limiter.tracked_clients(), 1);
    }

    #[test]
    fn concurrent_checks_never_exceed_limit() {
        for round in 0..20 {
            let limit = 25 + round;
            let limiter = RateLimiter::new(limit, Duration::from_secs(60));
            let admitted = AtomicU32::new(0);

            std::thread::scope(|scope| {
                for _ in 0..8 {
                    scope.spawn(|| {
                        for _ in 0..20 {
                            if fastrand::bool() {
                                std::thread::yield_now();
                            }
                            if limiter.check(CLIENT).is_allowed() {
                                admitted.fetch_add(1, Ordering::SeqCst);
                            }
                        }
                    });
                }
            });

            // 160 attempts against a limit below that.
            assert_eq!(admitted.load(Ordering::SeqCst), limit);
        }
    }
}
