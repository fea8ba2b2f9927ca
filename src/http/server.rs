//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with the endpoints and static fallback
//! - Wire up middleware (tracing, request ID, metrics, timeout, panics,
//!   rate limiting, method guard, response headers)
//! - Start the worker pool and accept loop
//! - Run periodic cache and rate limiter maintenance
//! - Stop accepting and drain workers on shutdown

use std::any::Any;
use std::sync::Arc;

use std::time::Duration;

use axum::{
    error_handling::HandleErrorLayer,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::any,
    BoxError, Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::cache::ResponseCache;
use crate::config::ServerConfig;
use crate::error::ServeError;
use crate::http::handlers::{self, AppState};
use crate::http::response::error_page;
use crate::net::{ConnectionHandler, Listener, WorkerPool};
use crate::observability::metrics::{self, MetricsRegistry};
use crate::security::{access_control, headers, rate_limit, AllowedMethods, RateLimiter};

/// Static file server: router plus the connection machinery around it.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    /// Build the server. Fails if the document root cannot be opened.
    pub fn new(config: ServerConfig) -> std::io::Result<Self> {
        let state = AppState::new(Arc::new(config))?;
        let router = Self::build_router(&state);
        Ok(Self { router, state })
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// Layers added later wrap earlier ones, so requests pass the rate
    /// limiter before the method guard and both before any handler.
    fn build_router(state: &AppState) -> Router {
        let config = &state.config;
        let allowed = Arc::new(AllowedMethods::new(&config.security.allowed_methods));

        let mut router = Router::new()
            .route("/health", any(handlers::health))
            .route("/metrics", any(handlers::metrics_report))
            .fallback(handlers::serve_static)
            .with_state(state.clone())
            .layer(middleware::from_fn_with_state(
                Arc::clone(&allowed),
                access_control::method_guard_middleware,
            ));

        if let Some(limiter) = &state.limiter {
            router = router.layer(middleware::from_fn_with_state(
                Arc::clone(limiter),
                rate_limit::rate_limit_middleware,
            ));
        }

        let router = router.layer(CatchPanicLayer::custom(handle_panic));
        let router = with_deadline(router, config.listener.timeout())
            .layer(middleware::from_fn_with_state(
                Arc::clone(&state.metrics),
                metrics::track_requests,
            ))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http());

        headers::apply(router, &config.security, &allowed)
    }

    /// The fully layered router, for serving in-process.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn metrics(&self) -> Arc<MetricsRegistry> {
        Arc::clone(&self.state.metrics)
    }

    pub fn cache(&self) -> Option<Arc<ResponseCache>> {
        self.state.cache.clone()
    }

    /// Run the server, accepting connections on the given listener until
    /// `shutdown` fires. Queued connections are served before returning.
    pub async fn run(self, listener: TcpListener, shutdown: broadcast::Receiver<()>) -> std::io::Result<()> {
        let config = Arc::clone(&self.state.config);
        let listener = Listener::new(listener, Arc::clone(&self.state.metrics));
        let addr = listener.local_addr()?;

        tracing::info!(
            address = %addr,
            root = %self.state.resolver.root().display(),
            workers = config.listener.thread_pool_size,
            queue_depth = config.listener.queue_depth,
            cache_enabled = self.state.cache.is_some(),
            rate_limit_enabled = self.state.limiter.is_some(),
            "HTTP server starting"
        );

        let maintenance = spawn_maintenance(&self.state, shutdown.resubscribe());

        let handler = ConnectionHandler::new(self.router, Arc::clone(&self.state.metrics), &config.listener);
        let pool = WorkerPool::start(
            config.listener.thread_pool_size,
            config.listener.queue_depth,
            handler,
        );

        listener.run(&pool, shutdown).await;
        drop(listener);

        pool.shutdown().await;
        if let Some(task) = maintenance {
            task.abort();
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Periodically purge expired cache entries and idle rate limit windows.
fn spawn_maintenance(state: &AppState, mut shutdown: broadcast::Receiver<()>) -> Option<JoinHandle<()>> {
    let secs = state.config.cache.sweep_interval_secs;
    if secs == 0 || (state.cache.is_none() && state.limiter.is_none()) {
        return None;
    }

    let cache = state.cache.clone();
    let limiter: Option<Arc<RateLimiter>> = state.limiter.clone();
    let period = Duration::from_secs(secs);

    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.tick().await;
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let purged = cache.as_ref().map(|c| c.purge_expired()).unwrap_or(0);
                    let swept = limiter.as_ref().map(|l| l.sweep()).unwrap_or(0);
                    if purged > 0 || swept > 0 {
                        tracing::debug!(purged, swept, "Maintenance sweep");
                    }
                }
                _ = shutdown.recv() => break,
            }
        }
    }))
}

/// Bound request handling by `deadline`; an overrun gets the 408 page.
fn with_deadline(router: Router, deadline: Duration) -> Router {
    router.layer(
        ServiceBuilder::new()
            .layer(HandleErrorLayer::new(handle_timeout))
            .timeout(deadline),
    )
}

async fn handle_timeout(err: BoxError) -> Response {
    if err.is::<tower::timeout::error::Elapsed>() {
        ServeError::Timeout.into_response()
    } else {
        ServeError::Internal(err.to_string()).into_response()
    }
}

/// Turn a handler panic into a plain 500 page; the detail only goes to the log.
fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    tracing::error!(
        panic = %crate::net::pool::panic_message(payload.as_ref()),
        "Handler panicked"
    );
    error_page(StatusCode::INTERNAL_SERVER_ERROR)
}
