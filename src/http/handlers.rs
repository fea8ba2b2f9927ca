//! Request handlers: the two JSON endpoints and static files.

use std::sync::Arc;
use std::time::SystemTime;

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::Response,
};
use serde::Serialize;

use crate::cache::{negotiate, CacheStats, ResponseCache};
use crate::config::ServerConfig;
use crate::error::ServeError;
use crate::files::{listing, normalize_path, resolver, FileResolver, Resolved};
use crate::http::response;
use crate::observability::metrics::{self, MetricsRegistry, MetricsSnapshot};
use crate::security::RateLimiter;

/// Shared state injected into every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub metrics: Arc<MetricsRegistry>,
    pub cache: Option<Arc<ResponseCache>>,
    pub limiter: Option<Arc<RateLimiter>>,
    pub resolver: Arc<FileResolver>,
}

impl AppState {
    pub fn new(config: Arc<ServerConfig>) -> std::io::Result<Self> {
        let resolver = FileResolver::new(&config.files, &config.security)?;
        let cache = config
            .cache
            .enabled
            .then(|| Arc::new(ResponseCache::from_config(&config.cache)));
        let limiter = config
            .security
            .rate_limit_enabled
            .then(|| Arc::new(RateLimiter::from_config(&config.security)));

        Ok(Self {
            metrics: Arc::new(MetricsRegistry::new()),
            cache,
            limiter,
            resolver: Arc::new(resolver),
            config,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub timestamp: String,
    pub uptime: f64,
}

#[derive(Debug, Serialize)]
pub struct RateLimiterReport {
    pub tracked_clients: usize,
}

/// `/metrics` body: the aggregator snapshot plus subsystem counters.
#[derive(Debug, Serialize)]
pub struct MetricsReport {
    #[serde(flatten)]
    pub snapshot: MetricsSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limiter: Option<RateLimiterReport>,
}

pub async fn health(State(state): State<AppState>) -> Response {
    response::json(&HealthStatus {
        status: "healthy",
        timestamp: chrono::Utc::now().to_rfc3339(),
        uptime: state.metrics.uptime().as_secs_f64(),
    })
}

pub async fn metrics_report(State(state): State<AppState>) -> Response {
    response::json(&MetricsReport {
        snapshot: state.metrics.snapshot(),
        cache: state.cache.as_ref().map(|c| c.stats()),
        rate_limiter: state.limiter.as_ref().map(|l| RateLimiterReport {
            tracked_clients: l.tracked_clients(),
        }),
    })
}

/// Where a file response's body came from, reported in `X-Cache`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CacheStatus {
    Hit,
    Miss,
    Bypass,
    Disabled,
}

impl CacheStatus {
    fn header(self) -> Option<&'static str> {
        match self {
            CacheStatus::Hit => Some("HIT"),
            CacheStatus::Miss => Some("MISS"),
            CacheStatus::Bypass => Some("BYPASS"),
            CacheStatus::Disabled => None,
        }
    }
}

/// Serve anything that is not a built-in endpoint from the document root.
pub async fn serve_static(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Result<Response, ServeError> {
    let normalized = normalize_path(uri.path())?;
    let head_only = method == Method::HEAD;
    let accept_encoding = headers
        .get(header::ACCEPT_ENCODING)
        .and_then(|v| v.to_str().ok());

    if let Some(cache) = &state.cache {
        let cached = cache.get(&normalized);
        metrics::record_cache_lookup(cached.is_some());
        if let Some(entry) = cached {
            tracing::trace!(path = %normalized, "Cache hit");
            let content_type = entry
                .header(header::CONTENT_TYPE.as_str())
                .unwrap_or(resolver::DEFAULT_MIME);
            return file_response(
                &state.config,
                entry.body.clone(),
                &entry.headers,
                content_type,
                accept_encoding,
                head_only,
                CacheStatus::Hit,
            );
        }
    }

    match state.resolver.resolve(&normalized).await? {
        Resolved::Directory { path } => {
            let entries = listing::read_entries(&path).await?;
            let html = listing::render(&normalized, &entries);
            let len = html.len();
            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
                .header(header::CONTENT_LENGTH, len)
                .body(if head_only { Body::empty() } else { Body::from(html) })
                .map_err(|e| ServeError::Internal(e.to_string()))
        }
        Resolved::File { path, modified, .. } => {
            let body = state.resolver.read(&path).await?;
            let content_type = resolver::content_type_for(&path);
            let representation = representation_headers(&content_type, modified, &state.config);

            let status = match &state.cache {
                Some(cache) if cache.put(normalized.clone(), body.clone(), representation.clone()) => {
                    CacheStatus::Miss
                }
                Some(_) => CacheStatus::Bypass,
                None => CacheStatus::Disabled,
            };

            file_response(
                &state.config,
                body,
                &representation,
                &content_type,
                accept_encoding,
                head_only,
                status,
            )
        }
    }
}

/// Headers describing the identity body; stored alongside it in the cache.
fn representation_headers(
    content_type: &str,
    modified: Option<SystemTime>,
    config: &ServerConfig,
) -> Vec<(String, String)> {
    let mut headers = vec![
        (header::CONTENT_TYPE.to_string(), content_type.to_string()),
        (
            header::CACHE_CONTROL.to_string(),
            format!("public, max-age={}", config.cache.ttl_secs),
        ),
    ];
    if let Some(modified) = modified {
        headers.push((header::LAST_MODIFIED.to_string(), resolver::http_date(modified)));
    }
    headers
}

fn file_response(
    config: &ServerConfig,
    body: Bytes,
    representation: &[(String, String)],
    content_type: &str,
    accept_encoding: Option<&str>,
    head_only: bool,
    cache_status: CacheStatus,
) -> Result<Response, ServeError> {
    let encoded = negotiate(&config.compression, accept_encoding, content_type, body);

    let mut builder = Response::builder().status(StatusCode::OK);
    for (name, value) in representation {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder = builder.header(header::CONTENT_LENGTH, encoded.body().len());
    if let Some(encoding) = encoded.content_encoding() {
        builder = builder
            .header(header::CONTENT_ENCODING, encoding)
            .header(header::VARY, "Accept-Encoding");
    }
    if let Some(status) = cache_status.header() {
        builder = builder.header("x-cache", status);
    }

    let body = if head_only {
        Body::empty()
    } else {
        Body::from(encoded.body().clone())
    };
    builder.body(body).map_err(|e| ServeError::Internal(e.to_string()))
}
