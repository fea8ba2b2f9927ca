//! Response header policy.
//!
//! # Responsibilities
//! - Identify the server on every response
//! - Attach CORS headers to every response when enabled
//!
//! # Design Decisions
//! - Implemented as tower-http header layers so error pages produced by
//!   any middleware carry the same headers as file responses

use axum::http::{header, HeaderName, HeaderValue};
use axum::Router;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::config::SecurityConfig;
use crate::http::response::SERVER_NAME;
use crate::security::access_control::AllowedMethods;

const CORS_ALLOW_HEADERS: &str = "Content-Type, Authorization";

/// Header name/value pairs added by the CORS policy.
pub fn cors_headers(config: &SecurityConfig, allowed: &AllowedMethods) -> Vec<(HeaderName, HeaderValue)> {
    if !config.cors_enabled {
        return Vec::new();
    }

    let mut headers = Vec::with_capacity(3);
    if let Ok(origin) = HeaderValue::from_str(&config.cors_origins.join(" ")) {
        headers.push((header::ACCESS_CONTROL_ALLOW_ORIGIN, origin));
    }
    if let Ok(methods) = HeaderValue::from_str(allowed.header_value()) {
        headers.push((header::ACCESS_CONTROL_ALLOW_METHODS, methods));
    }
    headers.push((
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(CORS_ALLOW_HEADERS),
    ));
    headers
}

/// Wrap `router` with the server identification and CORS header layers.
pub fn apply(mut router: Router, config: &SecurityConfig, allowed: &AllowedMethods) -> Router {
    for (name, value) in cors_headers(config, allowed) {
        router = router.layer(SetResponseHeaderLayer::overriding(name, value));
    }
    router.layer(SetResponseHeaderLayer::if_not_present(
        header::SERVER,
        HeaderValue::from_static(SERVER_NAME),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cors_disabled_adds_nothing() {
        let config = SecurityConfig {
            cors_enabled: false,
            ..SecurityConfig::default()
        };
        let allowed = AllowedMethods::new(&config.allowed_methods);
        assert!(cors_headers(&config, &allowed).is_empty());
    }

    #[test]
    fn cors_enabled_lists_methods() {
        let config = SecurityConfig::default();
        let allowed = AllowedMethods::new(&config.allowed_methods);
        let headers = cors_headers(&config, &allowed);

        assert_eq!(headers.len(), 3);
        assert_eq!(headers[0].1, "*");
        assert_eq!(headers[1].1, "GET, HEAD, POST");
    }
}
