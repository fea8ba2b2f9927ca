//! Method admission.
//! Requests whose method is not configured are answered with 405.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Method, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::ServeError;

/// The set of methods the server admits.
#[derive(Debug, Clone)]
pub struct AllowedMethods {
    methods: Vec<Method>,
    allow_header: String,
}

impl AllowedMethods {
    /// Build from configured tokens. Tokens that are not valid methods are
    /// skipped; validation reports them before the server starts.
    pub fn new<S: AsRef<str>>(tokens: &[S]) -> Self {
        let methods: Vec<Method> = tokens
            .iter()
            .filter_map(|t| Method::from_bytes(t.as_ref().as_bytes()).ok())
            .collect();
        let allow_header = methods
            .iter()
            .map(Method::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        Self {
            methods,
            allow_header,
        }
    }

    pub fn contains(&self, method: &Method) -> bool {
        self.methods.contains(method)
    }

    /// Comma separated list for `Allow` and CORS headers.
    pub fn header_value(&self) -> &str {
        &self.allow_header
    }
}

pub async fn method_guard_middleware(
    State(allowed): State<Arc<AllowedMethods>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if allowed.contains(request.method()) {
        return next.run(request).await;
    }

    let mut response = ServeError::MethodNotAllowed(request.method().to_string()).into_response();
    if let Ok(value) = HeaderValue::from_str(allowed.header_value()) {
        response.headers_mut().insert(header::ALLOW, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tokens() {
        let allowed = AllowedMethods::new(&["GET", "HEAD", "POST"]);
        assert!(allowed.contains(&Method::GET));
        assert!(allowed.contains(&Method::POST));
        assert!(!allowed.contains(&Method::DELETE));
        assert_eq!(allowed.header_value(), "GET, HEAD, POST");
    }

    #[test]
    fn skips_invalid_tokens() {
        let allowed = AllowedMethods::new(&["GET", "NOT A METHOD"]);
        assert_eq!(allowed.header_value(), "GET");
    }
}
