//! Response construction.
//!
//! # Responsibilities
//! - Render the HTML error page shared by every failure path
//! - Build the raw 503 written by the listener before HTTP is spoken
//! - Serialize JSON bodies for the built-in endpoints
//!
//! # Design Decisions
//! - Error pages carry only the status line text, never internal detail
//! - The listener's rejection is pre-rendered bytes so it can be written
//!   without handing the socket to a worker

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use serde::Serialize;

/// Server identification sent on every response.
pub const SERVER_NAME: &str = concat!("file-server/", env!("CARGO_PKG_VERSION"));

/// HTML body for an error status.
pub fn error_html(status: StatusCode) -> String {
    let code = status.as_u16();
    let reason = status.canonical_reason().unwrap_or("Error");
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<title>{code} {reason}</title>\n\
         <style>\nbody {{ font-family: Arial, sans-serif; text-align: center; margin-top: 50px; }}\n\
         h1 {{ color: #e74c3c; }}\n</style>\n</head>\n<body>\n<h1>{code} {reason}</h1>\n\
         <p>The requested resource could not be found or accessed.</p>\n</body>\n</html>\n"
    )
}

/// Full error response for a status.
pub fn error_page(status: StatusCode) -> Response {
    let body = error_html(status);
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    response
}

/// Raw HTTP/1.1 response rejecting a connection the queue had no room for.
pub fn capacity_exceeded_bytes() -> Vec<u8> {
    let status = StatusCode::SERVICE_UNAVAILABLE;
    let body = error_html(status);
    let mut raw = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\n\
         Retry-After: 1\r\nServer: {}\r\nConnection: close\r\n\r\n",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Service Unavailable"),
        body.len(),
        SERVER_NAME,
    )
    .into_bytes();
    raw.extend_from_slice(body.as_bytes());
    raw
}

/// Serialize `value` as a 200 JSON response.
pub fn json<T: Serialize>(value: &T) -> Response {
    match serde_json::to_vec_pretty(value) {
        Ok(body) => {
            let mut response = Response::new(Body::from(body));
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
            response
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize JSON body");
            error_page(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_html_names_status() {
        let page = error_html(StatusCode::NOT_FOUND);
        assert!(page.contains("<!DOCTYPE html>"));
        assert!(page.contains("<html>"));
        assert!(page.contains("404 Not Found"));
    }

    #[test]
    fn capacity_bytes_are_a_complete_response() {
        let raw = String::from_utf8(capacity_exceeded_bytes()).unwrap();
        assert!(raw.starts_with("HTTP/1.1 503 Service Unavailable\r\n"));
        let (head, body) = raw.split_once("\r\n\r\n").unwrap();
        assert!(head.contains(&format!("Content-Length: {}", body.len())));
        assert!(head.contains("Connection: close"));
    }
}
