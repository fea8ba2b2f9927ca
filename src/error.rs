//! Request failure taxonomy.
//!
//! Every failure a request can meet maps to exactly one status code and a
//! generic HTML page. Internal detail is logged and never rendered.

use std::io;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::http::response::error_page;

#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error("malformed request: {0}")]
    BadRequest(&'static str),

    #[error("access outside the document root or to a forbidden resource")]
    Forbidden,

    #[error("resource not found")]
    NotFound,

    #[error("method {0} not allowed")]
    MethodNotAllowed(String),

    #[error("file of {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { size: u64, limit: u64 },

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("dispatch queue is full")]
    CapacityExceeded,

    #[error("request timed out")]
    Timeout,

    #[error("internal fault: {0}")]
    Internal(String),
}

impl ServeError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServeError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServeError::Forbidden => StatusCode::FORBIDDEN,
            ServeError::NotFound => StatusCode::NOT_FOUND,
            ServeError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ServeError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ServeError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ServeError::CapacityExceeded => StatusCode::SERVICE_UNAVAILABLE,
            ServeError::Timeout => StatusCode::REQUEST_TIMEOUT,
            ServeError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<io::Error> for ServeError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => ServeError::NotFound,
            io::ErrorKind::PermissionDenied => ServeError::Forbidden,
            _ => ServeError::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for ServeError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ServeError::Internal(detail) => tracing::error!(error = %detail, "Internal fault"),
            ServeError::RateLimited | ServeError::CapacityExceeded => {}
            other => tracing::debug!(status = status.as_u16(), error = %other, "Client error"),
        }
        error_page(status)
    }
}
