//! Request inspection helpers.
//!
//! # Responsibilities
//! - Derive the client key used for rate limiting
//! - Name the request id header set by the id layers
//!
//! # Design Decisions
//! - The peer address is attached per connection by the worker; requests
//!   without one (in-process tests) share the unspecified address

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::extract::ConnectInfo;
use axum::http::{HeaderName, Request};

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Source IP of the connection carrying `request`.
pub fn client_key<B>(request: &Request<B>) -> IpAddr {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}
