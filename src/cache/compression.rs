//! Response compression negotiation.
//!
//! Compression happens after cache retrieval or storage: the cache always
//! holds the identity body together with the headers describing it, and each
//! request decides independently whether to send a gzip rendition.

use std::io::Write;

use axum::body::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::config::CompressionConfig;

/// Result of attempting to compress a body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Encoded {
    Identity(Bytes),
    Gzip(Bytes),
}

impl Encoded {
    pub fn body(&self) -> &Bytes {
        match self {
            Encoded::Identity(body) | Encoded::Gzip(body) => body,
        }
    }

    pub fn content_encoding(&self) -> Option<&'static str> {
        match self {
            Encoded::Identity(_) => None,
            Encoded::Gzip(_) => Some("gzip"),
        }
    }
}

/// Whether a `Accept-Encoding` header value admits gzip.
pub fn accepts_gzip(accept_encoding: &str) -> bool {
    accept_encoding.split(',').any(|part| {
        let mut pieces = part.trim().split(';');
        let coding = pieces.next().unwrap_or("").trim();
        let refused = pieces.any(|param| {
            param
                .trim()
                .strip_prefix("q=")
                .and_then(|q| q.trim().parse::<f32>().ok())
                .is_some_and(|q| q == 0.0)
        });
        !refused && (coding.eq_ignore_ascii_case("gzip") || coding == "*")
    })
}

/// Textual types compress well; everything else is usually compressed already.
pub fn is_compressible(mime: &str) -> bool {
    let m = mime.to_ascii_lowercase();
    m.starts_with("text/")
        || m.contains("json")
        || m.contains("xml")
        || m.contains("javascript")
        || m.contains("svg")
}

/// Gzip `body` when the client accepts it and doing so actually saves bytes.
pub fn negotiate(config: &CompressionConfig, accept_encoding: Option<&str>, mime: &str, body: Bytes) -> Encoded {
    let wanted = config.enabled
        && body.len() >= config.min_size
        && accept_encoding.is_some_and(accepts_gzip)
        && is_compressible(mime);
    if !wanted {
        return Encoded::Identity(body);
    }

    match gzip(&body) {
        Ok(compressed) if compressed.len() < body.len() => Encoded::Gzip(Bytes::from(compressed)),
        Ok(_) => Encoded::Identity(body),
        Err(e) => {
            tracing::warn!(error = %e, "Gzip compression failed, sending identity body");
            Encoded::Identity(body)
        }
    }
}

fn gzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}
