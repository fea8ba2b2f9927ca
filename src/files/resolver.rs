//! Safe static file resolution.
//!
//! # Responsibilities
//! - Decode and normalize request paths into cache keys
//! - Map normalized paths onto the document root without escaping it
//! - Resolve directories to index files or listings
//! - Enforce the file size limit before reading any bytes
//!
//! # Design Decisions
//! - Traversal is rejected lexically first (`..` above the root is 403),
//!   then again after canonicalization so symlinks cannot leave the root
//! - Filesystem errors are mapped onto the error taxonomy, never surfaced

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use axum::body::Bytes;
use chrono::{DateTime, Utc};
use percent_encoding::percent_decode_str;
use tokio::fs;
use tokio::io::AsyncReadExt;

use crate::config::{FilesConfig, SecurityConfig};
use crate::error::ServeError;

/// MIME type sent when the extension is unknown.
pub const DEFAULT_MIME: &str = "application/octet-stream";

/// What a request path points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    File {
        path: PathBuf,
        len: u64,
        modified: Option<SystemTime>,
    },
    Directory {
        path: PathBuf,
    },
}

/// Resolves request paths against a fixed document root.
#[derive(Debug, Clone)]
pub struct FileResolver {
    root: PathBuf,
    index_files: Vec<String>,
    directory_listing: bool,
    max_file_size: u64,
}

impl FileResolver {
    /// Build a resolver, canonicalizing the root once.
    pub fn new(files: &FilesConfig, security: &SecurityConfig) -> std::io::Result<Self> {
        let root = std::fs::canonicalize(&files.root)?;
        if !root.is_dir() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("document root {} is not a directory", root.display()),
            ));
        }
        Ok(Self {
            root,
            index_files: files.index_files.clone(),
            directory_listing: files.directory_listing,
            max_file_size: security.max_file_size,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Locate the file or directory for a normalized path.
    pub async fn resolve(&self, normalized: &str) -> Result<Resolved, ServeError> {
        let mut candidate = self.root.clone();
        candidate.extend(normalized.split('/').filter(|s| !s.is_empty()));

        let target = self.confine(&candidate).await?;
        let meta = fs::metadata(&target).await?;

        if meta.is_dir() {
            for index in &self.index_files {
                let index_path = target.join(index);
                if let Ok(index_meta) = fs::metadata(&index_path).await {
                    if index_meta.is_file() {
                        let index_path = self.confine(&index_path).await?;
                        return self.file(index_path, &index_meta);
                    }
                }
            }
            if !self.directory_listing {
                return Err(ServeError::Forbidden);
            }
            return Ok(Resolved::Directory { path: target });
        }

        self.file(target, &meta)
    }

    fn file(&self, path: PathBuf, meta: &std::fs::Metadata) -> Result<Resolved, ServeError> {
        if meta.len() > self.max_file_size {
            return Err(ServeError::PayloadTooLarge {
                size: meta.len(),
                limit: self.max_file_size,
            });
        }
        Ok(Resolved::File {
            path,
            len: meta.len(),
            modified: meta.modified().ok(),
        })
    }

    /// Canonicalize and require the result to stay under the root.
    async fn confine(&self, candidate: &Path) -> Result<PathBuf, ServeError> {
        let canonical = fs::canonicalize(candidate).await?;
        if !canonical.starts_with(&self.root) {
            tracing::warn!(path = %candidate.display(), "Resolved path escapes document root");
            return Err(ServeError::Forbidden);
        }
        Ok(canonical)
    }

    /// Read a resolved file, never more than the size limit.
    pub async fn read(&self, path: &Path) -> Result<Bytes, ServeError> {
        let file = fs::File::open(path).await?;
        let mut contents = Vec::new();
        file.take(self.max_file_size.saturating_add(1)).read_to_end(&mut contents).await?;
        if contents.len() as u64 > self.max_file_size {
            return Err(ServeError::PayloadTooLarge {
                size: contents.len() as u64,
                limit: self.max_file_size,
            });
        }
        Ok(Bytes::from(contents))
    }
}

/// Decode a request path and collapse `.` and `..` segments.
///
/// The result always starts with `/` and is used both as the cache key and
/// for resolution. A `..` that would climb above the root is forbidden.
pub fn normalize_path(raw: &str) -> Result<String, ServeError> {
    let decoded = percent_decode_str(raw)
        .decode_utf8()
        .map_err(|_| ServeError::BadRequest("path is not valid UTF-8"))?;

    if decoded.contains('\0') {
        return Err(ServeError::BadRequest("path contains NUL"));
    }
    if decoded.contains('\\') {
        return Err(ServeError::Forbidden);
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(ServeError::Forbidden);
                }
            }
            s if s.contains(':') && cfg!(windows) => return Err(ServeError::Forbidden),
            s => segments.push(s),
        }
    }

    Ok(format!("/{}", segments.join("/")))
}

/// MIME type from the file extension.
pub fn mime_for(path: &Path) -> String {
    mime_guess::from_path(path)
        .first()
        .map(|m| m.essence_str().to_string())
        .unwrap_or_else(|| DEFAULT_MIME.to_string())
}

/// `Content-Type` value, adding a charset to textual types.
pub fn content_type_for(path: &Path) -> String {
    let mime = mime_for(path);
    if mime.starts_with("text/") {
        format!("{mime}; charset=utf-8")
    } else {
        mime
    }
}

/// IMF-fixdate as used by `Last-Modified`.
pub fn http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time)
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}
