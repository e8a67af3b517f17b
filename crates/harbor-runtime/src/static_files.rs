//! Static file handler for the document root

use bytes::Bytes;
use harbor_core::Body;
use http::{header, Method, Response, StatusCode};
use http_body_util::Full;
use std::path::{Component, Path, PathBuf};

const INDEX_FILE: &str = "index.html";

/// Serves files below the document root before the application runs
#[derive(Debug, Clone)]
pub struct StaticFiles {
    root: PathBuf,
}

impl StaticFiles {
    /// Serve files from `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Document root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a URL path onto the document root
    ///
    /// Returns `None` for paths that try to leave the root.
    pub fn resolve(&self, url_path: &str) -> Option<PathBuf> {
        let relative = Path::new(url_path.trim_start_matches('/'));
        let mut resolved = self.root.clone();
        for component in relative.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
            }
        }
        Some(resolved)
    }

    /// Serve `path` if a matching file exists
    ///
    /// `None` means the request falls through to the application.
    pub async fn serve(&self, method: &Method, url_path: &str) -> Option<Response<Body>> {
        if method != Method::GET && method != Method::HEAD {
            return None;
        }

        let mut path = self.resolve(url_path)?;
        let metadata = tokio::fs::metadata(&path).await.ok()?;
        if metadata.is_dir() {
            path.push(INDEX_FILE);
            if !tokio::fs::metadata(&path).await.ok()?.is_file() {
                return None;
            }
        } else if !metadata.is_file() {
            return None;
        }

        let contents = match tokio::fs::read(&path).await {
            Ok(contents) => contents,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read static file");
                return None;
            }
        };

        let length = contents.len();
        let body = if method == Method::HEAD {
            Bytes::new()
        } else {
            Bytes::from(contents)
        };

        tracing::trace!(path = %path.display(), bytes = length, "Serving static file");

        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, content_type(&path))
            .header(header::CONTENT_LENGTH, length)
            .body(Full::new(body))
            .ok()
    }
}

/// Content type by file extension
pub fn content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match ext.as_deref() {
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js" | "mjs") => "application/javascript; charset=utf-8",
        Some("json") => "application/json",
        Some("txt") => "text/plain; charset=utf-8",
        Some("xml") => "application/xml",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("ico") => "image/x-icon",
        Some("webp") => "image/webp",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("pdf") => "application/pdf",
        Some("wasm") => "application/wasm",
        _ => "application/octet-stream",
    }
}
