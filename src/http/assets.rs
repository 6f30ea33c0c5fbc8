//! Static client bundle.
//!
//! # Responsibilities
//! - Resolve directory-style paths (`/app/`) to the default document
//! - Serve files from the bundle directory, preferring `.gz` siblings when
//!   the client accepts gzip
//! - Answer `404 Not Found` for anything missing
//!
//! # Design Decisions
//! - Path traversal protection is left to `ServeDir`, which refuses `..`
//! - The query string survives the index rewrite

use std::borrow::Cow;

use axum::body::Body;
use axum::http::{Request, Uri};
use axum::response::Response;
use futures_util::future::BoxFuture;
use tower::ServiceExt;
use tower_http::services::ServeDir;

use crate::config::AssetsConfig;

/// Serves every request that is not RPC.
pub trait StaticResponder: Send + Sync + 'static {
    fn respond(&self, request: Request<Body>) -> BoxFuture<'static, Response>;
}

/// Append the default document to paths ending in `/`.
pub fn resolve_asset_path<'a>(path: &'a str, index_file: &str) -> Cow<'a, str> {
    if path.ends_with('/') {
        Cow::Owned(format!("{path}{index_file}"))
    } else {
        Cow::Borrowed(path)
    }
}

fn with_path(uri: &Uri, path: &str) -> Option<Uri> {
    let path_and_query = match uri.query() {
        Some(query) => format!("{path}?{query}"),
        None => path.to_string(),
    };
    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(path_and_query.parse().ok()?);
    Uri::from_parts(parts).ok()
}

/// [`StaticResponder`] backed by a directory on disk.
#[derive(Debug, Clone)]
pub struct AssetResponder {
    serve_dir: ServeDir,
    index_file: String,
}

impl AssetResponder {
    pub fn new(config: &AssetsConfig) -> Self {
        let mut serve_dir = ServeDir::new(&config.root);
        if config.precompressed_gzip {
            serve_dir = serve_dir.precompressed_gzip();
        }
        Self {
            serve_dir,
            index_file: config.index_file.clone(),
        }
    }
}

impl StaticResponder for AssetResponder {
    fn respond(&self, mut request: Request<Body>) -> BoxFuture<'static, Response> {
        let resolved = resolve_asset_path(request.uri().path(), &self.index_file).into_owned();
        if resolved != request.uri().path() {
            if let Some(uri) = with_path(request.uri(), &resolved) {
                *request.uri_mut() = uri;
            }
        }
        tracing::trace!(path = %resolved, "Serving static asset");

        let serve_dir = self.serve_dir.clone();
        Box::pin(async move {
            match serve_dir.oneshot(request).await {
                Ok(response) => response.map(Body::new),
                Err(never) => match never {},
            }
        })
    }
}
