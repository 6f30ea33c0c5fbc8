//! Request inspection.
//!
//! # Responsibilities
//! - Borrowed, read-only view of the request head used for classification
//! - Generate a unique request ID (UUID v4) when the client sent none
//!
//! # Design Decisions
//! - The descriptor never owns the body; the body stays with the request and
//!   is handed untouched to whichever collaborator the dispatcher picks
//! - Request ID added as early as possible for tracing

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, Request, Version};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

/// Header carrying the per-request correlation ID.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Immutable view of the parts of a request that drive routing decisions.
#[derive(Debug, Clone, Copy)]
pub struct RequestDescriptor<'a> {
    pub method: &'a Method,
    pub path: &'a str,
    pub version: Version,
    pub headers: &'a HeaderMap,
}

impl<'a> RequestDescriptor<'a> {
    /// Describe a request without consuming it.
    pub fn from_request<B>(request: &'a Request<B>) -> Self {
        Self {
            method: request.method(),
            path: request.uri().path(),
            version: request.version(),
            headers: request.headers(),
        }
    }

    /// The declared `Origin`, if present and readable.
    pub fn origin(&self) -> Option<&'a str> {
        self.headers
            .get(header::ORIGIN)
            .and_then(|v| v.to_str().ok())
    }

    /// The request ID assigned by the request-id layer.
    pub fn request_id(&self) -> &'a str {
        self.headers
            .get(&X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
    }
}

/// Produces UUID v4 request IDs for `SetRequestIdLayer`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}
