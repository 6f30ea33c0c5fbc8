//! RPC engine entry points.
//!
//! # Responsibilities
//! - `serve_framed`: hand a gRPC / gRPC-Web request to the registered handler
//! - `serve_upgrade`: complete the websocket handshake and hand the socket
//!   to the registered handler
//! - Answer unknown services and methods with `UNIMPLEMENTED`
//!
//! # Design Decisions
//! - Message framing belongs to the handler, the engine only routes
//! - Unknown targets are refused before any websocket handshake
//! - Handler failures surface as an HTTP error status on that response only

use std::sync::Arc;

use axum::body::Body;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::http::{HeaderMap, Request};
use axum::response::Response;
use futures_util::future::BoxFuture;

use crate::http::websocket::accept_rpc_socket;
use crate::routing::matcher::RpcMediaType;
use crate::rpc::registry::{MethodTarget, ServiceRegistry};
use crate::rpc::status::RpcStatus;

/// Websocket close code for an internal failure (RFC 6455 §7.4.1).
const CLOSE_INTERNAL_ERROR: u16 = 1011;

/// Per-call metadata passed to a handler.
#[derive(Debug, Clone)]
pub struct RpcCall {
    pub service: String,
    pub method: String,
    /// Content type of a framed call. Socket calls negotiate it in-band.
    pub media: Option<RpcMediaType>,
    pub headers: HeaderMap,
}

/// Implementation of one registered service.
pub trait RpcHandler: Send + Sync + 'static {
    /// Serve a framed call. The handler owns decoding the body and
    /// encoding the response.
    fn call(&self, call: RpcCall, body: Body) -> BoxFuture<'static, Result<Response, RpcStatus>>;

    /// Serve a call tunneled over an upgraded websocket.
    fn stream(&self, call: RpcCall, mut socket: WebSocket) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            tracing::debug!(
                service = %call.service,
                method = %call.method,
                "Handler has no socket transport, closing"
            );
            let frame = CloseFrame {
                code: CLOSE_INTERNAL_ERROR,
                reason: "socket transport not supported".into(),
            };
            if let Err(error) = socket.send(Message::Close(Some(frame))).await {
                tracing::debug!(error = %error, "Failed to send close frame");
            }
        })
    }
}

/// The two entry points the dispatcher hands RPC traffic to.
pub trait RpcEngine: Send + Sync + 'static {
    fn serve_framed(&self, request: Request<Body>) -> BoxFuture<'static, Response>;
    fn serve_upgrade(&self, request: Request<Body>) -> BoxFuture<'static, Response>;
}

/// Engine routing calls through a frozen [`ServiceRegistry`].
#[derive(Debug, Clone)]
pub struct RegistryEngine {
    registry: Arc<ServiceRegistry>,
}

impl RegistryEngine {
    pub fn new(registry: ServiceRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    fn target(&self, path: &str) -> Result<MethodTarget, RpcStatus> {
        self.registry.resolve(path).map_err(|unresolved| {
            tracing::debug!(path = %path, reason = %unresolved, "RPC target not found");
            RpcStatus::unimplemented(unresolved.to_string())
        })
    }
}

impl RpcEngine for RegistryEngine {
    fn serve_framed(&self, request: Request<Body>) -> BoxFuture<'static, Response> {
        let media = RpcMediaType::from_headers(request.headers()).unwrap_or_default();
        let target = self.target(request.uri().path());

        Box::pin(async move {
            let target = match target {
                Ok(target) => target,
                Err(status) => return status.to_response(media),
            };

            let (parts, body) = request.into_parts();
            let call = RpcCall {
                service: target.service,
                method: target.method,
                media: Some(media),
                headers: parts.headers,
            };
            let service = call.service.clone();
            let method = call.method.clone();

            match target.handler.call(call, body).await {
                Ok(response) => response,
                Err(status) => {
                    tracing::warn!(
                        service = %service,
                        method = %method,
                        code = ?status.code(),
                        message = %status.message(),
                        "RPC handler failed"
                    );
                    status.to_http_response(media, status.code().http_status())
                }
            }
        })
    }

    fn serve_upgrade(&self, request: Request<Body>) -> BoxFuture<'static, Response> {
        let target = self.target(request.uri().path());

        Box::pin(async move {
            let target = match target {
                Ok(target) => target,
                Err(status) => return status.to_response(RpcMediaType::default()),
            };

            let (mut parts, _body) = request.into_parts();
            let call = RpcCall {
                service: target.service,
                method: target.method,
                media: None,
                headers: parts.headers.clone(),
            };
            let handler = target.handler;

            accept_rpc_socket(&mut parts, move |socket| handler.stream(call, socket)).await
        })
    }
}
