//! Websocket upgrade for socket-tunneled RPC.
//!
//! # Responsibilities
//! - Validate the upgrade request and complete the handshake with the client
//! - Negotiate the `grpc-websockets` sub-protocol used by browser clients
//! - Hand the upgraded socket to the RPC handler
//!
//! # Data Flow
//! ```text
//! Client ←──── websocket frames ────→ Gateway ──→ RpcHandler::stream
//! ```
//!
//! # Design Decisions
//! - The handshake response is the only HTTP response; everything after it
//!   belongs to the handler
//! - A failed upgrade is logged and dropped, the connection is already gone

use std::future::Future;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};

/// Sub-protocol spoken by browser websocket RPC transports.
pub const GRPC_WEBSOCKETS_PROTOCOL: &str = "grpc-websockets";

/// Complete the websocket handshake and run `on_socket` on the upgraded connection.
pub async fn accept_rpc_socket<F, Fut>(parts: &mut Parts, on_socket: F) -> Response
where
    F: FnOnce(WebSocket) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let upgrade = match WebSocketUpgrade::from_request_parts(parts, &()).await {
        Ok(upgrade) => upgrade,
        Err(rejection) => {
            tracing::debug!(
                path = %parts.uri.path(),
                reason = %rejection,
                "Websocket handshake rejected"
            );
            return rejection.into_response();
        }
    };

    let path = parts.uri.path().to_string();
    upgrade
        .protocols([GRPC_WEBSOCKETS_PROTOCOL])
        .on_failed_upgrade(move |error| {
            tracing::warn!(path = %path, error = %error, "Websocket upgrade failed");
        })
        .on_upgrade(on_socket)
}
