//! Header predicates used by the classifier.
//!
//! # Responsibilities
//! - Detect a websocket upgrade (`Connection: Upgrade` + `Upgrade: websocket`)
//! - Recognise the RPC media types (`application/grpc`, `application/grpc-web`,
//!   `application/grpc-web-text`, each optionally `+proto` / `+json`)
//!
//! # Design Decisions
//! - Header tokens compare case-insensitively (RFC 9110)
//! - Media type parameters (`; charset=...`) are ignored
//! - Unknown codec suffixes are not RPC; they fall through to static serving
//! - No allocation on the hot path

use axum::http::{header, HeaderMap, HeaderName};

/// True when any value of `name` lists `token` in its comma separated list.
fn header_has_token(headers: &HeaderMap, name: &HeaderName, token: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|t| t.trim().eq_ignore_ascii_case(token))
}

/// Matches the HTTP/1.1 websocket upgrade header sequence.
pub fn is_socket_upgrade(headers: &HeaderMap) -> bool {
    header_has_token(headers, &header::CONNECTION, "upgrade")
        && header_has_token(headers, &header::UPGRADE, "websocket")
}

/// RPC transport family named by the content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcProtocol {
    /// Native gRPC (`application/grpc`).
    Grpc,
    /// Binary gRPC-Web (`application/grpc-web`).
    GrpcWeb,
    /// Base64 gRPC-Web (`application/grpc-web-text`).
    GrpcWebText,
}

/// Message codec named by the `+suffix`, proto when absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RpcCodec {
    #[default]
    Proto,
    Json,
}

/// A recognised RPC content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RpcMediaType {
    pub protocol: RpcProtocol,
    pub codec: RpcCodec,
}

impl Default for RpcMediaType {
    fn default() -> Self {
        Self {
            protocol: RpcProtocol::GrpcWeb,
            codec: RpcCodec::Proto,
        }
    }
}

impl RpcMediaType {
    /// Parse a `Content-Type` value.
    pub fn parse(content_type: &str) -> Option<Self> {
        let essence = content_type.split(';').next().unwrap_or_default().trim();
        let (base, suffix) = match essence.split_once('+') {
            Some((base, suffix)) => (base, Some(suffix)),
            None => (essence, None),
        };

        let protocol = if base.eq_ignore_ascii_case("application/grpc") {
            RpcProtocol::Grpc
        } else if base.eq_ignore_ascii_case("application/grpc-web") {
            RpcProtocol::GrpcWeb
        } else if base.eq_ignore_ascii_case("application/grpc-web-text") {
            RpcProtocol::GrpcWebText
        } else {
            return None;
        };

        let codec = match suffix {
            None => RpcCodec::Proto,
            Some(s) if s.eq_ignore_ascii_case("proto") => RpcCodec::Proto,
            Some(s) if s.eq_ignore_ascii_case("json") => RpcCodec::Json,
            Some(_) => return None,
        };

        Some(Self { protocol, codec })
    }

    /// The media type declared by the request's `Content-Type`, if it is an RPC one.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(Self::parse)
    }

    /// Canonical content type to answer with.
    pub fn content_type(&self) -> &'static str {
        match (self.protocol, self.codec) {
            (RpcProtocol::Grpc, RpcCodec::Proto) => "application/grpc+proto",
            (RpcProtocol::Grpc, RpcCodec::Json) => "application/grpc+json",
            (RpcProtocol::GrpcWeb, RpcCodec::Proto) => "application/grpc-web+proto",
            (RpcProtocol::GrpcWeb, RpcCodec::Json) => "application/grpc-web+json",
            (RpcProtocol::GrpcWebText, RpcCodec::Proto) => "application/grpc-web-text+proto",
            (RpcProtocol::GrpcWebText, RpcCodec::Json) => "application/grpc-web-text+json",
        }
    }
}
