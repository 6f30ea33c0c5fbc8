//! Traffic classification.
//!
//! Every request is sorted into exactly one [`Classification`] from its
//! method, protocol version and headers. Rules are checked in priority
//! order and the first match wins:
//!
//! 1. `OPTIONS` is a preflight, whatever else the request carries.
//! 2. A websocket upgrade is a socket-tunneled RPC, even with an RPC content type.
//! 3. An RPC content type on HTTP/2 is a framed RPC (native gRPC).
//! 4. An RPC content type on any other version is a framed RPC (gRPC-Web fallback).
//! 5. Everything else is a static asset.

use std::fmt;

use axum::http::{Method, Version};

use crate::http::request::RequestDescriptor;
use crate::routing::matcher::{is_socket_upgrade, RpcMediaType};

/// The kind of traffic a request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    PreflightRequest,
    SocketUpgradeRpc,
    FramedRpc,
    StaticAsset,
}

impl Classification {
    /// Stable label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::PreflightRequest => "preflight",
            Classification::SocketUpgradeRpc => "socket_rpc",
            Classification::FramedRpc => "framed_rpc",
            Classification::StaticAsset => "static",
        }
    }

    /// Whether the request belongs to the RPC engine.
    pub fn is_rpc(&self) -> bool {
        matches!(
            self,
            Classification::SocketUpgradeRpc | Classification::FramedRpc
        )
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a request. Total and side-effect free.
pub fn classify(descriptor: &RequestDescriptor<'_>) -> Classification {
    if *descriptor.method == Method::OPTIONS {
        return Classification::PreflightRequest;
    }

    if is_socket_upgrade(descriptor.headers) {
        return Classification::SocketUpgradeRpc;
    }

    let media = RpcMediaType::from_headers(descriptor.headers);
    if descriptor.version == Version::HTTP_2 && media.is_some() {
        return Classification::FramedRpc;
    }
    if media.is_some() {
        return Classification::FramedRpc;
    }

    Classification::StaticAsset
}
