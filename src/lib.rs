//! Single-port front door for browser-facing RPC services.
//!
//! One listener serves three kinds of traffic: gRPC / gRPC-Web calls,
//! RPC tunneled over a websocket, and the static client bundle.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌──────────────────────────────────────────────────┐
//!     Client Request      │  ┌──────────┐   ┌─────────┐   ┌──────────────┐   │
//!     ────────────────────┼─▶│   net    │──▶│  http   │──▶│   routing    │   │
//!                         │  │ listener │   │ server  │   │  classifier  │   │
//!                         │  │  + tls   │   │         │   └──────┬───────┘   │
//!                         │  └──────────┘   └─────────┘          ▼           │
//!                         │                               ┌──────────────┐   │
//!                         │                               │  dispatcher  │   │
//!                         │                               └──┬────┬────┬─┘   │
//!                         │                     preflight ◀────┘    │    └──▶ assets
//!                         │                  (security::origin)     ▼        │
//!                         │                                   rpc engine     │
//!                         │                              (framed / socket)   │
//!                         │                                                  │
//!                         │  Cross-cutting: config, observability, lifecycle │
//!                         └──────────────────────────────────────────────────┘
//! ```
//!
//! Every request is classified exactly once and handed to exactly one
//! collaborator; the origin decision is merged into whatever comes back.

// Core subsystems
pub mod config;
pub mod http;
pub mod net;
pub mod routing;
pub mod rpc;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::GatewayConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use routing::{Classification, Dispatcher};
pub use rpc::{RpcEngine, RpcHandler, ServiceRegistry};
