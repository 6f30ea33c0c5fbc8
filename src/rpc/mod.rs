//! RPC engine seam.
//!
//! # Data Flow
//! ```text
//! Dispatcher
//!     → engine.rs (serve_framed / serve_upgrade)
//!     → registry.rs (resolve /package.Service/Method)
//!     → RpcHandler (application code: decode, invoke, encode)
//! ```
//!
//! # Design Decisions
//! - The service table is frozen before the listener accepts connections
//! - Framing and codecs live in handlers; this layer only routes

pub mod engine;
pub mod registry;
pub mod status;

pub use engine::{RegistryEngine, RpcCall, RpcEngine, RpcHandler};
pub use registry::{
    MethodTarget, RegistryError, ServiceDescriptor, ServiceRegistry, ServiceRegistryBuilder,
    Unresolved,
};
pub use status::{Code, RpcStatus};
