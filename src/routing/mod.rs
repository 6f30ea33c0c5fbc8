//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, version, headers)
//!     → classifier.rs (one ordered decision: preflight / socket RPC / framed RPC / static)
//!     → matcher.rs (header predicates the classifier relies on)
//!     → dispatcher.rs (origin check, then exactly one collaborator)
//! ```
//!
//! # Design Decisions
//! - Classification is a pure function of the request head
//! - Deterministic: same input always yields the same classification
//! - First match wins; every request gets a classification

pub mod classifier;
pub mod dispatcher;
pub mod matcher;

pub use classifier::{classify, Classification};
pub use dispatcher::Dispatcher;
pub use matcher::{is_socket_upgrade, RpcCodec, RpcMediaType, RpcProtocol};
