//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → origin.rs (is the caller's Origin acceptable?)
//!     → dispatch
//!     → origin.rs (merge Access-Control-* headers into the response)
//! ```
//!
//! # Design Decisions
//! - Policy is configuration, built once at startup and never mutated
//! - Fail closed: unacceptable origins never reach a collaborator

pub mod origin;

pub use origin::{
    policy_from_config, AllowListPolicy, OriginDecision, OriginPolicy, PermissivePolicy,
    PolicyError,
};
