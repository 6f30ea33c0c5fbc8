//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (bind, connection limit, idle timeout)
//!     → tls.rs (optional TLS handshake, ALPN h2/http1.1)
//!     → connection.rs (lifetime tracking, active-connection gauge,
//!       requests in flight)
//!     → Hand off to HTTP layer
//! ```
//!
//! # Design Decisions
//! - A full listener makes new connections wait rather than refusing them
//! - TLS is optional and handled transparently
//! - The idle timeout only counts time with no request in flight; upgraded
//!   sockets are exempt and live as long as their handler

pub mod connection;
pub mod listener;
pub mod tls;

pub use connection::{
    ConnectionGuard, ConnectionId, ConnectionService, ConnectionTracker, IdleTimeoutStream,
    InFlight, InFlightGuard,
};
pub use listener::{bind, ConnectionAcceptor, ListenerError};
pub use tls::{build_server_config, TlsError};
