//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, HTTP/1.1 + HTTP/2, request ID, tracing)
//!     → request.rs (read-only request descriptor)
//!     → [routing layer classifies and dispatches]
//!     → websocket.rs (handshake for socket-tunneled RPC)
//!     → assets.rs (static client bundle)
//!     → Send to client
//! ```

pub mod assets;
pub mod request;
pub mod server;
pub mod websocket;

pub use assets::{AssetResponder, StaticResponder};
pub use request::{RequestDescriptor, UuidRequestId, X_REQUEST_ID};
pub use server::{HttpServer, ServerError, SHUTDOWN_GRACE};
pub use websocket::{accept_rpc_socket, GRPC_WEBSOCKETS_PROTOCOL};
