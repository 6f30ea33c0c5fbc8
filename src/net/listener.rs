//! TCP listener with backpressure.
//!
//! # Responsibilities
//! - Bind to the configured address
//! - Enforce max_connections before a connection reaches the HTTP layer
//! - Attach the idle timeout to every accepted stream and count the
//!   requests in flight on it

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use axum_server::accept::Accept;
use futures_util::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;

use crate::config::{ListenerConfig, TimeoutConfig};
use crate::net::connection::{ConnectionService, ConnectionTracker, IdleTimeoutStream};

/// Error type for listener operations.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("invalid bind address {address:?}: {source}")]
    Address {
        address: String,
        source: std::net::AddrParseError,
    },

    #[error("failed to bind {address}: {source}")]
    Bind { address: SocketAddr, source: io::Error },
}

/// Bind the configured address.
pub async fn bind(config: &ListenerConfig) -> Result<TcpListener, ListenerError> {
    let address: SocketAddr =
        config
            .bind_address
            .parse()
            .map_err(|source| ListenerError::Address {
                address: config.bind_address.clone(),
                source,
            })?;

    let listener = TcpListener::bind(address)
        .await
        .map_err(|source| ListenerError::Bind { address, source })?;

    tracing::info!(
        address = %listener.local_addr().unwrap_or(address),
        max_connections = config.max_connections,
        "Listener bound"
    );
    Ok(listener)
}

/// First acceptor in the chain: waits for a connection slot, then wraps the
/// stream so it closes after `idle` with no request in flight and no traffic.
///
/// When the limit is reached new connections wait until a slot frees up.
#[derive(Debug, Clone)]
pub struct ConnectionAcceptor {
    tracker: ConnectionTracker,
    idle: Duration,
}

impl ConnectionAcceptor {
    pub fn new(listener: &ListenerConfig, timeouts: &TimeoutConfig) -> Self {
        Self {
            tracker: ConnectionTracker::new(listener.max_connections),
            idle: Duration::from_secs(timeouts.idle_secs),
        }
    }

    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }
}

impl<I, S> Accept<I, S> for ConnectionAcceptor
where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    S: Send + 'static,
{
    type Stream = IdleTimeoutStream<I>;
    type Service = ConnectionService<S>;
    type Future = BoxFuture<'static, io::Result<(Self::Stream, Self::Service)>>;

    fn accept(&self, stream: I, service: S) -> Self::Future {
        let tracker = self.tracker.clone();
        let idle = self.idle;
        Box::pin(async move {
            let guard = tracker.acquire().await?;
            tracing::debug!(
                connection_id = guard.id().as_u64(),
                active = tracker.active_count(),
                "Connection accepted"
            );
            let stream = IdleTimeoutStream::new(stream, idle).tracked(guard);
            let service = ConnectionService::new(service, stream.in_flight());
            Ok((stream, service))
        })
    }
}
