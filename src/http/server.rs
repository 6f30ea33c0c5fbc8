//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the collaborators (origin policy, RPC engine, asset responder)
//! - Create the Axum router: one fallback handler in front of the dispatcher
//! - Wire up middleware (request ID, tracing)
//! - Serve HTTP/1.1 and HTTP/2 (cleartext or TLS) on a single listener
//! - Drain in-flight requests on shutdown

use std::io;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::Response,
    Router,
};
use axum_server::tls_rustls::{RustlsAcceptor, RustlsConfig};
use axum_server::Handle;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use hyper_util::server::conn::auto;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::{GatewayConfig, TimeoutConfig};
use crate::http::assets::{AssetResponder, StaticResponder};
use crate::http::request::UuidRequestId;
use crate::net::{build_server_config, ConnectionAcceptor, TlsError};
use crate::routing::dispatcher::Dispatcher;
use crate::rpc::{RegistryEngine, RpcEngine, ServiceRegistry};
use crate::security::origin::{policy_from_config, PolicyError};

/// How long in-flight requests may run after shutdown starts.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("invalid origin policy: {0}")]
    Policy(#[from] PolicyError),

    #[error("TLS setup failed: {0}")]
    Tls(#[from] TlsError),

    #[error("server I/O error: {0}")]
    Io(#[from] io::Error),
}

/// The single-port front door.
pub struct HttpServer {
    config: GatewayConfig,
    dispatcher: Dispatcher,
    tls: Option<RustlsConfig>,
}

impl HttpServer {
    /// Create a server routing RPC traffic through `registry`.
    pub fn new(config: GatewayConfig, registry: ServiceRegistry) -> Result<Self, ServerError> {
        log_service_info(&registry);
        let engine = Arc::new(RegistryEngine::new(registry));
        let assets = Arc::new(AssetResponder::new(&config.assets));
        Self::with_collaborators(config, engine, assets)
    }

    /// Create a server around caller-supplied collaborators.
    pub fn with_collaborators(
        config: GatewayConfig,
        engine: Arc<dyn RpcEngine>,
        assets: Arc<dyn StaticResponder>,
    ) -> Result<Self, ServerError> {
        let policy = policy_from_config(&config.cors)?;
        let tls = config
            .listener
            .tls
            .as_ref()
            .map(build_server_config)
            .transpose()?
            .map(|server_config| RustlsConfig::from_config(Arc::new(server_config)));

        Ok(Self {
            dispatcher: Dispatcher::new(policy, engine, assets),
            config,
            tls,
        })
    }

    /// Build the Axum router with all middleware layers.
    pub fn router(&self) -> Router {
        Router::new()
            .fallback(front_door)
            .with_state(self.dispatcher.clone())
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
    }

    /// Serve `listener` until a value (or closure) arrives on `shutdown`,
    /// then drain for at most [`SHUTDOWN_GRACE`].
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        let app = self.router().into_make_service();
        let acceptor = ConnectionAcceptor::new(&self.config.listener, &self.config.timeouts);

        let handle = Handle::new();
        tokio::spawn({
            let handle = handle.clone();
            async move {
                let _ = shutdown.recv().await;
                tracing::info!(
                    active = handle.connection_count(),
                    grace = ?SHUTDOWN_GRACE,
                    "Draining connections"
                );
                handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
            }
        });

        let listener = listener.into_std()?;
        match self.tls {
            Some(tls) => {
                tracing::info!(address = %addr, "HTTPS server starting");
                let mut server = axum_server::from_tcp(listener)
                    .acceptor(RustlsAcceptor::new(tls).acceptor(acceptor))
                    .handle(handle);
                configure_protocols(server.http_builder(), &self.config.timeouts);
                server.serve(app).await?;
            }
            None => {
                tracing::info!(address = %addr, "HTTP server starting");
                let mut server = axum_server::from_tcp(listener)
                    .acceptor(acceptor)
                    .handle(handle);
                configure_protocols(server.http_builder(), &self.config.timeouts);
                server.serve(app).await?;
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }
}

/// Every request lands here regardless of method or path.
async fn front_door(State(dispatcher): State<Dispatcher>, request: Request<Body>) -> Response {
    dispatcher.handle(request).await
}

fn configure_protocols(builder: &mut auto::Builder<TokioExecutor>, timeouts: &TimeoutConfig) {
    builder
        .http1()
        .timer(TokioTimer::new())
        .header_read_timeout(Duration::from_secs(timeouts.read_header_secs));
    builder.http2().timer(TokioTimer::new());
}

fn log_service_info(registry: &ServiceRegistry) {
    if registry.is_empty() {
        tracing::warn!("No RPC services registered; RPC requests will return UNIMPLEMENTED");
        return;
    }
    for service in registry.service_info() {
        tracing::info!(
            service = service.name(),
            methods = ?service.methods(),
            "Serving RPC service"
        );
    }
}
