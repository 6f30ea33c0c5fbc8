//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use axum::body::Body;
use axum::extract::ws::{Message, WebSocket};
use axum::http::header;
use axum::response::Response;
use futures_util::future::BoxFuture;
use tokio::task::JoinHandle;

use grpcweb_gateway::config::{GatewayConfig, TlsConfig};
use grpcweb_gateway::http::ServerError;
use grpcweb_gateway::lifecycle::Shutdown;
use grpcweb_gateway::net;
use grpcweb_gateway::rpc::{RpcCall, RpcHandler, RpcStatus, ServiceDescriptor, ServiceRegistry};
use grpcweb_gateway::HttpServer;

/// A gateway running on a loopback port.
pub struct Gateway {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub task: JoinHandle<Result<(), ServerError>>,
}

impl Gateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    /// URL matching the `localhost` name in the fixture certificate.
    pub fn https_url(&self, path: &str) -> String {
        format!("https://localhost:{}{}", self.addr.port(), path)
    }
}

/// Path of a file under `tests/fixtures`.
pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// TLS settings using the fixture certificate for `localhost`/127.0.0.1.
pub fn fixture_tls() -> TlsConfig {
    TlsConfig::new(fixture("cert.pem"), fixture("key.pem"))
}

/// Client trusting the fixture CA and resolving `localhost` to `addr`.
pub fn tls_client(addr: SocketAddr) -> reqwest::ClientBuilder {
    let ca = fs::read(fixture("ca.pem")).unwrap();
    reqwest::Client::builder()
        .use_rustls_tls()
        .add_root_certificate(reqwest::Certificate::from_pem(&ca).unwrap())
        .resolve("localhost", addr)
}

/// Start the real server on an ephemeral port.
pub async fn spawn_gateway(mut config: GatewayConfig, registry: ServiceRegistry) -> Gateway {
    config.listener.bind_address = "127.0.0.1:0".to_string();
    let server = HttpServer::new(config, registry).unwrap();
    let listener = net::bind(&server.config().listener).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let stop = shutdown.subscribe();
    let task = tokio::spawn(server.run(listener, stop));

    Gateway {
        addr,
        shutdown,
        task,
    }
}

/// Registry with `echo.Echo/Say` and `echo.Echo/Stream` backed by [`Echo`].
pub fn echo_registry() -> ServiceRegistry {
    let mut builder = ServiceRegistry::builder();
    builder
        .register(
            ServiceDescriptor::new("echo.Echo").method("Say").method("Stream"),
            Echo,
        )
        .unwrap();
    builder.build()
}

/// Echoes framed bodies and binary socket messages back unchanged.
pub struct Echo;

impl RpcHandler for Echo {
    fn call(&self, call: RpcCall, body: Body) -> BoxFuture<'static, Result<Response, RpcStatus>> {
        Box::pin(async move {
            let bytes = axum::body::to_bytes(body, usize::MAX)
                .await
                .map_err(|e| RpcStatus::internal(e.to_string()))?;
            let content_type = call.media.unwrap_or_default().content_type();
            Response::builder()
                .header(header::CONTENT_TYPE, content_type)
                .header("grpc-status", "0")
                .body(Body::from(bytes))
                .map_err(|e| RpcStatus::internal(e.to_string()))
        })
    }

    fn stream(&self, _call: RpcCall, mut socket: WebSocket) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            while let Some(Ok(message)) = socket.recv().await {
                match message {
                    Message::Binary(data) => {
                        if socket.send(Message::Binary(data)).await.is_err() {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        })
    }
}

/// Registry with `slow.Slow/Wait`, answering after `delay`.
pub fn slow_registry(delay: Duration) -> ServiceRegistry {
    let mut builder = ServiceRegistry::builder();
    builder
        .register(
            ServiceDescriptor::new("slow.Slow").method("Wait"),
            Slow(delay),
        )
        .unwrap();
    builder.build()
}

/// Sleeps before answering with an empty OK message.
pub struct Slow(pub Duration);

impl RpcHandler for Slow {
    fn call(&self, call: RpcCall, _body: Body) -> BoxFuture<'static, Result<Response, RpcStatus>> {
        let delay = self.0;
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            let content_type = call.media.unwrap_or_default().content_type();
            Response::builder()
                .header(header::CONTENT_TYPE, content_type)
                .header("grpc-status", "0")
                .body(Body::from(vec![0u8, 0, 0, 0, 0]))
                .map_err(|e| RpcStatus::internal(e.to_string()))
        })
    }
}

/// A scratch client bundle:
/// `index.html`, `app.js`, `app.js.gz`, `app/index.html`.
pub fn bundle_dir() -> PathBuf {
    let root = std::env::temp_dir().join(format!("bundle-{}", uuid::Uuid::new_v4()));
    fs::create_dir_all(root.join("app")).unwrap();
    fs::write(root.join("index.html"), "<h1>root</h1>").unwrap();
    fs::write(root.join("app.js"), "console.log('plain')").unwrap();
    fs::write(root.join("app.js.gz"), b"gzipped-bytes").unwrap();
    fs::write(root.join("app").join("index.html"), "<h1>app</h1>").unwrap();
    root
}

pub fn config_with_bundle(root: PathBuf) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.assets.root = root;
    config
}
