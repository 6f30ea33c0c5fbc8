//! Connection timeouts against a running gateway.

use std::time::Duration;

use reqwest::{StatusCode, Version};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use grpcweb_gateway::config::GatewayConfig;
use grpcweb_gateway::rpc::ServiceRegistry;

mod common;

use common::{slow_registry, spawn_gateway};

fn short_idle() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.timeouts.idle_secs = 1;
    config.timeouts.read_header_secs = 30;
    config
}

#[tokio::test]
async fn slow_handler_outlives_idle_timeout_over_http1() {
    let gateway = spawn_gateway(short_idle(), slow_registry(Duration::from_secs(3))).await;
    let client = reqwest::Client::builder().http1_only().build().unwrap();

    let response = client
        .post(gateway.url("/slow.Slow/Wait"))
        .header("content-type", "application/grpc-web+proto")
        .body(vec![0u8, 0, 0, 0, 0])
        .send()
        .await
        .unwrap();

    assert_eq!(response.version(), Version::HTTP_11);
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["grpc-status"], "0");
    assert_eq!(response.bytes().await.unwrap().as_ref(), &[0u8, 0, 0, 0, 0]);
}

#[tokio::test]
async fn slow_handler_keeps_http2_connection_alive() {
    let gateway = spawn_gateway(short_idle(), slow_registry(Duration::from_secs(3))).await;
    let client = reqwest::Client::builder()
        .http2_prior_knowledge()
        .build()
        .unwrap();

    let call = || {
        client
            .post(gateway.url("/slow.Slow/Wait"))
            .header("content-type", "application/grpc")
            .header("te", "trailers")
            .body(vec![0u8, 0, 0, 0, 0])
            .send()
    };
    // Two streams share the connection; neither may be cut off.
    let (first, second) = tokio::join!(call(), call());

    for response in [first.unwrap(), second.unwrap()] {
        assert_eq!(response.version(), Version::HTTP_2);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["grpc-status"], "0");
    }
}

#[tokio::test]
async fn idle_connection_is_closed() {
    let gateway = spawn_gateway(short_idle(), ServiceRegistry::default()).await;
    let mut socket = TcpStream::connect(gateway.addr).await.unwrap();

    let mut rest = Vec::new();
    let closed = tokio::time::timeout(Duration::from_secs(5), socket.read_to_end(&mut rest)).await;
    assert!(closed.is_ok(), "idle connection was left open");
}

#[tokio::test]
async fn incomplete_request_head_is_cut_off() {
    let mut config = GatewayConfig::default();
    config.timeouts.read_header_secs = 1;
    let gateway = spawn_gateway(config, ServiceRegistry::default()).await;

    let mut socket = TcpStream::connect(gateway.addr).await.unwrap();
    socket
        .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\nUser-Agent: slow")
        .await
        .unwrap();

    let mut rest = Vec::new();
    let closed = tokio::time::timeout(Duration::from_secs(5), socket.read_to_end(&mut rest)).await;
    assert!(closed.is_ok(), "connection stayed open past the header timeout");
    assert!(!rest.starts_with(b"HTTP/1.1 200"));
}
