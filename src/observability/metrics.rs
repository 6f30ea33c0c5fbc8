//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by kind and status
//! - `gateway_request_duration_seconds` (histogram): time to response head, by kind
//! - `gateway_active_connections` (gauge): current connection count
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - The Prometheus endpoint is optional and runs on its own address

use std::net::SocketAddr;
use std::time::Instant;

use axum::http::StatusCode;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::routing::classifier::Classification;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Record one dispatched request.
pub fn record_request(kind: Classification, status: StatusCode, start: Instant) {
    metrics::counter!(
        "gateway_requests_total",
        "kind" => kind.as_str(),
        "status" => status.as_u16().to_string()
    )
    .increment(1);
    metrics::histogram!(
        "gateway_request_duration_seconds",
        "kind" => kind.as_str()
    )
    .record(start.elapsed().as_secs_f64());
}

pub fn connection_opened() {
    metrics::gauge!("gateway_active_connections").increment(1.0);
}

pub fn connection_closed() {
    metrics::gauge!("gateway_active_connections").decrement(1.0);
}
