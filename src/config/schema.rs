//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Per-connection timeouts.
    pub timeouts: TimeoutConfig,

    /// Cross-origin policy.
    pub cors: CorsConfig,

    /// Static client bundle.
    pub assets: AssetsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "127.0.0.1:10000").
    pub bind_address: String,

    /// Optional TLS configuration. Plaintext when absent.
    pub tls: Option<TlsConfig>,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:10000".to_string(),
            tls: None,
            max_connections: 10_000,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate chain file (PEM).
    pub cert_path: PathBuf,

    /// Path to private key file (PEM).
    pub key_path: PathBuf,

    /// Key exchange groups, most preferred first.
    #[serde(default = "default_curves")]
    pub curve_preferences: Vec<Curve>,

    /// Pick the cipher suite by server order instead of the client's.
    #[serde(default = "default_true")]
    pub prefer_server_cipher_suites: bool,
}

impl TlsConfig {
    /// TLS from a certificate/key pair with default curves and server cipher order.
    pub fn new(cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        Self {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
            curve_preferences: default_curves(),
            prefer_server_cipher_suites: true,
        }
    }
}

/// Named key exchange groups accepted in `curve_preferences`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum Curve {
    #[serde(rename = "P-256")]
    P256,
    #[serde(rename = "P-384")]
    P384,
    #[serde(rename = "X25519")]
    X25519,
}

fn default_curves() -> Vec<Curve> {
    vec![Curve::P256, Curve::X25519]
}

fn default_true() -> bool {
    true
}

/// Timeout configuration for client connections.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Time allowed for a client to send the full request head, in seconds.
    pub read_header_secs: u64,

    /// Connections with no request in flight and no traffic for this long
    /// are closed, in seconds. Upgraded sockets are never closed as idle.
    pub idle_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            read_header_secs: 5,
            idle_secs: 120,
        }
    }
}

/// Cross-origin policy configuration.
///
/// `allowed_origins = ["*"]` selects the permissive policy; anything else
/// is treated as an exact-match allow-list.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
}

impl CorsConfig {
    /// Whether the configuration selects the allow-everything policy.
    pub fn is_permissive(&self) -> bool {
        self.allowed_origins.len() == 1 && self.allowed_origins[0] == "*"
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
            allowed_methods: ["GET", "POST", "OPTIONS", "PUT", "DELETE"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
            allowed_headers: [
                "Accept",
                "Content-Type",
                "Content-Length",
                "Accept-Encoding",
                "X-CSRF-Token",
                "Authorization",
                "x-grpc-web",
            ]
            .iter()
            .map(|h| h.to_string())
            .collect(),
        }
    }
}

/// Static client bundle configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AssetsConfig {
    /// Directory holding the client bundle.
    pub root: PathBuf,

    /// Document served for directory-style paths (ending in `/`).
    pub index_file: String,

    /// Serve `<file>.gz` when the client accepts gzip.
    pub precompressed_gzip: bool,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("frontend/html"),
            index_file: "index.html".to_string(),
            precompressed_gzip: true,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable, colored.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "debug".to_string(),
            log_format: LogFormat::Text,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
