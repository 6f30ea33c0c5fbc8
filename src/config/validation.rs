//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, connection limit > 0)
//! - Check that CORS entries are valid origins, methods and header names
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use axum::http::{HeaderName, Method, Uri};

use crate::config::schema::GatewayConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("listener.bind_address {0:?} is not a socket address")]
    InvalidBindAddress(String),
    #[error("listener.max_connections must be greater than zero")]
    ZeroMaxConnections,
    #[error("timeouts.{0} must be greater than zero")]
    ZeroTimeout(&'static str),
    #[error("listener.tls.{0} must not be empty")]
    EmptyTlsPath(&'static str),
    #[error("listener.tls.curve_preferences must name at least one curve")]
    NoCurves,
    #[error("cors.allowed_origins must not be empty")]
    NoOrigins,
    #[error("cors.allowed_origins: \"*\" cannot be combined with explicit origins")]
    MixedWildcard,
    #[error("cors.allowed_origins: {0:?} is not a scheme://host[:port] origin")]
    InvalidOrigin(String),
    #[error("cors.allowed_methods: {0:?} is not an HTTP method")]
    InvalidMethod(String),
    #[error("cors.allowed_headers: {0:?} is not a header name")]
    InvalidHeader(String),
    #[error("assets.index_file {0:?} must be a plain file name")]
    InvalidIndexFile(String),
    #[error("observability.metrics_address {0:?} is not a socket address")]
    InvalidMetricsAddress(String),
}

/// Check a parsed configuration, collecting every problem found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::ZeroMaxConnections);
    }
    if let Some(tls) = &config.listener.tls {
        if tls.cert_path.as_os_str().is_empty() {
            errors.push(ValidationError::EmptyTlsPath("cert_path"));
        }
        if tls.key_path.as_os_str().is_empty() {
            errors.push(ValidationError::EmptyTlsPath("key_path"));
        }
        if tls.curve_preferences.is_empty() {
            errors.push(ValidationError::NoCurves);
        }
    }

    if config.timeouts.read_header_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("read_header_secs"));
    }
    if config.timeouts.idle_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("idle_secs"));
    }

    let origins = &config.cors.allowed_origins;
    if origins.is_empty() {
        errors.push(ValidationError::NoOrigins);
    } else if origins.len() > 1 && origins.iter().any(|o| o == "*") {
        errors.push(ValidationError::MixedWildcard);
    } else if !config.cors.is_permissive() {
        for origin in origins {
            if !is_valid_origin(origin) {
                errors.push(ValidationError::InvalidOrigin(origin.clone()));
            }
        }
    }
    for method in &config.cors.allowed_methods {
        if method.parse::<Method>().is_err() {
            errors.push(ValidationError::InvalidMethod(method.clone()));
        }
    }
    for header in &config.cors.allowed_headers {
        if header.parse::<HeaderName>().is_err() {
            errors.push(ValidationError::InvalidHeader(header.clone()));
        }
    }

    let index = &config.assets.index_file;
    if index.is_empty() || index.contains('/') || index.contains('\\') || index == ".." {
        errors.push(ValidationError::InvalidIndexFile(index.clone()));
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// An origin is `scheme://host[:port]` with nothing after the authority.
fn is_valid_origin(origin: &str) -> bool {
    if origin.ends_with('/') {
        return false;
    }
    match origin.parse::<Uri>() {
        Ok(uri) => {
            uri.scheme().is_some()
                && uri.authority().is_some()
                && uri.path() == "/"
                && uri.query().is_none()
        }
        Err(_) => false,
    }
}
