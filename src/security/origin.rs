//! Cross-origin policy.
//!
//! # Responsibilities
//! - Decide whether a caller's `Origin` may proceed at all
//! - Compute the `Access-Control-*` headers for a request
//! - Produce the complete response for a preflight
//!
//! # Design Decisions
//! - Policies are immutable values behind `Arc<dyn OriginPolicy>`; swapping
//!   the permissive policy for an allow-list touches neither the classifier
//!   nor the dispatcher
//! - Requests without an `Origin` header are same-origin or non-browser and
//!   are always acceptable
//! - RPC responses also expose the gRPC status headers so browser clients
//!   can read them

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::Response;

use crate::config::CorsConfig;
use crate::http::request::RequestDescriptor;
use crate::routing::classifier::Classification;

/// Headers a browser client may read from an RPC response.
const EXPOSED_RPC_HEADERS: &str = "grpc-status, grpc-message, grpc-status-details-bin";

/// Error building a policy from configuration.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("invalid allowed method {0:?}")]
    Method(String),
    #[error("invalid allowed header {0:?}")]
    Header(String),
    #[error("invalid allowed origin {0:?}")]
    Origin(String),
}

/// Response headers computed for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OriginDecision {
    pub allow_origin: Option<HeaderValue>,
    pub allow_methods: Option<HeaderValue>,
    pub allow_headers: Option<HeaderValue>,
    pub expose_headers: Option<HeaderValue>,
    /// Set when `allow_origin` echoes the request, so caches key on it.
    pub vary_origin: bool,
}

impl OriginDecision {
    /// Merge the decision into a response's headers, replacing existing values.
    pub fn apply(&self, headers: &mut HeaderMap) {
        let pairs = [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, &self.allow_origin),
            (header::ACCESS_CONTROL_ALLOW_METHODS, &self.allow_methods),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, &self.allow_headers),
            (header::ACCESS_CONTROL_EXPOSE_HEADERS, &self.expose_headers),
        ];
        for (name, value) in pairs {
            if let Some(value) = value {
                headers.insert(name, value.clone());
            }
        }
        if self.vary_origin {
            headers.append(header::VARY, HeaderValue::from_static("origin"));
        }
    }

    /// The full answer to a preflight: success, no body, CORS headers.
    pub fn into_preflight_response(self) -> Response {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::OK;
        self.apply(response.headers_mut());
        response
    }
}

/// A cross-origin policy.
pub trait OriginPolicy: Send + Sync + fmt::Debug {
    /// Headers to attach for a request from `origin` of the given kind.
    fn evaluate(&self, origin: Option<&str>, classification: Classification) -> OriginDecision;

    /// Whether the request may be dispatched at all.
    fn is_acceptable(&self, descriptor: &RequestDescriptor<'_>) -> bool;
}

/// Methods and headers advertised by every policy.
#[derive(Debug, Clone)]
struct Advertised {
    methods: HeaderValue,
    headers: HeaderValue,
}

impl Advertised {
    fn from_config(config: &CorsConfig) -> Result<Self, PolicyError> {
        for method in &config.allowed_methods {
            method
                .parse::<Method>()
                .map_err(|_| PolicyError::Method(method.clone()))?;
        }
        for name in &config.allowed_headers {
            name.parse::<HeaderName>()
                .map_err(|_| PolicyError::Header(name.clone()))?;
        }

        let methods = config.allowed_methods.join(", ");
        let headers = config.allowed_headers.join(", ");
        Ok(Self {
            methods: HeaderValue::from_str(&methods).map_err(|_| PolicyError::Method(methods))?,
            headers: HeaderValue::from_str(&headers).map_err(|_| PolicyError::Header(headers))?,
        })
    }

    fn decision(&self, allow_origin: Option<HeaderValue>, classification: Classification) -> OriginDecision {
        OriginDecision {
            allow_origin,
            allow_methods: Some(self.methods.clone()),
            allow_headers: Some(self.headers.clone()),
            expose_headers: classification
                .is_rpc()
                .then(|| HeaderValue::from_static(EXPOSED_RPC_HEADERS)),
            vary_origin: false,
        }
    }
}

/// Accepts every origin and answers `Access-Control-Allow-Origin: *`.
#[derive(Debug, Clone)]
pub struct PermissivePolicy {
    advertised: Advertised,
}

impl PermissivePolicy {
    pub fn new(config: &CorsConfig) -> Result<Self, PolicyError> {
        Ok(Self {
            advertised: Advertised::from_config(config)?,
        })
    }
}

impl OriginPolicy for PermissivePolicy {
    fn evaluate(&self, _origin: Option<&str>, classification: Classification) -> OriginDecision {
        self.advertised
            .decision(Some(HeaderValue::from_static("*")), classification)
    }

    fn is_acceptable(&self, _descriptor: &RequestDescriptor<'_>) -> bool {
        true
    }
}

/// Accepts only origins on an exact-match list and echoes them back.
#[derive(Debug, Clone)]
pub struct AllowListPolicy {
    origins: HashSet<String>,
    advertised: Advertised,
}

impl AllowListPolicy {
    pub fn new(config: &CorsConfig) -> Result<Self, PolicyError> {
        let mut origins = HashSet::with_capacity(config.allowed_origins.len());
        for origin in &config.allowed_origins {
            HeaderValue::from_str(origin).map_err(|_| PolicyError::Origin(origin.clone()))?;
            origins.insert(origin.to_ascii_lowercase());
        }
        Ok(Self {
            origins,
            advertised: Advertised::from_config(config)?,
        })
    }

    fn allows(&self, origin: &str) -> bool {
        self.origins.contains(&origin.to_ascii_lowercase())
    }
}

impl OriginPolicy for AllowListPolicy {
    fn evaluate(&self, origin: Option<&str>, classification: Classification) -> OriginDecision {
        let allow_origin = origin
            .filter(|o| self.allows(o))
            .and_then(|o| HeaderValue::from_str(o).ok());
        let vary_origin = allow_origin.is_some();
        OriginDecision {
            vary_origin,
            ..self.advertised.decision(allow_origin, classification)
        }
    }

    fn is_acceptable(&self, descriptor: &RequestDescriptor<'_>) -> bool {
        descriptor.origin().map_or(true, |o| self.allows(o))
    }
}

/// Build the policy selected by configuration.
pub fn policy_from_config(config: &CorsConfig) -> Result<Arc<dyn OriginPolicy>, PolicyError> {
    if config.is_permissive() {
        Ok(Arc::new(PermissivePolicy::new(config)?))
    } else {
        Ok(Arc::new(AllowListPolicy::new(config)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn permissive() -> Arc<dyn OriginPolicy> {
        policy_from_config(&CorsConfig::default()).unwrap()
    }

    fn allow_list() -> Arc<dyn OriginPolicy> {
        let config = CorsConfig {
            allowed_origins: vec!["https://app.example.com".into()],
            ..CorsConfig::default()
        };
        policy_from_config(&config).unwrap()
    }

    #[test]
    fn permissive_preflight_carries_all_headers() {
        for origin in [Some("https://example.com"), Some("null"), None] {
            let response = permissive()
                .evaluate(origin, Classification::PreflightRequest)
                .into_preflight_response();
            assert_eq!(response.status(), StatusCode::OK);
            let headers = response.headers();
            assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
            assert_eq!(
                headers[header::ACCESS_CONTROL_ALLOW_METHODS],
                "GET, POST, OPTIONS, PUT, DELETE"
            );
            assert_eq!(
                headers[header::ACCESS_CONTROL_ALLOW_HEADERS],
                "Accept, Content-Type, Content-Length, Accept-Encoding, X-CSRF-Token, Authorization, x-grpc-web"
            );
            assert!(headers.get(header::ACCESS_CONTROL_EXPOSE_HEADERS).is_none());
        }
    }

    #[test]
    fn rpc_decisions_expose_grpc_status() {
        let decision = permissive().evaluate(None, Classification::FramedRpc);
        assert_eq!(
            decision.expose_headers,
            Some(HeaderValue::from_static(EXPOSED_RPC_HEADERS))
        );
        let decision = permissive().evaluate(None, Classification::StaticAsset);
        assert!(decision.expose_headers.is_none());
    }

    #[test]
    fn apply_replaces_existing_values() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("https://stale.example"),
        );
        permissive()
            .evaluate(None, Classification::StaticAsset)
            .apply(&mut headers);
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(headers.get_all(header::ACCESS_CONTROL_ALLOW_ORIGIN).iter().count(), 1);
    }

    #[test]
    fn allow_list_echoes_known_origins() {
        let policy = allow_list();
        let decision = policy.evaluate(Some("https://app.example.com"), Classification::FramedRpc);
        assert_eq!(
            decision.allow_origin,
            Some(HeaderValue::from_static("https://app.example.com"))
        );
        assert!(decision.vary_origin);

        let mut headers = HeaderMap::new();
        decision.apply(&mut headers);
        assert_eq!(headers[header::VARY], "origin");

        let decision = policy.evaluate(Some("https://evil.example"), Classification::FramedRpc);
        assert!(decision.allow_origin.is_none());
        assert!(!decision.vary_origin);
    }

    #[test]
    fn allow_list_acceptability() {
        let policy = allow_list();
        let check = |origin: Option<&str>| {
            let mut builder = Request::builder().uri("/pkg.Service/Method");
            if let Some(o) = origin {
                builder = builder.header("origin", o);
            }
            let request = builder.body(Body::empty()).unwrap();
            policy.is_acceptable(&RequestDescriptor::from_request(&request))
        };

        assert!(check(None));
        assert!(check(Some("https://app.example.com")));
        assert!(check(Some("HTTPS://APP.EXAMPLE.COM")));
        assert!(!check(Some("https://evil.example")));

        let request = Request::builder()
            .header("origin", "https://evil.example")
            .body(Body::empty())
            .unwrap();
        assert!(permissive().is_acceptable(&RequestDescriptor::from_request(&request)));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = CorsConfig {
            allowed_methods: vec!["GET POST".into()],
            ..CorsConfig::default()
        };
        assert!(matches!(policy_from_config(&config), Err(PolicyError::Method(_))));

        let config = CorsConfig {
            allowed_headers: vec!["bad header".into()],
            ..CorsConfig::default()
        };
        assert!(matches!(policy_from_config(&config), Err(PolicyError::Header(_))));
    }
}
