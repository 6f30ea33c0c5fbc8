//! Protocol dispatch.
//!
//! # Responsibilities
//! - Classify each request once, before any collaborator sees it
//! - Refuse callers the origin policy does not accept
//! - Hand the request to exactly one of: origin evaluator (preflight),
//!   RPC engine (socket or framed), static responder
//! - Merge the origin decision into whatever response comes back
//!
//! # Design Decisions
//! - One exhaustive `match` over [`Classification`]; each arm calls a single
//!   collaborator and nothing runs after a preflight
//! - Holds only `Arc`s to immutable collaborators, so it is cheap to clone
//!   into every connection task
//! - Per-request failures become that response's status, never a panic

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::http::assets::StaticResponder;
use crate::http::request::RequestDescriptor;
use crate::observability::metrics;
use crate::routing::classifier::{classify, Classification};
use crate::rpc::engine::RpcEngine;
use crate::security::origin::OriginPolicy;

/// Routes classified requests to their collaborator.
#[derive(Clone)]
pub struct Dispatcher {
    policy: Arc<dyn OriginPolicy>,
    engine: Arc<dyn RpcEngine>,
    assets: Arc<dyn StaticResponder>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(
        policy: Arc<dyn OriginPolicy>,
        engine: Arc<dyn RpcEngine>,
        assets: Arc<dyn StaticResponder>,
    ) -> Self {
        Self {
            policy,
            engine,
            assets,
        }
    }

    /// Classify, check the origin, dispatch.
    pub async fn handle(&self, request: Request<Body>) -> Response {
        let start = Instant::now();

        let (classification, acceptable) = {
            let descriptor = RequestDescriptor::from_request(&request);
            let classification = classify(&descriptor);
            tracing::debug!(
                request_id = %descriptor.request_id(),
                method = %descriptor.method,
                path = %descriptor.path,
                version = ?descriptor.version,
                kind = %classification,
                "Classified request"
            );
            (classification, self.policy.is_acceptable(&descriptor))
        };

        let response = if acceptable {
            self.dispatch(request, classification).await
        } else {
            tracing::warn!(
                origin = ?request.headers().get(axum::http::header::ORIGIN),
                path = %request.uri().path(),
                kind = %classification,
                "Origin rejected"
            );
            StatusCode::FORBIDDEN.into_response()
        };

        metrics::record_request(classification, response.status(), start);
        response
    }

    /// Send the request to the single collaborator owning `classification`.
    pub async fn dispatch(&self, request: Request<Body>, classification: Classification) -> Response {
        let origin = RequestDescriptor::from_request(&request).origin();
        let decision = self.policy.evaluate(origin, classification);

        let mut response = match classification {
            Classification::PreflightRequest => return decision.into_preflight_response(),
            Classification::SocketUpgradeRpc => self.engine.serve_upgrade(request).await,
            Classification::FramedRpc => self.engine.serve_framed(request).await,
            Classification::StaticAsset => self.assets.respond(request).await,
        };

        decision.apply(response.headers_mut());
        response
    }
}
