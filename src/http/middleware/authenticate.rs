//! API key authentication middleware.
//!
//! Resolves the caller from `X-API-Key`, records AUTH_SUCCESS / AUTH_FAILURE,
//! and leaves the identity in both request and response extensions so handlers
//! and the observation layer can see who called.

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::http::context::RequestContext;
use crate::http::correlation::CorrelationId;
use crate::http::error::ApiError;
use crate::http::server::AppState;
use crate::security::{CallerIdentity, KeyCheck, X_API_KEY};

const AUTH_ACTION: &str = "Authenticate";

fn reject(reason: &str) -> Response {
    let mut response = ApiError::Unauthorized(reason.to_string()).into_response();
    response
        .extensions_mut()
        .insert(CallerIdentity::Unauthenticated);
    response
}

pub async fn authenticate(State(state): State<AppState>, mut req: Request<Body>, next: Next) -> Response {
    let ctx = req
        .extensions()
        .get::<RequestContext>()
        .cloned()
        .unwrap_or_else(|| RequestContext::from_request(&req, CorrelationId::generate()));
    let audit = state.config.audit.enabled.then_some(&state.audit);

    let presented = req.headers().get(X_API_KEY).and_then(|v| v.to_str().ok());
    let identity = match state.api_keys.check(presented) {
        KeyCheck::Valid(identity) => {
            if let Some(audit) = audit {
                audit.record_auth_success(&ctx, &identity, AUTH_ACTION);
            }
            identity
        }
        KeyCheck::Invalid => {
            if let Some(audit) = audit {
                audit.record_auth_failure(&ctx, AUTH_ACTION, "invalid api key");
            }
            if state.api_keys.required() {
                return reject("invalid api key");
            }
            CallerIdentity::Unauthenticated
        }
        KeyCheck::Missing => {
            if state.api_keys.required() {
                if let Some(audit) = audit {
                    audit.record_auth_failure(&ctx, AUTH_ACTION, "missing api key");
                }
                return reject("missing api key");
            }
            CallerIdentity::Unauthenticated
        }
    };

    req.extensions_mut().insert(identity.clone());
    let mut response = next.run(req).await;
    response.extensions_mut().insert(identity);
    response
}
