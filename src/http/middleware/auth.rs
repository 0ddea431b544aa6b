//! Authentication middleware.
//! Verifies the bearer token and populates the request context for the
//! lifetime of the request.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::auth::{enrich_principal, PermissionLookup, TokenVerifier};
use crate::context::{AuthContext, ContextStore, RequestId};
use crate::error::InvalidTokenError;
use crate::observability::metrics;

/// State required for authentication.
#[derive(Clone)]
pub struct AuthState {
    pub verifier: Arc<dyn TokenVerifier>,
    pub permissions: Arc<dyn PermissionLookup>,
    pub store: Arc<ContextStore>,
    pub enabled: bool,
}

pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    // 1. Check if auth is enabled. If not, allow all (passthrough mode).
    if !state.enabled {
        return next.run(req).await;
    }

    // 2. Extract the bearer token
    let raw_token = match req.headers().get("Authorization").and_then(|h| h.to_str().ok()) {
        Some(value) => match value.strip_prefix("Bearer ") {
            Some(token) => token.to_string(),
            None => {
                metrics::record_auth_failure("scheme");
                return (StatusCode::UNAUTHORIZED, "Unsupported authorization scheme")
                    .into_response();
            }
        },
        None => {
            metrics::record_auth_failure("missing");
            return (StatusCode::UNAUTHORIZED, "Missing Authorization header").into_response();
        }
    };

    // 3. Verify via the external verifier; the context store is only ever
    //    populated with tokens that passed verification.
    let principal = match state.verifier.verify(&raw_token) {
        Ok(principal) => principal,
        Err(e) => {
            tracing::warn!(error = %e, "Token verification failed");
            let (reason, status) = match e {
                InvalidTokenError::Expired => ("expired", StatusCode::UNAUTHORIZED),
                InvalidTokenError::BadSignature => ("signature", StatusCode::UNAUTHORIZED),
                InvalidTokenError::Malformed(_) => ("malformed", StatusCode::BAD_REQUEST),
            };
            metrics::record_auth_failure(reason);
            return (status, "Invalid token").into_response();
        }
    };

    let id = req
        .extensions()
        .get::<RequestId>()
        .copied()
        .unwrap_or_default();

    // 4. Enrichment may suspend; the request can resume on another worker,
    //    which is why the context is keyed by request id rather than thread.
    let principal = enrich_principal(&state.permissions, principal).await;

    // Scope guard clears the context on every exit path, including
    // cancellation and panic unwind of the downstream handler.
    let scope = state.store.scope(id);
    state.store.set(
        id,
        AuthContext {
            token: raw_token,
            principal: principal.clone(),
        },
    );
    req.extensions_mut().insert(principal);

    let response = next.run(req).await;
    drop(scope);
    response
}
