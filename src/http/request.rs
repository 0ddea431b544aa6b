//! Request identity assignment.
//!
//! # Responsibilities
//! - Assign each inbound request its execution handle ([`RequestId`])
//!   as early as possible, before any other middleware runs
//! - Make the handle available to the auth middleware (context key) and
//!   the forward handler (x-ca-reqid injection)
//!
//! # Design Decisions
//! - The handle is a fresh UUID v4 per request; client-supplied
//!   correlation ids are not reused as context keys, since a colliding or
//!   replayed id would pierce context isolation

use axum::{body::Body, http::Request, middleware::Next, response::Response};

use crate::context::RequestId;

/// Middleware attaching a fresh [`RequestId`] to the request extensions.
pub async fn request_id_middleware(mut request: Request<Body>, next: Next) -> Response {
    let id = RequestId::new();
    request.extensions_mut().insert(id);
    next.run(request).await
}
