//! Middleware layers applied to every request, in admission order:
//! request id → auth (context populate) → rate limit → forward.

pub mod auth;

pub use auth::{auth_middleware, AuthState};
