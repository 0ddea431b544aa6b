//! Gateway admission core library.
//!
//! Request-scoped authentication-context propagation, partition-keyed
//! token-bucket rate limiting, and the `x-ca-*` security header codec,
//! wired into an axum middleware pipeline.

pub mod auth;
pub mod config;
pub mod context;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::GatewayConfig;
pub use context::{AuthContext, ContextStore, RequestId};
pub use http::GatewayServer;
pub use lifecycle::Shutdown;
pub use security::{Decision, KeyResolver, RateLimiter, SecurityHeaderSet};
