//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → key_resolver.rs (derive partition key)
//!     → rate_limit.rs (token-bucket admission per key)
//!     → headers.rs (encode x-ca-* set for the upstream hop)
//!     → Pass to forwarding
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any security check failure
//! - Limiter rejection is a normal outcome, not an internal error
//! - No trust in client input (forwarded headers are opt-in per proxy)

pub mod headers;
pub mod key_resolver;
pub mod rate_limit;

pub use headers::{SecurityHeader, SecurityHeaderSet};
pub use key_resolver::{KeyResolver, RateKey, TrustPolicy};
pub use rate_limit::{Decision, RateLimiter};
