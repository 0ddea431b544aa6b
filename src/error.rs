//! Error taxonomy for the admission core.
//!
//! Rate-limiter rejections are NOT errors: a rejected request is a normal
//! outcome carried by [`crate::security::rate_limit::Decision`]. The types
//! here cover genuine failures that callers must map to a response or a
//! fallback policy.

use thiserror::Error;

/// The rate-limiting partition key could not be derived from the request.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyResolutionError {
    /// No peer address available (listener misconfiguration or a transport
    /// that does not expose one).
    #[error("peer address unavailable")]
    MissingPeerAddress,

    /// The forwarded-for header was present but unparseable.
    #[error("malformed X-Forwarded-For header")]
    MalformedForwardedHeader,
}

/// Admission request that can never be satisfied by the bucket it targets.
#[derive(Debug, Error, PartialEq)]
#[error("cost {cost} exceeds bucket capacity {capacity}")]
pub struct UnsatisfiableRequestError {
    pub cost: f64,
    pub capacity: f64,
}

/// A caller-required security header was absent on decode.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("missing required header {0}")]
pub struct MissingHeaderError(pub &'static str);

/// Token rejected by the verifier. The context store is never populated
/// with a token that failed verification.
#[derive(Debug, Error)]
pub enum InvalidTokenError {
    #[error("token is malformed: {0}")]
    Malformed(String),

    #[error("token signature verification failed")]
    BadSignature,

    #[error("token is expired")]
    Expired,
}
