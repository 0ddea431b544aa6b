//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, connection cap).
    pub listener: ListenerConfig,

    /// The single upstream this gateway fronts.
    pub upstream: UpstreamConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Token verification and context propagation.
    pub auth: AuthConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Upstream server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Upstream address (e.g., "127.0.0.1:3000").
    pub address: String,

    /// Whether the gateway→upstream hop carries encrypted payloads.
    /// Advertised to the upstream in the x-ca-encrypt header.
    pub encrypted: bool,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:3000".to_string(),
            encrypted: false,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
        }
    }
}

/// Policy applied when the partition key cannot be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnresolvedKeyPolicy {
    /// Fall back to the shared "unknown" bucket.
    #[default]
    Fallback,

    /// Reject the request outright.
    Reject,
}

/// Rate limiting configuration (one key-class per process).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Maximum tokens a bucket can hold (burst size).
    pub capacity: u32,

    /// Tokens replenished per second.
    pub refill_rate_per_second: f64,

    /// Buckets idle for longer than this are reclaimed.
    pub idle_eviction_secs: u64,

    /// Key on the authenticated subject instead of the client address
    /// when a verified principal is attached to the request.
    pub per_subject: bool,

    /// Proxies whose X-Forwarded-For header is trusted. Empty list means
    /// forwarded headers are never trusted (spoofable by any client).
    pub trusted_proxies: Vec<String>,

    /// What to do when no key can be derived.
    pub on_unresolved: UnresolvedKeyPolicy,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 50,
            refill_rate_per_second: 100.0,
            idle_eviction_secs: 300,
            per_subject: false,
            trusted_proxies: Vec::new(),
            on_unresolved: UnresolvedKeyPolicy::Fallback,
        }
    }
}

/// Token verification configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Enable token verification. When disabled, requests pass through
    /// unauthenticated and no context is populated.
    pub enabled: bool,

    /// HMAC-SHA256 secret shared with the token issuer (Bearer JWTs).
    pub hs256_secret: String,

    /// Static subject -> permissions table used by the bundled lookup.
    pub permissions: std::collections::HashMap<String, Vec<String>>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            hs256_secret: "CHANGE_ME_IN_PRODUCTION".to_string(),
            permissions: std::collections::HashMap::new(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
