//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parseable)
//! - Catch rate-limit settings that can never admit a request
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::GatewayConfig;

/// A single semantic problem found in the configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration, collecting every error found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError {
            field: "listener.bind_address",
            message: format!("not a valid socket address: {}", config.listener.bind_address),
        });
    }

    if config.upstream.address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError {
            field: "upstream.address",
            message: format!("not a valid socket address: {}", config.upstream.address),
        });
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError {
            field: "timeouts.request_secs",
            message: "must be greater than zero".to_string(),
        });
    }

    if config.rate_limit.refill_rate_per_second < 0.0
        || !config.rate_limit.refill_rate_per_second.is_finite()
    {
        errors.push(ValidationError {
            field: "rate_limit.refill_rate_per_second",
            message: "must be finite and non-negative".to_string(),
        });
    }

    if config.rate_limit.enabled
        && config.rate_limit.capacity == 0
        && config.rate_limit.on_unresolved == crate::config::schema::UnresolvedKeyPolicy::Fallback
    {
        // capacity=0 is legal (always-reject bucket) but almost certainly a
        // typo when limiting is enabled for all traffic.
        errors.push(ValidationError {
            field: "rate_limit.capacity",
            message: "capacity 0 rejects every request".to_string(),
        });
    }

    if config.rate_limit.idle_eviction_secs == 0 {
        errors.push(ValidationError {
            field: "rate_limit.idle_eviction_secs",
            message: "must be greater than zero".to_string(),
        });
    }

    for proxy in &config.rate_limit.trusted_proxies {
        if proxy.parse::<std::net::IpAddr>().is_err() {
            errors.push(ValidationError {
                field: "rate_limit.trusted_proxies",
                message: format!("not a valid IP address: {}", proxy),
            });
        }
    }

    if config.auth.enabled && config.auth.hs256_secret == "CHANGE_ME_IN_PRODUCTION" {
        errors.push(ValidationError {
            field: "auth.hs256_secret",
            message: "placeholder secret must be changed when auth is enabled".to_string(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
