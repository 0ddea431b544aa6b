//! Rate-limit partition key derivation.
//!
//! # Responsibilities
//! - Map an inbound request to a stable partition key
//! - Default to the client network address, normalized to textual IP form
//! - Substitute the authenticated subject when per-user limiting is on
//!
//! # Design Decisions
//! - X-Forwarded-For is spoofable by any client; it is honored only when
//!   the direct peer is an explicitly trusted proxy
//! - Same logical client always resolves to the same key

use std::net::{IpAddr, SocketAddr};

use axum::http::HeaderMap;

use crate::error::KeyResolutionError;

/// Rate-limiting partition key. Plain string lookup key, no lifecycle.
pub type RateKey = String;

/// Bucket key used when resolution fails and the fallback policy applies.
pub const UNKNOWN_KEY: &str = "unknown";

/// Whether forwarded-for headers are believed.
#[derive(Debug, Clone, Default)]
pub enum TrustPolicy {
    /// Never trust X-Forwarded-For. The default: any client can forge it.
    #[default]
    Never,

    /// Trust X-Forwarded-For only when the direct peer is one of these
    /// proxies; the key is then the last hop the trusted proxy appended.
    TrustedProxies(Vec<IpAddr>),
}

/// Derives partition keys from request attributes.
#[derive(Debug, Default)]
pub struct KeyResolver {
    policy: TrustPolicy,
}

impl KeyResolver {
    pub fn new(policy: TrustPolicy) -> Self {
        Self { policy }
    }

    /// Resolve the partition key for an unauthenticated request.
    ///
    /// Returns the textual IP of the logical client: the direct peer, or
    /// the forwarded client when the peer is a trusted proxy.
    pub fn resolve(
        &self,
        peer: Option<SocketAddr>,
        headers: &HeaderMap,
    ) -> Result<RateKey, KeyResolutionError> {
        let peer = peer.ok_or(KeyResolutionError::MissingPeerAddress)?;

        if let TrustPolicy::TrustedProxies(proxies) = &self.policy {
            if proxies.contains(&peer.ip()) {
                if let Some(forwarded) = headers.get("x-forwarded-for") {
                    let value = forwarded
                        .to_str()
                        .map_err(|_| KeyResolutionError::MalformedForwardedHeader)?;
                    // The last entry is the hop the trusted proxy itself
                    // appended; earlier entries are client-controlled.
                    let client = value
                        .rsplit(',')
                        .next()
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .ok_or(KeyResolutionError::MalformedForwardedHeader)?;
                    let ip: IpAddr = client
                        .parse()
                        .map_err(|_| KeyResolutionError::MalformedForwardedHeader)?;
                    return Ok(ip.to_string());
                }
            }
        }

        Ok(peer.ip().to_string())
    }

    /// Key for an authenticated request: per-subject rather than per-address.
    /// Prefixed to keep subject keys disjoint from address keys.
    pub fn resolve_subject(&self, subject: &str) -> RateKey {
        format!("subject:{}", subject)
    }
}
