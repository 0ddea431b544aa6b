//! Token-bucket admission control keyed by partition key.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use std::net::SocketAddr;

use crate::auth::Principal;
use crate::config::{RateLimitConfig, UnresolvedKeyPolicy};
use crate::error::UnsatisfiableRequestError;
use crate::observability::metrics;
use crate::security::key_resolver::{KeyResolver, RateKey, UNKNOWN_KEY};

/// Outcome of an admission check. Rejection is a value, not a fault.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    Allowed,
    Rejected {
        /// Time until the bucket will hold enough tokens for the same cost.
        /// None when the bucket never refills.
        retry_after: Option<Duration>,
    },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }
}

/// A single token bucket.
///
/// Refill is computed lazily on access; the bucket holds no timer. Tokens
/// stay within [0, capacity]: refill caps at capacity, debit only happens
/// when enough tokens are present.
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
        }
    }

    fn try_acquire(&mut self, cost: f64, capacity: f64, refill_rate: f64, now: Instant) -> Decision {
        // Clamped to zero so a non-monotonic clock never drains tokens.
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_refill = now;

        if self.tokens >= cost {
            self.tokens -= cost;
            Decision::Allowed
        } else {
            let retry_after = if refill_rate > 0.0 {
                Some(Duration::from_secs_f64((cost - self.tokens) / refill_rate))
            } else {
                None
            };
            Decision::Rejected { retry_after }
        }
    }
}

/// Token-bucket rate limiter with one bucket per partition key.
///
/// Explicitly owned and injected: constructed once per process, shared via
/// `Arc`, so tests run against fresh state. Per-key state sits behind its
/// own mutex; unrelated keys never serialize against each other.
pub struct RateLimiter {
    buckets: DashMap<RateKey, Arc<Mutex<TokenBucket>>>,
    capacity: f64,
    refill_rate: f64,
    idle_window: Duration,
}

impl RateLimiter {
    pub fn new(capacity: u32, refill_rate_per_second: f64, idle_window: Duration) -> Self {
        Self {
            buckets: DashMap::new(),
            capacity: capacity as f64,
            refill_rate: refill_rate_per_second,
            idle_window,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(
            config.capacity,
            config.refill_rate_per_second,
            Duration::from_secs(config.idle_eviction_secs),
        )
    }

    /// Admit or reject one acquisition of `cost` tokens for `key`.
    pub fn try_acquire(&self, key: &str, cost: f64) -> Result<Decision, UnsatisfiableRequestError> {
        self.try_acquire_at(key, cost, Instant::now())
    }

    /// Same as [`try_acquire`](Self::try_acquire) with an explicit clock
    /// reading, for deterministic tests.
    pub fn try_acquire_at(
        &self,
        key: &str,
        cost: f64,
        now: Instant,
    ) -> Result<Decision, UnsatisfiableRequestError> {
        if cost > self.capacity {
            // Can never succeed no matter how long the caller waits.
            return Err(UnsatisfiableRequestError {
                cost,
                capacity: self.capacity,
            });
        }

        let bucket = {
            let entry = self
                .buckets
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(TokenBucket::new(self.capacity, now))));
            Arc::clone(entry.value())
        };
        // Map shard reference released above; only the per-key mutex is held
        // for the read-modify-write.
        let mut bucket = bucket.lock().expect("rate limiter bucket mutex poisoned");
        Ok(bucket.try_acquire(cost, self.capacity, self.refill_rate, now))
    }

    /// Drop buckets idle past the configured window.
    ///
    /// A bucket whose lock cannot be taken immediately is in use and is
    /// skipped; the lock is held only for the single check.
    pub fn evict_idle(&self) {
        self.evict_idle_at(Instant::now());
    }

    pub fn evict_idle_at(&self, now: Instant) {
        let window = self.idle_window;
        self.buckets.retain(|_, bucket| match bucket.try_lock() {
            Ok(bucket) => now.saturating_duration_since(bucket.last_refill) < window,
            Err(_) => true,
        });
    }

    /// Number of live buckets (memory bound observability).
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Run eviction on a background cadence until shutdown.
    pub fn spawn_eviction(
        self: Arc<Self>,
        mut shutdown: tokio::sync::broadcast::Receiver<()>,
    ) -> tokio::task::JoinHandle<()> {
        let period = self.idle_window;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let before = self.bucket_count();
                        self.evict_idle();
                        let evicted = before.saturating_sub(self.bucket_count());
                        metrics::record_bucket_count(self.bucket_count());
                        if evicted > 0 {
                            tracing::debug!(evicted, remaining = self.bucket_count(), "Evicted idle rate-limit buckets");
                        }
                    }
                    _ = shutdown.recv() => break,
                }
            }
        })
    }
}

/// State for the rate limiting middleware.
pub struct RateLimiterState {
    pub limiter: Arc<RateLimiter>,
    pub resolver: KeyResolver,
    pub enabled: bool,
    pub per_subject: bool,
    pub on_unresolved: UnresolvedKeyPolicy,
}

impl RateLimiterState {
    /// Derive the partition key for this request, or the policy outcome
    /// when no key can be determined.
    fn key_for(&self, request: &Request<Body>) -> Result<RateKey, StatusCode> {
        if self.per_subject {
            if let Some(principal) = request.extensions().get::<Principal>() {
                return Ok(self.resolver.resolve_subject(&principal.subject));
            }
        }

        let peer = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0);
        match self.resolver.resolve(peer, request.headers()) {
            Ok(key) => Ok(key),
            Err(e) => match self.on_unresolved {
                UnresolvedKeyPolicy::Fallback => {
                    tracing::debug!(error = %e, "Key resolution failed, using fallback bucket");
                    Ok(UNKNOWN_KEY.to_string())
                }
                UnresolvedKeyPolicy::Reject => {
                    tracing::warn!(error = %e, "Key resolution failed, rejecting");
                    Err(StatusCode::BAD_REQUEST)
                }
            },
        }
    }
}

/// Middleware function for per-key rate limiting.
pub async fn rate_limit_middleware(
    State(state): State<Arc<RateLimiterState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !state.enabled {
        return next.run(request).await;
    }

    let key = match state.key_for(&request) {
        Ok(key) => key,
        Err(status) => {
            let mut response = Response::new(Body::from("Unable to attribute request"));
            *response.status_mut() = status;
            return response;
        }
    };

    match state.limiter.try_acquire(&key, 1.0) {
        Ok(Decision::Allowed) => next.run(request).await,
        Ok(Decision::Rejected { retry_after }) => {
            tracing::warn!(client = %key, "Rate limit exceeded");
            metrics::record_rate_limited("rps_limit");
            let mut response = Response::new(Body::from("Rate limit exceeded"));
            *response.status_mut() = StatusCode::TOO_MANY_REQUESTS;
            if let Some(retry_after) = retry_after {
                if let Ok(value) =
                    axum::http::HeaderValue::from_str(&retry_after.as_secs_f64().ceil().to_string())
                {
                    response.headers_mut().insert("retry-after", value);
                }
            }
            response
        }
        Err(e) => {
            // cost=1 exceeding capacity: the bucket can never admit anything.
            tracing::warn!(client = %key, error = %e, "Unsatisfiable admission request");
            metrics::record_rate_limited("unsatisfiable");
            let mut response = Response::new(Body::from("Rate limit exceeded"));
            *response.status_mut() = StatusCode::TOO_MANY_REQUESTS;
            response
        }
    }
}
