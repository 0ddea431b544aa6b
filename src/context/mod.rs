//! Request-scoped authentication context propagation.
//!
//! # Data Flow
//! ```text
//! auth middleware verifies token
//!     → ContextStore.set(request id, AuthContext)
//!     → handlers/filters read via get(request id)
//!     → ContextScope drop removes the entry on every exit path
//! ```
//!
//! # Design Decisions
//! - Storage is keyed by an explicit per-request handle, not by thread:
//!   a request can resume on a different worker after every await point,
//!   so thread-bound storage would leak values between requests
//! - Cleanup is mandatory; ContextScope ties it to Drop so it survives
//!   early returns, errors, and cancellation
//! - DashMap keeps concurrently executing requests isolated without a
//!   global lock

use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use crate::auth::Principal;

/// Opaque verified token. The core stores it; it never parses it.
pub type Token = String;

/// Identity of one in-flight request execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Verified credentials attached to one request.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// The raw verified token, stored opaquely.
    pub token: Token,
    /// Principal decoded by the external verifier.
    pub principal: Principal,
}

/// Concurrent map from request identity to its authentication context.
///
/// Constructed once per process and shared via `Arc`; never a hidden
/// singleton, so tests get fresh state per case.
#[derive(Debug, Default)]
pub struct ContextStore {
    entries: DashMap<RequestId, AuthContext>,
}

impl ContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate `auth` with the given request, replacing any prior value.
    pub fn set(&self, id: RequestId, auth: AuthContext) {
        self.entries.insert(id, auth);
    }

    /// The context for this request, if authentication populated one.
    /// Never observes a value set for a different request id.
    pub fn get(&self, id: RequestId) -> Option<AuthContext> {
        self.entries.get(&id).map(|e| e.value().clone())
    }

    /// Clear the association for this request. Idempotent.
    pub fn remove(&self, id: RequestId) -> Option<AuthContext> {
        self.entries.remove(&id).map(|(_, v)| v)
    }

    /// Number of live entries. A non-zero count after all requests have
    /// completed indicates a missing cleanup path.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bind `id` to this store for the duration of one request.
    /// The returned guard removes the entry when dropped.
    pub fn scope(self: &Arc<Self>, id: RequestId) -> ContextScope {
        ContextScope {
            store: Arc::clone(self),
            id,
        }
    }
}

/// RAII guard guaranteeing context removal on every exit path.
///
/// Held across the downstream call in the auth middleware: normal
/// completion, error responses, panics, and task cancellation all run
/// Drop, so a reused worker never observes a stale token.
pub struct ContextScope {
    store: Arc<ContextStore>,
    id: RequestId,
}

impl ContextScope {
    pub fn id(&self) -> RequestId {
        self.id
    }
}

impl Drop for ContextScope {
    fn drop(&mut self) {
        self.store.remove(self.id);
    }
}
