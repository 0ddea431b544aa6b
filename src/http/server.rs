//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the admission middleware chain
//! - Wire up middleware (tracing, timeout, request id, auth, rate limit)
//! - Forward admitted requests to the configured upstream
//! - Inject the x-ca-* security header set on the upstream hop
//! - Observability (metrics, request ids)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    extract::State,
    http::{header, uri::{Authority, Scheme}, Request, StatusCode, Uri},
    middleware,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::str::FromStr;
use tokio::net::TcpListener;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::auth::{HmacJwtVerifier, StaticPermissions};
use crate::config::schema::UpstreamConfig;
use crate::config::GatewayConfig;
use crate::context::{ContextStore, RequestId};
use crate::http::middleware::{auth_middleware, AuthState};
use crate::http::request::request_id_middleware;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::security::key_resolver::{KeyResolver, TrustPolicy};
use crate::security::rate_limit::{rate_limit_middleware, RateLimiter, RateLimiterState};
use crate::security::SecurityHeaderSet;

/// Application state injected into the forward handler.
#[derive(Clone)]
pub struct AppState {
    pub client: Client<HttpConnector, Body>,
    pub store: Arc<ContextStore>,
    pub upstream: UpstreamConfig,
}

/// HTTP server for the gateway.
pub struct GatewayServer {
    router: Router,
    config: GatewayConfig,
    limiter: Arc<RateLimiter>,
    store: Arc<ContextStore>,
}

impl GatewayServer {
    /// Create a new gateway server with the given configuration.
    pub fn new(config: GatewayConfig) -> Self {
        // Initialize subsystems
        let store = Arc::new(ContextStore::new());
        let limiter = Arc::new(RateLimiter::from_config(&config.rate_limit));

        let trusted: Vec<std::net::IpAddr> = config
            .rate_limit
            .trusted_proxies
            .iter()
            .filter_map(|p| p.parse().ok())
            .collect();
        let resolver = if trusted.is_empty() {
            KeyResolver::new(TrustPolicy::Never)
        } else {
            KeyResolver::new(TrustPolicy::TrustedProxies(trusted))
        };

        let rate_state = Arc::new(RateLimiterState {
            limiter: Arc::clone(&limiter),
            resolver,
            enabled: config.rate_limit.enabled,
            per_subject: config.rate_limit.per_subject,
            on_unresolved: config.rate_limit.on_unresolved,
        });

        let auth_state = AuthState {
            verifier: Arc::new(HmacJwtVerifier::new(&config.auth.hs256_secret)),
            permissions: Arc::new(StaticPermissions::new(config.auth.permissions.clone())),
            store: Arc::clone(&store),
            enabled: config.auth.enabled,
        };

        // Initialize HTTP Client
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(config.timeouts.connect_secs)));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        let app_state = AppState {
            client,
            store: Arc::clone(&store),
            upstream: config.upstream.clone(),
        };

        let router = Self::build_router(&config, app_state, rate_state, auth_state);
        Self {
            router,
            config,
            limiter,
            store,
        }
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// Layers run outermost-last: trace → timeout → request id → auth →
    /// rate limit → forward handler. Auth precedes rate limiting so that
    /// per-subject keying can see the verified principal.
    fn build_router(
        config: &GatewayConfig,
        state: AppState,
        rate_state: Arc<RateLimiterState>,
        auth_state: AuthState,
    ) -> Router {
        Router::new()
            .route("/{*path}", any(forward_handler))
            .route("/", any(forward_handler))
            .with_state(state)
            .layer(middleware::from_fn_with_state(rate_state, rate_limit_middleware))
            .layer(middleware::from_fn_with_state(auth_state, auth_middleware))
            .layer(middleware::from_fn(request_id_middleware))
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.timeouts.request_secs,
            )))
            .layer(TraceLayer::new_for_http())
            // Outermost: cap in-flight requests; excess callers queue for a
            // permit instead of being dropped.
            .layer(GlobalConcurrencyLimitLayer::new(
                config.listener.max_connections,
            ))
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener, shutdown: &Shutdown) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstream = %self.config.upstream.address,
            "Gateway server starting"
        );

        // Bound rate-limiter memory: reclaim idle buckets in the background.
        if self.config.rate_limit.enabled {
            Arc::clone(&self.limiter).spawn_eviction(shutdown.subscribe());
        }

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        let mut shutdown_rx = shutdown.subscribe();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        tracing::info!("Gateway server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Handle to the context store (leak checks in tests).
    pub fn context_store(&self) -> Arc<ContextStore> {
        Arc::clone(&self.store)
    }
}

/// Main forward handler.
/// Injects the security header set and relays the request to the upstream.
async fn forward_handler(
    State(state): State<AppState>,
    request: Request<Body>,
) -> impl IntoResponse {
    let start_time = Instant::now();
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .copied()
        .unwrap_or_default();
    let method_str = request.method().to_string();
    let path = request.uri().path().to_string();

    tracing::debug!(
        request_id = %request_id,
        method = %method_str,
        path = %path,
        "Forwarding request"
    );

    let (mut parts, body) = request.into_parts();

    // Security header set for the upstream hop.
    let request_time = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let security_headers = SecurityHeaderSet {
        encrypt: Some(if state.upstream.encrypted { "1" } else { "0" }.to_string()),
        request_id: Some(request_id.to_string()),
        request_time: Some(request_time.to_string()),
    };
    security_headers.apply(&mut parts.headers);

    // The bearer token was consumed at admission; the upstream trusts the
    // x-ca-* set instead.
    parts.headers.remove(header::AUTHORIZATION);

    // URI rewrite toward the upstream.
    let mut uri_parts = parts.uri.clone().into_parts();
    uri_parts.scheme = Some(Scheme::HTTP);
    if let Ok(authority) = Authority::from_str(&state.upstream.address) {
        uri_parts.authority = Some(authority);
    }
    let uri = Uri::from_parts(uri_parts).unwrap_or_else(|_| parts.uri.clone());

    let mut req = Request::builder().method(parts.method.clone()).uri(uri);
    if let Some(headers) = req.headers_mut() {
        *headers = parts.headers.clone();
    }
    let req = match req.body(body) {
        Ok(req) => req,
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Failed to build upstream request");
            metrics::record_request(&method_str, 500, start_time);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to build upstream request")
                .into_response();
        }
    };

    match state.client.request(req).await {
        Ok(response) => {
            let status = response.status();
            metrics::record_request(&method_str, status.as_u16(), start_time);
            let (parts, body) = response.into_parts();
            Response::from_parts(parts, Body::new(body)).into_response()
        }
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Upstream error");
            metrics::record_request(&method_str, 502, start_time);
            (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
        }
    }
}
