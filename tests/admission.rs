//! End-to-end admission tests for the gateway.

use std::net::SocketAddr;
use std::time::Duration;

use auth_gateway::config::GatewayConfig;
use auth_gateway::http::GatewayServer;
use auth_gateway::lifecycle::Shutdown;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::Serialize;

mod common;

#[derive(Serialize)]
struct TestClaims {
    sub: String,
    exp: u64,
}

fn mint_token(secret: &str, sub: &str) -> String {
    encode(
        &Header::default(),
        &TestClaims {
            sub: sub.to_string(),
            exp: 4_102_444_800, // 2100-01-01
        },
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

fn base_config(proxy_addr: SocketAddr, upstream_addr: SocketAddr) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = proxy_addr.to_string();
    config.upstream.address = upstream_addr.to_string();
    config.observability.metrics_enabled = false;
    config
}

async fn spawn_gateway(config: GatewayConfig, proxy_addr: SocketAddr) -> Shutdown {
    let shutdown = Shutdown::new();
    let server = GatewayServer::new(config);
    let listener = tokio::net::TcpListener::bind(proxy_addr).await.unwrap();
    let server_shutdown = shutdown.clone();

    tokio::spawn(async move {
        let _ = server.run(listener, &server_shutdown).await;
    });

    tokio::time::sleep(Duration::from_millis(300)).await;
    shutdown
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_burst_then_rate_limited() {
    let upstream_addr: SocketAddr = "127.0.0.1:28481".parse().unwrap();
    let proxy_addr: SocketAddr = "127.0.0.1:28482".parse().unwrap();

    common::start_mock_upstream(upstream_addr, "ok").await;

    let mut config = base_config(proxy_addr, upstream_addr);
    config.rate_limit.enabled = true;
    config.rate_limit.capacity = 3;
    // Slow refill so the burst test is not raced by replenishment.
    config.rate_limit.refill_rate_per_second = 0.1;

    let shutdown = spawn_gateway(config, proxy_addr).await;
    let client = client();
    let url = format!("http://{}", proxy_addr);

    for i in 0..3 {
        let res = client.get(&url).send().await.expect("gateway unreachable");
        assert_eq!(res.status(), 200, "request {} within burst should pass", i);
    }

    let res = client.get(&url).send().await.unwrap();
    assert_eq!(res.status(), 429, "burst exhausted, should be rejected");
    let retry_after = res
        .headers()
        .get("retry-after")
        .expect("rejection should carry retry-after");
    assert!(retry_after.to_str().unwrap().parse::<f64>().unwrap() > 0.0);

    shutdown.trigger();
}

#[tokio::test]
async fn test_rate_limit_disabled_passes_all() {
    let upstream_addr: SocketAddr = "127.0.0.1:28483".parse().unwrap();
    let proxy_addr: SocketAddr = "127.0.0.1:28484".parse().unwrap();

    common::start_mock_upstream(upstream_addr, "ok").await;

    let mut config = base_config(proxy_addr, upstream_addr);
    config.rate_limit.enabled = false;

    let shutdown = spawn_gateway(config, proxy_addr).await;
    let client = client();
    let url = format!("http://{}", proxy_addr);

    for _ in 0..20 {
        let res = client.get(&url).send().await.unwrap();
        assert_eq!(res.status(), 200);
    }

    shutdown.trigger();
}

#[tokio::test]
async fn test_security_headers_injected_on_upstream_hop() {
    let upstream_addr: SocketAddr = "127.0.0.1:28485".parse().unwrap();
    let proxy_addr: SocketAddr = "127.0.0.1:28486".parse().unwrap();

    let heads = common::start_recording_upstream(upstream_addr).await;

    let config = base_config(proxy_addr, upstream_addr);
    let shutdown = spawn_gateway(config, proxy_addr).await;

    let res = client()
        .get(format!("http://{}/some/path", proxy_addr))
        .header("Authorization", "Bearer should-not-leak")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    tokio::time::sleep(Duration::from_millis(100)).await;
    let heads = heads.lock().unwrap();
    let head = heads.first().expect("upstream saw no request").to_lowercase();

    assert!(head.contains("x-ca-reqid:"), "missing x-ca-reqid: {}", head);
    assert!(head.contains("x-ca-reqtime:"), "missing x-ca-reqtime: {}", head);
    assert!(head.contains("x-ca-encrypt: 0"), "missing x-ca-encrypt: {}", head);
    assert!(
        !head.contains("authorization:"),
        "bearer token must not reach the upstream: {}",
        head
    );

    shutdown.trigger();
}

#[tokio::test]
async fn test_auth_required_and_context_cleared() {
    let upstream_addr: SocketAddr = "127.0.0.1:28487".parse().unwrap();
    let proxy_addr: SocketAddr = "127.0.0.1:28488".parse().unwrap();
    let secret = "integration-test-secret";

    common::start_mock_upstream(upstream_addr, "ok").await;

    let mut config = base_config(proxy_addr, upstream_addr);
    config.auth.enabled = true;
    config.auth.hs256_secret = secret.to_string();

    let shutdown = Shutdown::new();
    let server = GatewayServer::new(config);
    let store = server.context_store();
    let listener = tokio::net::TcpListener::bind(proxy_addr).await.unwrap();
    let server_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let _ = server.run(listener, &server_shutdown).await;
    });
    tokio::time::sleep(Duration::from_millis(300)).await;

    let client = client();
    let url = format!("http://{}", proxy_addr);

    // No token: rejected before the upstream is consulted.
    let res = client.get(&url).send().await.unwrap();
    assert_eq!(res.status(), 401);

    // Forged token: rejected.
    let forged = mint_token("wrong-secret", "mallory");
    let res = client
        .get(&url)
        .header("Authorization", format!("Bearer {}", forged))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 401);

    // Valid token: admitted and forwarded.
    let token = mint_token(secret, "alice");
    let res = client
        .get(&url)
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    // Every request has completed; a populated store here is a context leak.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(store.is_empty(), "context store leaked entries");

    shutdown.trigger();
}

#[tokio::test]
async fn test_upstream_errors_surface() {
    let upstream_addr: SocketAddr = "127.0.0.1:28491".parse().unwrap();
    let proxy_addr: SocketAddr = "127.0.0.1:28492".parse().unwrap();

    // Upstream status codes pass through untouched.
    common::start_programmable_upstream(upstream_addr, || async {
        (503, "unavailable".to_string())
    })
    .await;

    let config = base_config(proxy_addr, upstream_addr);
    let shutdown = spawn_gateway(config, proxy_addr).await;
    let client = client();

    let res = client
        .get(format!("http://{}", proxy_addr))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 503);

    shutdown.trigger();

    // A dead upstream maps to 502 from the gateway itself.
    let proxy_addr2: SocketAddr = "127.0.0.1:28493".parse().unwrap();
    let dead_upstream: SocketAddr = "127.0.0.1:28494".parse().unwrap();
    let config = base_config(proxy_addr2, dead_upstream);
    let shutdown = spawn_gateway(config, proxy_addr2).await;

    let res = client
        .get(format!("http://{}", proxy_addr2))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 502);

    shutdown.trigger();
}

#[tokio::test]
async fn test_max_connections_queues_excess_requests() {
    let upstream_addr: SocketAddr = "127.0.0.1:28495".parse().unwrap();
    let proxy_addr: SocketAddr = "127.0.0.1:28496".parse().unwrap();

    common::start_programmable_upstream(upstream_addr, || async {
        tokio::time::sleep(Duration::from_millis(200)).await;
        (200, "slow".to_string())
    })
    .await;

    let mut config = base_config(proxy_addr, upstream_addr);
    config.listener.max_connections = 2;
    config.rate_limit.enabled = false;

    let shutdown = spawn_gateway(config, proxy_addr).await;
    let client = client();
    let url = format!("http://{}", proxy_addr);

    // Four concurrent requests against a cap of 2 over a ~200ms upstream:
    // at least two waves, so wall time reflects the queueing.
    let started = std::time::Instant::now();
    let mut tasks = Vec::new();
    for _ in 0..4 {
        let client = client.clone();
        let url = url.clone();
        tasks.push(tokio::spawn(async move { client.get(&url).send().await }));
    }
    for task in tasks {
        let res = task.await.unwrap().expect("queued request must not fail");
        assert_eq!(res.status(), 200, "capped requests queue, never drop");
    }
    let elapsed = started.elapsed();
    assert!(
        elapsed >= Duration::from_millis(350),
        "4 requests through a cap of 2 finished too fast ({:?}) to have queued",
        elapsed
    );

    shutdown.trigger();
}

#[tokio::test]
async fn test_connect_timeout_bounds_dead_upstream() {
    // Non-routable address: connects hang until the connector's timeout.
    let dead_upstream: SocketAddr = "10.255.255.1:28497".parse().unwrap();
    let proxy_addr: SocketAddr = "127.0.0.1:28498".parse().unwrap();

    let mut config = base_config(proxy_addr, dead_upstream);
    config.timeouts.connect_secs = 1;

    let shutdown = spawn_gateway(config, proxy_addr).await;

    let started = std::time::Instant::now();
    let res = client()
        .get(format!("http://{}", proxy_addr))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 502);
    assert!(
        started.elapsed() < Duration::from_secs(5),
        "connect timeout did not bound the upstream attempt ({:?})",
        started.elapsed()
    );

    shutdown.trigger();
}

#[tokio::test]
async fn test_per_client_isolation() {
    // Two clients behind different forwarded addresses share one peer IP;
    // with the default trust policy both map to the same bucket, so the
    // limiter treats them as one client. Sanity-check the aggregate bound.
    let upstream_addr: SocketAddr = "127.0.0.1:28489".parse().unwrap();
    let proxy_addr: SocketAddr = "127.0.0.1:28490".parse().unwrap();

    common::start_mock_upstream(upstream_addr, "ok").await;

    let mut config = base_config(proxy_addr, upstream_addr);
    config.rate_limit.enabled = true;
    config.rate_limit.capacity = 5;
    config.rate_limit.refill_rate_per_second = 0.1;

    let shutdown = spawn_gateway(config, proxy_addr).await;
    let client = client();
    let url = format!("http://{}", proxy_addr);

    let mut allowed = 0;
    for spoofed in ["10.1.1.1", "10.2.2.2"] {
        for _ in 0..5 {
            let res = client
                .get(&url)
                .header("X-Forwarded-For", spoofed)
                .send()
                .await
                .unwrap();
            if res.status() == 200 {
                allowed += 1;
            }
        }
    }

    assert_eq!(allowed, 5, "spoofed forwarded headers must not split buckets");

    shutdown.trigger();
}
