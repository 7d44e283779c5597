//! HTTP-Level Rate Limiting Tests
//!
//! Tests rate limiting behavior through a real HTTP server, verifying
//! that the middleware tracks deliveries per client across calls and
//! returns 429 with `Retry-After` once the window is full.
//!
//! These tests use `spawn_test_server` instead of `oneshot` because
//! rate limiting is stateful middleware keyed on the client address.
//!
//! Run with: `cargo test --test ratelimit_http_test`
//! Redis-backed tests: `cargo test --test ratelimit_http_test -- --ignored`

mod helpers;

use std::sync::Arc;

use aurora_server::config::Config;
use aurora_server::ratelimit::{LimitConfig, RateLimitConfig, RateLimiter};
use aurora_server::reply::MenuRouter;
use helpers::{notification, signed_post, spawn_test_server, TestApp, TestServer};
use reqwest::StatusCode;

fn rl_config(requests: u32) -> RateLimitConfig {
    RateLimitConfig {
        webhook: LimitConfig {
            requests,
            window_secs: 60,
        },
        ..RateLimitConfig::default()
    }
}

async fn serve(limiter: RateLimiter) -> (TestServer, TestApp) {
    let app = TestApp::build(Config::default_for_test(), Arc::new(MenuRouter), Some(limiter));
    let server = spawn_test_server(app.router.clone()).await;
    (server, app)
}

/// POST an empty, signed notification from `client_ip`.
async fn deliver(server: &TestServer, client_ip: &str) -> reqwest::Response {
    let body = notification(vec![]).to_string();
    let signature =
        aurora_server::webhook::signing::sign_payload("test-app-secret", body.as_bytes());

    reqwest::Client::new()
        .post(format!("{}/webhook", server.url))
        .header("Content-Type", "application/json")
        .header("X-Hub-Signature-256", signature)
        .header("X-Forwarded-For", client_ip)
        .body(body)
        .send()
        .await
        .expect("Request failed")
}

#[tokio::test]
async fn test_http_rate_limiting_returns_429() {
    let (server, _app) = serve(RateLimiter::in_memory(rl_config(3))).await;

    for i in 0..3 {
        let resp = deliver(&server, "203.0.113.10").await;
        assert_eq!(resp.status(), StatusCode::OK, "request {i} should be allowed");
    }

    let resp = deliver(&server, "203.0.113.10").await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);

    let retry_after: u64 = resp.headers()["retry-after"]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=60).contains(&retry_after));

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "rate_limited");
    assert_eq!(body["limit"], 3);
}

#[tokio::test]
async fn test_clients_have_separate_windows() {
    let (server, _app) = serve(RateLimiter::in_memory(rl_config(1))).await;

    assert_eq!(deliver(&server, "203.0.113.10").await.status(), StatusCode::OK);
    assert_eq!(
        deliver(&server, "203.0.113.10").await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );
    assert_eq!(deliver(&server, "203.0.113.11").await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_peer_address_used_when_proxy_untrusted() {
    let config = RateLimitConfig {
        trust_proxy: false,
        ..rl_config(1)
    };
    let (server, _app) = serve(RateLimiter::in_memory(config)).await;

    // Forwarded headers are ignored, both requests come from the loopback peer
    assert_eq!(deliver(&server, "203.0.113.10").await.status(), StatusCode::OK);
    assert_eq!(
        deliver(&server, "203.0.113.11").await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );
}

#[tokio::test]
async fn test_limits_requests_without_connect_info() {
    let app = TestApp::build(
        Config::default_for_test(),
        Arc::new(MenuRouter),
        Some(RateLimiter::in_memory(rl_config(1))),
    );
    let body = notification(vec![]).to_string();

    let resp = app
        .oneshot(signed_post("/webhook", "test-app-secret", &body))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .oneshot(signed_post("/webhook", "test-app-secret", &body))
        .await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(resp.headers().contains_key("retry-after"));
}

#[tokio::test]
async fn test_handshake_is_not_rate_limited() {
    let (server, _app) = serve(RateLimiter::in_memory(rl_config(1))).await;
    let client = reqwest::Client::new();

    for _ in 0..3 {
        let resp = client
            .get(format!(
                "{}/webhook?hub.mode=subscribe&hub.verify_token=test-verify-token&hub.challenge=42",
                server.url
            ))
            .header("X-Forwarded-For", "203.0.113.10")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn test_allowlisted_client_bypasses_limit() {
    let mut config = rl_config(1);
    config.allowlist.insert("203.0.113.99".to_string());
    let (server, _app) = serve(RateLimiter::in_memory(config)).await;

    for _ in 0..3 {
        assert_eq!(deliver(&server, "203.0.113.99").await.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn test_health_reports_rate_limiting() {
    let (server, _app) = serve(RateLimiter::in_memory(rl_config(1))).await;

    let body: serde_json::Value = reqwest::get(format!("{}/health", server.url))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["rate_limiting"], true);
}

#[tokio::test]
#[ignore] // Requires Redis
async fn test_http_rate_limiting_with_redis() {
    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".into());
    let redis = aurora_server::db::create_redis_client(&url)
        .await
        .expect("Failed to connect to test Redis");
    let config = RateLimitConfig {
        redis_key_prefix: format!("test:rl:{}", std::process::id()),
        ..rl_config(2)
    };
    let (server, _app) = serve(RateLimiter::redis(redis, config)).await;

    assert_eq!(deliver(&server, "198.51.100.1").await.status(), StatusCode::OK);
    assert_eq!(deliver(&server, "198.51.100.1").await.status(), StatusCode::OK);

    let resp = deliver(&server, "198.51.100.1").await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(resp.headers().contains_key("retry-after"));
}
