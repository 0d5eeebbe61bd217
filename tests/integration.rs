//! Integration tests for the tspgate router.
//!
//! Requests are driven through the full middleware stack with
//! `tower::ServiceExt::oneshot` against the in-memory shared cache, so no
//! Redis instance is needed.

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use tspgate::{
    auth::{middleware::AppState, replay::now_millis},
    config::{CacheBackend, Config, FailurePolicy},
    models::LoginSession,
    routes,
    storage::{CacheError, InMemoryCache, LocalSessionStore, SharedCache},
};

const PEER: &str = "10.0.0.1:5555";

fn test_config(production: bool, policy: FailurePolicy) -> Config {
    Config {
        cache_backend: CacheBackend::Memory,
        redis_url: None,
        cache_timeout_ms: 500,
        cache_failure_policy: policy,
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        production,
        timespan_gap_secs: 60,
        token_cookie: "jwt-did".to_string(),
        local_session_cookie: "sid".to_string(),
        local_session_ttl_secs: 3600,
        sweep_interval_secs: 60,
        real_ip_header: "x-real-ip".to_string(),
        login_path: "/login".to_string(),
        activity_login_path: "/activity/login".to_string(),
        activity_marker: "/activity".to_string(),
        origin_referer: "http://zhib.net/login".to_string(),
    }
}

struct TestApp {
    router: Router,
    cache: Arc<InMemoryCache>,
    local_sessions: Arc<LocalSessionStore>,
}

fn spawn_app(production: bool) -> TestApp {
    let cache = Arc::new(InMemoryCache::new());
    let local_sessions = Arc::new(LocalSessionStore::new(Duration::from_secs(3600)));
    let state = AppState {
        cache: cache.clone(),
        local_sessions: local_sessions.clone(),
        config: Arc::new(test_config(production, FailurePolicy::Closed)),
    };
    TestApp {
        router: routes::api_router(state),
        cache,
        local_sessions,
    }
}

/// A shared cache that never answers.
struct DownCache;

#[async_trait]
impl SharedCache for DownCache {
    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Err(CacheError::Timeout(500))
    }

    async fn set(&self, _key: &str, _value: &str, _ttl_secs: u64) -> Result<(), CacheError> {
        Err(CacheError::Timeout(500))
    }

    async fn set_if_absent(
        &self,
        _key: &str,
        _value: &str,
        _ttl_secs: u64,
    ) -> Result<bool, CacheError> {
        Err(CacheError::Timeout(500))
    }
}

fn spawn_degraded_app(policy: FailurePolicy) -> (Router, Arc<LocalSessionStore>) {
    let local_sessions = Arc::new(LocalSessionStore::new(Duration::from_secs(3600)));
    let state = AppState {
        cache: Arc::new(DownCache),
        local_sessions: local_sessions.clone(),
        config: Arc::new(test_config(false, policy)),
    };
    (routes::api_router(state), local_sessions)
}

fn get(uri: &str) -> axum::http::request::Builder {
    Request::builder()
        .method("GET")
        .uri(uri)
        .extension(ConnectInfo(PEER.parse::<SocketAddr>().unwrap()))
}

fn post(uri: &str) -> axum::http::request::Builder {
    Request::builder()
        .method("POST")
        .uri(uri)
        .extension(ConnectInfo(PEER.parse::<SocketAddr>().unwrap()))
}

/// A fresh `tsp` value; `offset` keeps timestamps distinct within one test.
fn fresh_tsp(offset: i64) -> i64 {
    now_millis() + offset
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, headers, body.to_vec())
}

fn json(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap()
}

fn location(headers: &axum::http::HeaderMap) -> &str {
    headers.get(header::LOCATION).unwrap().to_str().unwrap()
}

/// Extract the `sid` value from a Set-Cookie header.
fn issued_sid(headers: &axum::http::HeaderMap) -> Option<String> {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|v| v.strip_prefix("sid="))
        .map(|rest| rest.split(';').next().unwrap_or_default().to_string())
}

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
async fn test_health_is_unguarded() {
    let app = spawn_app(true);
    let (status, _, body) = send(&app.router, get("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["status"], "ok");
}

#[tokio::test]
async fn test_health_reports_unreachable_cache() {
    let (router, _) = spawn_degraded_app(FailurePolicy::Open);
    let (status, _, body) = send(&router, get("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json(&body)["error"], "Internal server error");
}

// ============================================================================
// Session resolution
// ============================================================================

#[tokio::test]
async fn test_anonymous_request_passes_resolver() {
    let app = spawn_app(false);
    let uri = format!("/api/session?tsp={}", fresh_tsp(0));

    let (status, headers, body) = send(&app.router, get(&uri).body(Body::empty()).unwrap()).await;

    assert_eq!(status, StatusCode::OK);
    assert!(headers.get(header::SET_COOKIE).is_none());
    let body = json(&body);
    assert_eq!(body["authenticated"], false);
    assert_eq!(body["source"], "none");
    assert!(body["payload"].is_null());
}

#[tokio::test]
async fn test_unknown_token_redirects_to_login() {
    let app = spawn_app(false);
    let uri = format!("/api/session?tsp={}", fresh_tsp(0));

    let (status, headers, _) = send(
        &app.router,
        get(&uri)
            .header(header::COOKIE, "jwt-did=never-issued")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::FOUND);
    assert_eq!(location(&headers), "/login");
}

#[tokio::test]
async fn test_unknown_token_on_activity_route_redirects_to_activity_login() {
    let app = spawn_app(false);
    let uri = format!("/activity/action?tsp={}", fresh_tsp(0));

    let (status, headers, _) = send(
        &app.router,
        post(&uri)
            .header(header::COOKIE, "jwt-did=never-issued")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::FOUND);
    assert_eq!(location(&headers), "/activity/login");
}

#[tokio::test]
async fn test_redirect_does_not_consume_timestamp() {
    let app = spawn_app(false);
    let uri = format!("/api/session?tsp={}", fresh_tsp(0));

    let (status, _, _) = send(
        &app.router,
        get(&uri)
            .header(header::COOKIE, "jwt-did=never-issued")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::FOUND);
    assert!(app.cache.is_empty().await);
}

#[tokio::test]
async fn test_shared_session_hydrates_then_serves_locally() {
    let app = spawn_app(false);
    app.cache
        .set("tok-1", r#"{"user":"ada"}"#, 600)
        .await
        .unwrap();

    // First request: shared record only, so the local store is hydrated
    let uri = format!("/api/session?tsp={}", fresh_tsp(0));
    let (status, headers, body) = send(
        &app.router,
        get(&uri)
            .header(header::COOKIE, "jwt-did=tok-1")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let body = json(&body);
    assert_eq!(body["authenticated"], true);
    assert_eq!(body["source"], "shared");
    assert_eq!(body["payload"], r#"{"user":"ada"}"#);

    let cookie = headers
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Lax"));
    assert!(!cookie.contains("Secure"));
    let sid = issued_sid(&headers).unwrap();
    assert_eq!(app.local_sessions.len().await, 1);

    // Second request: local session confirmed by the shared record
    let uri = format!("/api/session?tsp={}", fresh_tsp(1));
    let (status, headers, body) = send(
        &app.router,
        get(&uri)
            .header(header::COOKIE, format!("jwt-did=tok-1; sid={}", sid))
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(headers.get(header::SET_COOKIE).is_none());
    assert_eq!(json(&body)["source"], "local");
}

#[tokio::test]
async fn test_hydration_cookie_is_secure_in_production() {
    let app = spawn_app(true);
    app.cache.set("tok-1", "payload", 600).await.unwrap();

    let uri = format!("/api/session?tsp={}", fresh_tsp(0));
    let (status, headers, _) = send(
        &app.router,
        get(&uri)
            .header(header::COOKIE, "jwt-did=tok-1")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let cookie = headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
    assert!(cookie.contains("Secure"));
}

#[tokio::test]
async fn test_stale_local_session_redirects_and_is_dropped() {
    let app = spawn_app(false);
    app.local_sessions
        .put("sid-1", LoginSession::from_shared("tok-1", "payload".to_string()))
        .await;

    let uri = format!("/api/profile?tsp={}", fresh_tsp(0));
    let (status, headers, _) = send(
        &app.router,
        get(&uri)
            .header(header::COOKIE, "jwt-did=tok-1; sid=sid-1")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::FOUND);
    assert_eq!(location(&headers), "/login");
    assert!(app.local_sessions.is_empty().await);
}

#[tokio::test]
async fn test_missing_token_clears_local_session() {
    let app = spawn_app(false);
    app.local_sessions
        .put("sid-1", LoginSession::from_shared("tok-1", "payload".to_string()))
        .await;

    let uri = format!("/api/session?tsp={}", fresh_tsp(0));
    let (status, _, body) = send(
        &app.router,
        get(&uri)
            .header(header::COOKIE, "sid=sid-1")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["authenticated"], false);
    assert!(app.local_sessions.get("sid-1").await.is_none());
}

// ============================================================================
// Client address
// ============================================================================

#[tokio::test]
async fn test_client_ip_prefers_proxy_header() {
    let app = spawn_app(false);
    let uri = format!("/api/session?tsp={}", fresh_tsp(0));

    let (status, _, body) = send(
        &app.router,
        get(&uri)
            .header("x-real-ip", "203.0.113.7")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["client_ip"], "203.0.113.7");
}

#[tokio::test]
async fn test_client_ip_falls_back_to_peer() {
    let app = spawn_app(false);
    let uri = format!("/api/session?tsp={}", fresh_tsp(0));

    let (_, _, body) = send(&app.router, get(&uri).body(Body::empty()).unwrap()).await;
    assert_eq!(json(&body)["client_ip"], "10.0.0.1");
}

// ============================================================================
// Access guard
// ============================================================================

#[tokio::test]
async fn test_profile_requires_identity() {
    let app = spawn_app(false);
    let uri = format!("/api/profile?tsp={}", fresh_tsp(0));

    let (status, headers, _) = send(&app.router, get(&uri).body(Body::empty()).unwrap()).await;

    assert_eq!(status, StatusCode::FOUND);
    assert_eq!(location(&headers), "/login");
}

#[tokio::test]
async fn test_profile_with_identity() {
    let app = spawn_app(false);
    app.cache.set("tok-1", "payload", 600).await.unwrap();

    let uri = format!("/api/profile?tsp={}", fresh_tsp(0));
    let (status, _, body) = send(
        &app.router,
        get(&uri)
            .header(header::COOKIE, "jwt-did=tok-1")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["payload"], "payload");
}

// ============================================================================
// Replay guard
// ============================================================================

#[tokio::test]
async fn test_missing_or_malformed_timestamp_is_forbidden() {
    let app = spawn_app(false);

    for uri in [
        "/api/session".to_string(),
        "/api/session?tsp=".to_string(),
        "/api/session?tsp=123".to_string(),
        "/api/session?tsp=12345678901234".to_string(),
        "/api/session?tsp=17000000000ab".to_string(),
        "/api/session?tsp=-170000000000".to_string(),
    ] {
        let (status, _, body) = send(&app.router, get(&uri).body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "uri: {}", uri);
        assert!(body.is_empty(), "uri: {}", uri);
    }
    assert!(app.cache.is_empty().await);
}

#[tokio::test]
async fn test_stale_timestamp_is_forbidden() {
    let app = spawn_app(false);

    for tsp in [fresh_tsp(-65_000), fresh_tsp(65_000)] {
        let uri = format!("/api/session?tsp={}", tsp);
        let (status, _, _) = send(&app.router, get(&uri).body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "tsp: {}", tsp);
    }
}

#[tokio::test]
async fn test_replayed_request_gets_empty_ack() {
    let app = spawn_app(false);
    let uri = format!("/api/session?tsp={}", fresh_tsp(0));

    let (status, _, body) = send(&app.router, get(&uri).body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!body.is_empty());

    let (status, _, body) = send(&app.router, get(&uri).body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_empty());
}

#[tokio::test]
async fn test_same_timestamp_on_other_target_is_independent() {
    let app = spawn_app(false);
    let tsp = fresh_tsp(0);

    let (_, _, first) = send(
        &app.router,
        get(&format!("/api/session?tsp={}", tsp))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    let (_, _, second) = send(
        &app.router,
        get(&format!("/api/session?tsp={}&page=2", tsp))
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert!(!first.is_empty());
    assert!(!second.is_empty());
}

#[tokio::test]
async fn test_concurrent_replays_admit_exactly_one() {
    let app = spawn_app(false);
    let uri = format!("/api/session?tsp={}", fresh_tsp(0));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let router = app.router.clone();
        let uri = uri.clone();
        handles.push(tokio::spawn(async move {
            send(&router, get(&uri).body(Body::empty()).unwrap()).await
        }));
    }

    let mut admitted = 0;
    for handle in handles {
        let (status, _, body) = handle.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        if !body.is_empty() {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 1);
}

// ============================================================================
// Origin guard
// ============================================================================

#[tokio::test]
async fn test_origin_ignored_outside_production() {
    let app = spawn_app(false);
    let uri = format!("/activity/action?tsp={}", fresh_tsp(0));

    let (status, _, _) = send(&app.router, post(&uri).body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_origin_enforced_in_production() {
    let app = spawn_app(true);

    let uri = format!("/activity/action?tsp={}", fresh_tsp(0));
    let (status, _, body) = send(
        &app.router,
        post(&uri)
            .header(header::REFERER, "http://evil.example/login")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body.is_empty());

    // Rejected before the replay guard, so the same tsp is still usable
    let (status, _, body) = send(
        &app.router,
        post(&uri)
            .header(header::REFERER, "http://zhib.net/login?from=app")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(!body.is_empty());
}

// ============================================================================
// Shared cache unavailable
// ============================================================================

#[tokio::test]
async fn test_unavailable_cache_fails_closed() {
    let (router, local_sessions) = spawn_degraded_app(FailurePolicy::Closed);
    local_sessions
        .put("sid-1", LoginSession::from_shared("tok-1", "payload".to_string()))
        .await;

    let uri = format!("/api/session?tsp={}", fresh_tsp(0));
    let (status, headers, _) = send(
        &router,
        get(&uri)
            .header(header::COOKIE, "jwt-did=tok-1; sid=sid-1")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::FOUND);
    assert_eq!(location(&headers), "/login");

    // Anonymous callers pass the resolver but cannot claim a timestamp
    let (status, _, _) = send(&router, get(&uri).body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_unavailable_cache_fails_open_with_local_session() {
    let (router, local_sessions) = spawn_degraded_app(FailurePolicy::Open);
    local_sessions
        .put("sid-1", LoginSession::from_shared("tok-1", "payload".to_string()))
        .await;

    let uri = format!("/api/profile?tsp={}", fresh_tsp(0));
    let (status, _, body) = send(
        &router,
        get(&uri)
            .header(header::COOKIE, "jwt-did=tok-1; sid=sid-1")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let body = json(&body);
    assert_eq!(body["authenticated"], true);
    assert_eq!(body["source"], "local");

    // Without a local session there is nothing to trust
    let (status, _, _) = send(
        &router,
        get(&uri)
            .header(header::COOKIE, "jwt-did=tok-1")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::FOUND);
}
