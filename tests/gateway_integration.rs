//! Exercises [`GatewayState`] end to end against a real (mock) backend tool
//! server bound to an ephemeral port, covering registration/health probing,
//! response caching, and circuit-breaker tripping under sustained failures.

use axum::extract::State;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use orchestrion::config::GatewayConfig;
use orchestrion::gateway::backend::BackendConfig;
use orchestrion::gateway::circuit_breaker::BreakerState;
use orchestrion::gateway::GatewayState;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A minimal stand-in tool server: `/health` always succeeds, `/tools`
/// advertises one `echo` tool, and `/tools/echo` either echoes its input or
/// fails, depending on the shared atomic `should_fail` flag, counting every
/// call it serves so tests can assert on cache behavior.
struct MockBackend {
    call_count: AtomicUsize,
    should_fail: std::sync::atomic::AtomicBool,
}

async fn health_handler() -> &'static str {
    "ok"
}

async fn tools_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!([
        {"name": "echo", "description": "echoes input", "parameters": {}}
    ]))
}

async fn echo_handler(
    State(mock): State<Arc<MockBackend>>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    mock.call_count.fetch_add(1, Ordering::SeqCst);
    if mock.should_fail.load(Ordering::SeqCst) {
        (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response()
    } else {
        Json(serde_json::json!({"echoed": body})).into_response()
    }
}

async fn spawn_mock_backend() -> (String, Arc<MockBackend>) {
    let mock = Arc::new(MockBackend {
        call_count: AtomicUsize::new(0),
        should_fail: std::sync::atomic::AtomicBool::new(false),
    });
    let router = Router::new()
        .route("/health", get(health_handler))
        .route("/tools", get(tools_handler))
        .route("/tools/echo", post(echo_handler))
        .with_state(Arc::clone(&mock));

    let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    (format!("http://{addr}"), mock)
}

fn test_gateway_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.circuit_breaker_threshold = 2;
    config.circuit_breaker_timeout = Duration::from_secs(60);
    config.max_retries = 0;
    config.cache_ttl = Duration::from_secs(300);
    config
}

#[tokio::test]
async fn registering_a_healthy_backend_discovers_its_tools() {
    let (base_url, _mock) = spawn_mock_backend().await;
    let gateway = GatewayState::new(test_gateway_config());
    gateway.register_backend(BackendConfig::new("echo-server", base_url)).await;

    let health = gateway.health().await;
    assert_eq!(health.healthy_servers, 1);

    let tools = gateway.list_tools().await;
    assert_eq!(tools.get("echo-server").unwrap()[0].name, "echo");
}

/// Testable property 9: a second identical call with `use_cache: true` is
/// served from the cache rather than reaching the backend again.
#[tokio::test]
async fn identical_calls_are_served_from_cache_on_the_second_request() {
    let (base_url, mock) = spawn_mock_backend().await;
    let gateway = GatewayState::new(test_gateway_config());
    gateway.register_backend(BackendConfig::new("echo-server", base_url)).await;

    let params = serde_json::json!({"message": "hi"});
    gateway.execute("echo-server", "echo", params.clone(), true).await.unwrap();
    gateway.execute("echo-server", "echo", params.clone(), true).await.unwrap();

    assert_eq!(mock.call_count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn calls_with_use_cache_false_always_reach_the_backend() {
    let (base_url, mock) = spawn_mock_backend().await;
    let gateway = GatewayState::new(test_gateway_config());
    gateway.register_backend(BackendConfig::new("echo-server", base_url)).await;

    let params = serde_json::json!({"message": "hi"});
    gateway.execute("echo-server", "echo", params.clone(), false).await.unwrap();
    gateway.execute("echo-server", "echo", params.clone(), false).await.unwrap();

    assert_eq!(mock.call_count.load(Ordering::SeqCst), 2);
}

/// Testable property 8: the circuit breaker opens after the configured
/// number of consecutive failures and subsequent calls are rejected locally
/// (the backend sees no further traffic) until the cooldown elapses.
#[tokio::test]
async fn circuit_opens_after_threshold_failures_and_blocks_further_calls() {
    let (base_url, mock) = spawn_mock_backend().await;
    mock.should_fail.store(true, Ordering::SeqCst);
    let gateway = GatewayState::new(test_gateway_config());
    gateway.register_backend(BackendConfig::new("echo-server", base_url)).await;

    let params = serde_json::json!({"message": "hi"});
    // Threshold is 2: the first two calls fail upstream and trip the breaker.
    assert!(gateway.execute("echo-server", "echo", params.clone(), false).await.is_err());
    assert!(gateway.execute("echo-server", "echo", params.clone(), false).await.is_err());
    assert_eq!(mock.call_count.load(Ordering::SeqCst), 2);

    let breaker_state = gateway.health().await.circuit_breakers.get("echo-server").copied();
    assert_eq!(breaker_state, Some(BreakerState::Open));

    // The breaker is open, so this call is rejected without reaching the
    // backend at all - the mock's call count must not move.
    let result = gateway.execute("echo-server", "echo", params, false).await;
    assert!(matches!(
        result,
        Err(orchestrion::OrchestrionError::ToolUnavailable { .. })
    ));
    assert_eq!(mock.call_count.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn unregistering_a_backend_removes_it_from_future_lookups() {
    let (base_url, _mock) = spawn_mock_backend().await;
    let gateway = GatewayState::new(test_gateway_config());
    gateway.register_backend(BackendConfig::new("echo-server", base_url)).await;
    assert!(gateway.unregister_backend("echo-server").await);

    let result = gateway
        .execute("echo-server", "echo", serde_json::json!({}), false)
        .await;
    assert!(matches!(result, Err(orchestrion::OrchestrionError::NotFound(_))));
}
