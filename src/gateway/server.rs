//! Axum HTTP surface for the Tool Gateway Router (§6).
//!
//! Grounded on `mcp_http_adapter.rs`'s `AxumHttpAdapter::router`: a thin
//! `Router` built from an `Arc<GatewayState>` held in `axum::extract::State`,
//! one handler per route, status codes mapped explicitly rather than via a
//! blanket `IntoResponse` for every error (the gateway's error surface is
//! small and each case has a distinct HTTP meaning per §6's table).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{delete, get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{BackendConfig, BatchRequest, GatewayState};
use crate::error::OrchestrionError;

pub fn router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/servers", get(list_servers))
        .route("/tools", get(list_tools))
        .route("/execute", post(execute))
        .route("/batch", post(batch))
        .route("/metrics", get(metrics))
        .route("/servers/register", post(register_server))
        .route("/servers/{name}", delete(unregister_server))
        .route("/cache/clear", post(clear_cache))
        .with_state(state)
}

async fn health(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(state.health().await)
}

async fn list_servers(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(serde_json::json!({ "servers": state.list_servers().await }))
}

async fn list_tools(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(state.tool_catalog().await)
}

#[derive(Debug, Deserialize)]
struct ExecuteRequest {
    server: String,
    tool: String,
    #[serde(default)]
    params: serde_json::Value,
    #[serde(default = "default_true")]
    use_cache: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize)]
struct ExecuteResponse {
    success: bool,
    result: serde_json::Value,
}

async fn execute(
    State(state): State<Arc<GatewayState>>,
    Json(req): Json<ExecuteRequest>,
) -> Response {
    match state
        .execute(&req.server, &req.tool, req.params, req.use_cache)
        .await
    {
        Ok(result) => Json(ExecuteResponse { success: true, result }).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize)]
struct BatchRequestBody {
    requests: Vec<BatchRequestItem>,
    #[serde(default)]
    parallel: bool,
}

#[derive(Debug, Deserialize)]
struct BatchRequestItem {
    server: String,
    tool: String,
    #[serde(default)]
    params: serde_json::Value,
}

async fn batch(
    State(state): State<Arc<GatewayState>>,
    Json(req): Json<BatchRequestBody>,
) -> impl IntoResponse {
    let requests = req
        .requests
        .into_iter()
        .map(|item| BatchRequest {
            backend: item.server,
            tool: item.tool,
            params: item.params,
        })
        .collect();
    Json(state.execute_batch(requests, req.parallel).await)
}

async fn metrics(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(state.metrics().await)
}

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    name: String,
    base_url: String,
    #[serde(default)]
    capabilities: Vec<String>,
    #[serde(default)]
    priority: i32,
}

async fn register_server(
    State(state): State<Arc<GatewayState>>,
    Json(req): Json<RegisterRequest>,
) -> impl IntoResponse {
    let mut config = BackendConfig::new(req.name, req.base_url);
    config.capabilities = req.capabilities;
    config.priority = req.priority;
    state.register_backend(config).await;
    StatusCode::CREATED
}

async fn unregister_server(
    State(state): State<Arc<GatewayState>>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    if state.unregister_backend(&name).await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn clear_cache(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(serde_json::json!({ "cleared": state.clear_cache() }))
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(error: OrchestrionError) -> Response {
    let status = match &error {
        OrchestrionError::NotFound(_) => StatusCode::NOT_FOUND,
        OrchestrionError::ToolUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        OrchestrionError::ToolTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        OrchestrionError::ToolUpstream { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorBody {
            error: error.to_string(),
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;

    #[tokio::test]
    async fn router_builds_without_panicking() {
        let state = Arc::new(GatewayState::new(GatewayConfig::default()));
        let _ = router(state);
    }

    #[tokio::test]
    async fn unregistering_unknown_backend_returns_404() {
        let state = Arc::new(GatewayState::new(GatewayConfig::default()));
        let status = unregister_server(State(state), Path("missing".to_string()))
            .await
            .into_response()
            .status();
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
