//! Tool Gateway Router (C3): backend registry, health monitor, circuit
//! breaker, response cache, batch executor.
//!
//! Grounded on `mcp_http_adapter.rs`'s `AxumHttpAdapter`: one persistent HTTP
//! client shared across backends (reqwest already pools per-host
//! connections, so a single `reqwest::Client` gives the same "one persistent
//! client per backend" resource shape the design calls for without manually
//! managing N client instances), state shared via `Arc<GatewayState>` the
//! way the adapter shares `Arc<dyn ToolProtocol>` across axum handlers.

pub mod backend;
pub mod cache;
pub mod circuit_breaker;
#[cfg(feature = "gateway-server")]
pub mod server;

use backend::{BackendConfig, BackendMetrics};
use cache::ResponseCache;
use chrono::Utc;
use circuit_breaker::{BreakerState, CircuitBreaker};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex as StdMutex;
use std::time::Instant;
use tokio::sync::RwLock;

use crate::config::GatewayConfig;
use crate::error::{OrchestrionError, OrchestrionResult};

/// `{name, description, parameters:{name:{type, description, default?}}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: HashMap<String, ParamDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamDescriptor {
    #[serde(rename = "type")]
    pub param_type: String,
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

struct RegisteredBackend {
    config: BackendConfig,
    healthy: bool,
    tools: Vec<ToolDescriptor>,
    breaker: StdMutex<CircuitBreaker>,
    metrics: StdMutex<BackendMetrics>,
}

/// Long-lived gateway state, passed around as `Arc<GatewayState>` so the
/// health monitor task and every HTTP handler share the same registry, cache
/// and breakers (per §9's "explicit long-lived resources, not globals").
pub struct GatewayState {
    config: GatewayConfig,
    http: reqwest::Client,
    backends: RwLock<HashMap<String, RegisteredBackend>>,
    cache: StdMutex<ResponseCache>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthSummary {
    pub status: String,
    pub servers: HashMap<String, bool>,
    pub total_servers: usize,
    pub healthy_servers: usize,
    pub circuit_breakers: HashMap<String, BreakerState>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackendMetricsView {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub average_latency_ms: f64,
    pub errors_by_kind: HashMap<String, u64>,
    pub circuit_breaker_state: BreakerState,
    pub circuit_breaker_failures: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub gateway: HashMap<String, serde_json::Value>,
    pub servers: HashMap<String, BackendMetricsView>,
}

/// One entry in the `/servers` listing (§6).
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    pub name: String,
    pub url: String,
    pub enabled: bool,
    pub healthy: bool,
    pub capabilities: Vec<String>,
    pub tools_count: usize,
    pub circuit_breaker: BreakerState,
}

/// One entry in the `/tools` listing (§6), a tool descriptor tagged with the
/// server that serves it.
#[derive(Debug, Clone, Serialize)]
pub struct ToolListing {
    pub server: String,
    pub name: String,
    pub description: String,
    pub parameters: HashMap<String, ParamDescriptor>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolCatalog {
    pub total_tools: usize,
    pub tools: Vec<ToolListing>,
    pub by_server: HashMap<String, usize>,
}

#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub backend: String,
    pub tool: String,
    pub params: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum BatchResult {
    Success { success: bool, result: serde_json::Value },
    Failure { success: bool, error: String },
}

impl GatewayState {
    pub fn new(config: GatewayConfig) -> Self {
        GatewayState {
            config,
            http: reqwest::Client::new(),
            backends: RwLock::new(HashMap::new()),
            cache: StdMutex::new(ResponseCache::new(
                GatewayConfig::default().cache_ttl,
                GatewayConfig::default().cache_capacity,
            )),
        }
        .with_configured_cache()
    }

    fn with_configured_cache(mut self) -> Self {
        self.cache = StdMutex::new(ResponseCache::new(self.config.cache_ttl, self.config.cache_capacity));
        self
    }

    /// Stores the backend, runs an immediate health probe and tool
    /// discovery. The backend is registered even if the initial probe
    /// fails (it simply starts out unhealthy; the health monitor will
    /// retry it on its normal cadence).
    pub async fn register_backend(&self, config: BackendConfig) {
        let name = config.name.clone();
        let (healthy, tools) = self.probe(&config).await;
        let registered = RegisteredBackend {
            config,
            healthy,
            tools,
            breaker: StdMutex::new(CircuitBreaker::new(
                self.config.circuit_breaker_threshold,
                self.config.circuit_breaker_timeout,
            )),
            metrics: StdMutex::new(BackendMetrics::default()),
        };
        self.backends.write().await.insert(name, registered);
    }

    pub async fn unregister_backend(&self, name: &str) -> bool {
        self.backends.write().await.remove(name).is_some()
    }

    async fn probe(&self, config: &BackendConfig) -> (bool, Vec<ToolDescriptor>) {
        let health_url = format!("{}/health", config.base_url);
        let healthy = self
            .http
            .get(&health_url)
            .timeout(std::time::Duration::from_secs(5))
            .send()
            .await
            .map(|resp| resp.status().is_success())
            .unwrap_or(false);

        if !healthy {
            return (false, Vec::new());
        }

        let tools_url = format!("{}/tools", config.base_url);
        let tools = self
            .http
            .get(&tools_url)
            .timeout(std::time::Duration::from_secs(5))
            .send()
            .await
            .ok()
            .filter(|r| r.status().is_success());
        let tools = match tools {
            Some(resp) => resp
                .json::<Vec<ToolDescriptor>>()
                .await
                .unwrap_or_default(),
            None => Vec::new(),
        };

        (healthy, tools)
    }

    /// Background task: probes every registered backend's `/health` on
    /// `config.health_check_interval`, refreshing its cached tool list on
    /// success. Health probing does not bypass the breaker; it is the
    /// mechanism that lets a breaker observe renewed availability.
    pub async fn run_health_monitor(self: std::sync::Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.health_check_interval);
        loop {
            ticker.tick().await;
            self.health_check_all().await;
        }
    }

    async fn health_check_all(&self) {
        let names: Vec<String> = self.backends.read().await.keys().cloned().collect();
        for name in names {
            let config = {
                let backends = self.backends.read().await;
                match backends.get(&name) {
                    Some(b) => b.config.clone(),
                    None => continue,
                }
            };
            let (healthy, tools) = self.probe(&config).await;
            let mut backends = self.backends.write().await;
            if let Some(entry) = backends.get_mut(&name) {
                entry.healthy = healthy;
                if healthy {
                    entry.tools = tools;
                }
            }
        }
    }

    pub async fn list_tools(&self) -> HashMap<String, Vec<ToolDescriptor>> {
        self.backends
            .read()
            .await
            .iter()
            .filter(|(_, b)| b.healthy)
            .map(|(name, b)| (name.clone(), b.tools.clone()))
            .collect()
    }

    /// Per-server registration summary for the `/servers` endpoint (§6).
    pub async fn list_servers(&self) -> Vec<ServerInfo> {
        self.backends
            .read()
            .await
            .iter()
            .map(|(name, b)| ServerInfo {
                name: name.clone(),
                url: b.config.base_url.clone(),
                enabled: b.config.enabled,
                healthy: b.healthy,
                capabilities: b.config.capabilities.clone(),
                tools_count: b.tools.len(),
                circuit_breaker: b.breaker.lock().unwrap().state(),
            })
            .collect()
    }

    /// Flattened, per-tool catalog for the `/tools` endpoint (§6), distinct
    /// from [`GatewayState::list_tools`]'s `backend → [tool]` shape that
    /// `ToolClient` consumes internally.
    pub async fn tool_catalog(&self) -> ToolCatalog {
        let backends = self.backends.read().await;
        let mut tools = Vec::new();
        let mut by_server = HashMap::new();
        for (name, b) in backends.iter().filter(|(_, b)| b.healthy) {
            by_server.insert(name.clone(), b.tools.len());
            for tool in &b.tools {
                tools.push(ToolListing {
                    server: name.clone(),
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    parameters: tool.parameters.clone(),
                });
            }
        }
        ToolCatalog {
            total_tools: tools.len(),
            tools,
            by_server,
        }
    }

    /// The core operation: steps (1)-(8) of §4.3's execute algorithm.
    pub async fn execute(
        &self,
        backend_name: &str,
        tool: &str,
        params: serde_json::Value,
        use_cache: bool,
    ) -> OrchestrionResult<serde_json::Value> {
        let base_url = {
            let backends = self.backends.read().await;
            let backend = backends
                .get(backend_name)
                .ok_or_else(|| OrchestrionError::NotFound(backend_name.to_string()))?;
            backend.config.base_url.clone()
        };

        {
            let backends = self.backends.read().await;
            let backend = backends
                .get(backend_name)
                .ok_or_else(|| OrchestrionError::NotFound(backend_name.to_string()))?;
            let mut breaker = backend.breaker.lock().unwrap();
            if !breaker.can_execute(Utc::now()) {
                return Err(OrchestrionError::ToolUnavailable {
                    backend: backend_name.to_string(),
                });
            }
        }

        let cache_key = ResponseCache::key(backend_name, tool, &params);
        if use_cache {
            let cached = self.cache.lock().unwrap().get(&cache_key, Utc::now());
            if let Some(result) = cached {
                return Ok(result);
            }
        }

        let timeout = {
            let backends = self.backends.read().await;
            backends
                .get(backend_name)
                .map(|b| b.config.timeout)
                .unwrap_or(self.config.request_timeout)
        };

        let url = format!("{base_url}/tools/{tool}");
        let mut attempt = 0u32;
        loop {
            let start = Instant::now();
            let outcome = self
                .http
                .post(&url)
                .timeout(timeout)
                .json(&params)
                .send()
                .await;
            let latency_ms = start.elapsed().as_millis() as u64;

            match outcome {
                Ok(response) if response.status().is_success() => {
                    let result = response
                        .json::<serde_json::Value>()
                        .await
                        .unwrap_or(serde_json::Value::Null);
                    self.on_success(backend_name, latency_ms).await;
                    if use_cache {
                        self.cache.lock().unwrap().put(cache_key, result.clone(), Utc::now());
                    }
                    return Ok(result);
                }
                Ok(response) => {
                    let status = response.status().as_u16();
                    let body = response.text().await.unwrap_or_default();
                    self.on_failure(backend_name, "UPSTREAM").await;
                    return Err(OrchestrionError::ToolUpstream {
                        backend: backend_name.to_string(),
                        tool: tool.to_string(),
                        status,
                        body,
                    });
                }
                Err(e) if e.is_timeout() => {
                    self.on_failure(backend_name, "TIMEOUT").await;
                    if attempt >= self.config.max_retries {
                        return Err(OrchestrionError::ToolTimeout {
                            backend: backend_name.to_string(),
                            tool: tool.to_string(),
                        });
                    }
                    attempt += 1;
                    continue;
                }
                Err(e) => {
                    self.on_failure(backend_name, "INTERNAL").await;
                    return Err(OrchestrionError::GatewayInternal(e.to_string()));
                }
            }
        }
    }

    async fn on_success(&self, backend_name: &str, latency_ms: u64) {
        let backends = self.backends.read().await;
        if let Some(backend) = backends.get(backend_name) {
            backend.breaker.lock().unwrap().record_success(Utc::now());
            backend
                .metrics
                .lock()
                .unwrap()
                .record_success(latency_ms, Utc::now());
        }
    }

    async fn on_failure(&self, backend_name: &str, kind: &str) {
        let backends = self.backends.read().await;
        if let Some(backend) = backends.get(backend_name) {
            backend.breaker.lock().unwrap().record_failure(Utc::now());
            backend.metrics.lock().unwrap().record_failure(kind, Utc::now());
        }
    }

    pub async fn execute_batch(&self, requests: Vec<BatchRequest>, parallel: bool) -> Vec<BatchResult> {
        if parallel {
            let futures = requests.into_iter().map(|req| async move {
                match self.execute(&req.backend, &req.tool, req.params, false).await {
                    Ok(result) => BatchResult::Success {
                        success: true,
                        result,
                    },
                    Err(e) => BatchResult::Failure {
                        success: false,
                        error: e.to_string(),
                    },
                }
            });
            futures_util::future::join_all(futures).await
        } else {
            let mut results = Vec::with_capacity(requests.len());
            for req in requests {
                let result = match self.execute(&req.backend, &req.tool, req.params, false).await {
                    Ok(result) => BatchResult::Success {
                        success: true,
                        result,
                    },
                    Err(e) => BatchResult::Failure {
                        success: false,
                        error: e.to_string(),
                    },
                };
                results.push(result);
            }
            results
        }
    }

    pub async fn health(&self) -> HealthSummary {
        let backends = self.backends.read().await;
        let servers: HashMap<String, bool> = backends.iter().map(|(n, b)| (n.clone(), b.healthy)).collect();
        let circuit_breakers: HashMap<String, BreakerState> = backends
            .iter()
            .map(|(n, b)| (n.clone(), b.breaker.lock().unwrap().state()))
            .collect();
        let healthy_servers = servers.values().filter(|h| **h).count();
        HealthSummary {
            status: if healthy_servers == servers.len() { "ok" } else { "degraded" }.to_string(),
            total_servers: servers.len(),
            healthy_servers,
            servers,
            circuit_breakers,
        }
    }

    pub async fn metrics(&self) -> MetricsSummary {
        let backends = self.backends.read().await;
        let mut servers = HashMap::new();
        for (name, backend) in backends.iter() {
            let metrics = backend.metrics.lock().unwrap().clone();
            let breaker = backend.breaker.lock().unwrap();
            servers.insert(
                name.clone(),
                BackendMetricsView {
                    total_requests: metrics.total_requests,
                    successful_requests: metrics.successful_requests,
                    failed_requests: metrics.failed_requests,
                    average_latency_ms: metrics.average_latency_ms(),
                    errors_by_kind: metrics.errors_by_kind.clone(),
                    circuit_breaker_state: breaker.state(),
                    circuit_breaker_failures: breaker.failure_count(),
                },
            );
        }
        let mut gateway = HashMap::new();
        gateway.insert("registered_backends".to_string(), serde_json::json!(servers.len()));
        gateway.insert("cache_size".to_string(), serde_json::json!(self.cache.lock().unwrap().len()));
        MetricsSummary { gateway, servers }
    }

    pub fn clear_cache(&self) -> usize {
        self.cache.lock().unwrap().clear()
    }
}
