//! Tool Client (C4): the per-process bridge an agent uses to reach the Tool
//! Gateway Router over HTTP, plus role-based tool filtering.
//!
//! Grounded on `mcp_http_adapter.rs`'s client side and `agent.rs`'s pattern
//! of handing an agent only the tool schemas its role is entitled to before
//! binding them onto an LLM completion request.

use serde_json::Value;
use std::time::Duration;

use crate::error::{OrchestrionError, OrchestrionResult};
use crate::gateway::ToolDescriptor;
use crate::llm::ToolSchema;
use crate::role::Role;

/// Thin HTTP client to a running gateway. One instance is shared across all
/// agents in a run (cheap to clone: `reqwest::Client` is internally `Arc`'d).
#[derive(Clone)]
pub struct ToolClient {
    http: reqwest::Client,
    gateway_base_url: String,
}

impl ToolClient {
    pub fn new(gateway_base_url: impl Into<String>) -> Self {
        ToolClient {
            http: reqwest::Client::new(),
            gateway_base_url: gateway_base_url.into(),
        }
    }

    /// Fetches the gateway's full tool catalog and keeps only the tools
    /// served by backends listed in `role.tool_servers`.
    pub async fn tools_for_role(&self, role: &Role) -> OrchestrionResult<Vec<ToolSchema>> {
        if !role.needs_tools {
            return Ok(Vec::new());
        }

        let url = format!("{}/tools", self.gateway_base_url);
        let response = self
            .http
            .get(&url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| OrchestrionError::GatewayInternal(e.to_string()))?;

        if !response.status().is_success() {
            return Err(OrchestrionError::GatewayInternal(format!(
                "gateway returned status {}",
                response.status()
            )));
        }

        let catalog: std::collections::HashMap<String, Vec<ToolDescriptor>> = response
            .json()
            .await
            .map_err(|e| OrchestrionError::GatewayInternal(e.to_string()))?;

        let mut schemas = Vec::new();
        for (backend, tools) in catalog {
            if !role.tool_servers.contains(backend.as_str()) {
                continue;
            }
            for tool in tools {
                let properties: serde_json::Map<String, Value> = tool
                    .parameters
                    .iter()
                    .map(|(name, param)| {
                        (
                            name.clone(),
                            serde_json::json!({
                                "type": param.param_type,
                                "description": param.description,
                            }),
                        )
                    })
                    .collect();
                schemas.push(ToolSchema {
                    name: format!("{backend}.{}", tool.name),
                    description: tool.description,
                    parameters: serde_json::json!({
                        "type": "object",
                        "properties": properties,
                    }),
                });
            }
        }
        Ok(schemas)
    }

    /// Executes one tool call. `qualified_tool_name` is `"<backend>.<tool>"`,
    /// the form produced by [`ToolClient::tools_for_role`] and therefore the
    /// form an LLM tool call will echo back.
    pub async fn execute(&self, qualified_tool_name: &str, params: Value) -> OrchestrionResult<Value> {
        let (backend, tool) = qualified_tool_name
            .split_once('.')
            .ok_or_else(|| OrchestrionError::NotFound(qualified_tool_name.to_string()))?;

        let url = format!("{}/execute", self.gateway_base_url);
        let body = serde_json::json!({
            "backend": backend,
            "tool": tool,
            "params": params,
            "use_cache": true,
        });

        let response = self
            .http
            .post(&url)
            .timeout(Duration::from_secs(60))
            .json(&body)
            .send()
            .await
            .map_err(|e| OrchestrionError::GatewayInternal(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let wire: Value = response
                .json()
                .await
                .map_err(|e| OrchestrionError::GatewayInternal(e.to_string()))?;
            Ok(wire.get("result").cloned().unwrap_or(Value::Null))
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(OrchestrionError::ToolUpstream {
                backend: backend.to_string(),
                tool: tool.to_string(),
                status: status.as_u16(),
                body,
            })
        }
    }

    /// Sync-context bridge for callers that cannot themselves be `async fn`
    /// (e.g. a tool implementation invoked through a plain `Fn` closure).
    /// Mirrors the teacher's `Handle::current().block_on(...)` pattern, but
    /// wrapped in `block_in_place` so a call from inside a multi-threaded
    /// Tokio worker doesn't stall the runtime's other tasks while it blocks.
    pub fn execute_blocking(&self, qualified_tool_name: &str, params: Value) -> OrchestrionResult<Value> {
        let handle = tokio::runtime::Handle::current();
        tokio::task::block_in_place(|| handle.block_on(self.execute(qualified_tool_name, params)))
    }
}
