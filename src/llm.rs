//! The LLM Adapter (C2): a single capability abstraction that hides provider
//! differences behind one trait.
//!
//! Grounded on the teacher's `ClientWrapper` trait: messages carry `Arc<str>`
//! content so conversation histories clone cheaply, and an implementation is
//! required to be `Send + Sync` so it can be shared across concurrently
//! scheduled agent tasks.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

use crate::error::{OrchestrionError, OrchestrionResult};

/// The role a [`Message`] was authored under.
#[derive(Debug, Clone, PartialEq)]
pub enum Role {
    System,
    User,
    Assistant,
    /// A tool-result message correlating with a prior tool call by id.
    Tool { call_id: String },
}

/// A single tool call the model requested in its response.
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// One message in a chat exchange.
#[derive(Clone)]
pub struct Message {
    pub role: Role,
    pub content: Arc<str>,
    pub tool_calls: Vec<ToolCall>,
}

impl Message {
    pub fn system(content: impl Into<Arc<str>>) -> Self {
        Message {
            role: Role::System,
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn user(content: impl Into<Arc<str>>) -> Self {
        Message {
            role: Role::User,
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn assistant(content: impl Into<Arc<str>>) -> Self {
        Message {
            role: Role::Assistant,
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<Arc<str>>) -> Self {
        Message {
            role: Role::Tool {
                call_id: call_id.into(),
            },
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }
}

/// Schema advertised to the model for native function-calling.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// `{prompt, completion, total}` token counts, componentwise addable (C10).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt: u64,
    pub completion: u64,
    pub total: u64,
}

impl std::ops::Add for TokenUsage {
    type Output = TokenUsage;

    fn add(self, rhs: TokenUsage) -> TokenUsage {
        TokenUsage {
            prompt: self.prompt + rhs.prompt,
            completion: self.completion + rhs.completion,
            total: self.total + rhs.total,
        }
    }
}

impl std::ops::AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: TokenUsage) {
        *self = *self + rhs;
    }
}

/// Extracts token counts from a provider response body, tolerating the
/// `usage.prompt_tokens`/`usage.completion_tokens` OpenAI shape as well as the
/// `usage.input_tokens`/`usage.output_tokens` Anthropic-style shape.
pub fn extract_token_usage(body: &serde_json::Value) -> Option<TokenUsage> {
    let usage = body.get("usage")?;
    let prompt = usage
        .get("prompt_tokens")
        .or_else(|| usage.get("input_tokens"))
        .and_then(|v| v.as_u64())
        .unwrap_or(0);
    let completion = usage
        .get("completion_tokens")
        .or_else(|| usage.get("output_tokens"))
        .and_then(|v| v.as_u64())
        .unwrap_or(0);
    let total = usage
        .get("total_tokens")
        .and_then(|v| v.as_u64())
        .unwrap_or(prompt + completion);
    Some(TokenUsage {
        prompt,
        completion,
        total,
    })
}

/// Per-call options accepted by [`LlmAdapter::complete`].
#[derive(Debug, Clone, Default)]
pub struct CompletionOptions {
    pub temperature: Option<f32>,
    /// Hints the provider to constrain output to valid JSON.
    pub json_format: bool,
    /// Free-form tags surfaced to tracing/telemetry, opaque to the adapter.
    pub run_tags: Vec<String>,
    pub tools: Option<Vec<ToolSchema>>,
}

/// The result of one [`LlmAdapter::complete`] call.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub token_usage: Option<TokenUsage>,
}

/// Single capability: given messages and options, return text plus optional
/// tool calls plus token accounting. Implementations never transform or
/// interpret the model's output; that is the planner's and the agent
/// runner's job.
#[async_trait]
pub trait LlmAdapter: Send + Sync {
    async fn complete(
        &self,
        messages: &[Message],
        options: CompletionOptions,
    ) -> OrchestrionResult<Completion>;

    /// Identifier of the bound model, used in logs and traces.
    fn model_name(&self) -> &str;
}

/// The crate's one concrete [`LlmAdapter`]: an OpenAI-compatible chat
/// completions client built on `reqwest`. Binding to a specific vendor SDK is
/// out of scope for this engine; this adapter exists only so the planner and
/// agent runner are exercisable end-to-end against any OpenAI-compatible
/// endpoint (including local proxies used in tests).
pub struct HttpLlmAdapter {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl HttpLlmAdapter {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, api_key: impl Into<String>) -> Self {
        HttpLlmAdapter {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            api_key: api_key.into(),
        }
    }

    fn role_str(role: &Role) -> &'static str {
        match role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool { .. } => "tool",
        }
    }

    fn to_wire(messages: &[Message]) -> Vec<serde_json::Value> {
        messages
            .iter()
            .map(|message| {
                let mut entry = serde_json::json!({
                    "role": Self::role_str(&message.role),
                    "content": message.content.as_ref(),
                });
                if let Role::Tool { call_id } = &message.role {
                    entry["tool_call_id"] = serde_json::Value::String(call_id.clone());
                }
                entry
            })
            .collect()
    }
}

#[async_trait]
impl LlmAdapter for HttpLlmAdapter {
    async fn complete(
        &self,
        messages: &[Message],
        options: CompletionOptions,
    ) -> OrchestrionResult<Completion> {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": Self::to_wire(messages),
        });
        if let Some(temperature) = options.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }
        if options.json_format {
            body["response_format"] = serde_json::json!({"type": "json_object"});
        }
        if let Some(tools) = &options.tools {
            body["tools"] = serde_json::json!(tools
                .iter()
                .map(|t| serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                }))
                .collect::<Vec<_>>());
        }

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| OrchestrionError::Llm(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(OrchestrionError::Llm(format!("{status}: {text}")));
        }

        let parsed: serde_json::Value = response
            .json()
            .await
            .map_err(|e| OrchestrionError::Llm(e.to_string()))?;

        let choice = parsed
            .get("choices")
            .and_then(|c| c.get(0))
            .ok_or_else(|| OrchestrionError::Llm("response had no choices".to_string()))?;
        let message = choice
            .get("message")
            .ok_or_else(|| OrchestrionError::Llm("choice had no message".to_string()))?;
        let text = message
            .get("content")
            .and_then(|c| c.as_str())
            .unwrap_or("")
            .to_string();
        let tool_calls = message
            .get("tool_calls")
            .and_then(|tc| tc.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|entry| {
                        let id = entry.get("id")?.as_str()?.to_string();
                        let function = entry.get("function")?;
                        let name = function.get("name")?.as_str()?.to_string();
                        let arguments_raw = function.get("arguments")?.as_str()?;
                        let arguments = serde_json::from_str(arguments_raw).unwrap_or_default();
                        Some(ToolCall {
                            id,
                            name,
                            arguments,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Completion {
            text,
            tool_calls,
            token_usage: extract_token_usage(&parsed),
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
