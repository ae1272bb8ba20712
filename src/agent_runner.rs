//! Agent Runner (C8): executes one [`AgentSpec`] — prompt assembly, optional
//! tool binding, and a bounded tool-call loop.
//!
//! Grounded on `agent.rs`'s per-agent system prompt plus conversation
//! construction, generalized from a single fixed persona to the role
//! registry, and on its tool-call loop shape (call the model, execute any
//! tool calls it requested, feed the results back, repeat until the model
//! stops calling tools or the loop budget is exhausted).

use serde::Deserialize;

use crate::config::EngineConfig;
use crate::error::{OrchestrionError, OrchestrionResult};
use crate::llm::{CompletionOptions, LlmAdapter, Message};
use crate::plan::AgentSpec;
use crate::role::Role;
use crate::tool_client::ToolClient;
use crate::token::TokenLedger;

/// Hard ceiling on tool-call round trips per agent invocation, independent
/// of the DAG's recursion depth budget. Matches the teacher's
/// `BasicPlanner` default of 5 iterations.
const MAX_TOOL_ROUNDS: u32 = 5;

/// Per-message character clip applied to the trimmed history tail handed to
/// the planner and to each agent, so a few verbose prior turns can't blow up
/// every subsequent prompt.
pub const HISTORY_MESSAGE_CHAR_LIMIT: usize = 150;

/// Clips `history`'s trailing window to `limit` messages, trimming each
/// message's content to [`HISTORY_MESSAGE_CHAR_LIMIT`] characters.
pub fn clipped_history_tail(history: &[Message], limit: usize) -> Vec<Message> {
    let start = history.len().saturating_sub(limit);
    history[start..]
        .iter()
        .map(|m| Message {
            role: m.role.clone(),
            content: truncate_chars(&m.content, HISTORY_MESSAGE_CHAR_LIMIT).into(),
            tool_calls: m.tool_calls.clone(),
        })
        .collect()
}

/// One delegated subtask, as named in a delegation JSON response. `role` is
/// advisory (used only in the trace label); the actual work is a full nested
/// plan-and-execute run over `task`, not a single-agent dispatch.
#[derive(Debug, Clone, Deserialize)]
pub struct SubtaskSpec {
    pub role: String,
    pub task: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DelegationRequest {
    #[serde(default)]
    pub needs_delegation: bool,
    #[serde(default)]
    pub subtasks: Vec<SubtaskSpec>,
}

/// Parses an agent's raw output as a [`DelegationRequest`]. Returns `None`
/// (not an error) when the output is not JSON at all — the original text is
/// then used as the agent's ordinary answer.
pub fn parse_delegation(raw: &str) -> Option<DelegationRequest> {
    let request: DelegationRequest = serde_json::from_str(raw.trim()).ok()?;
    if request.needs_delegation && !request.subtasks.is_empty() {
        Some(request)
    } else {
        None
    }
}

const DELEGATION_INSTRUCTIONS: &str = r#"
You have the ability to delegate work to specialized sub-agents.
If this task would benefit from delegation, respond with JSON:
{"needs_delegation": true, "subtasks": [{"role": "role_name", "task": "specific task"}, ...]}

Otherwise, complete the task directly and respond with your normal output (not JSON)."#;

/// Formats the dependency outputs `agent` declared in `depends_on` into the
/// block appended to its user message; `"(no output from previous agent)"`
/// stands in for a dependency that produced no output.
pub fn format_dependency_context(
    agent: &AgentSpec,
    agent_id_of: impl Fn(usize) -> String,
    outputs: impl Fn(&str) -> Option<String>,
    limit: usize,
) -> String {
    if agent.depends_on.is_empty() {
        return String::new();
    }
    let mut blocks = Vec::new();
    for &dep in &agent.depends_on {
        let dep_id = agent_id_of(dep);
        let output = outputs(&dep_id).unwrap_or_else(|| "(no output from previous agent)".to_string());
        let trimmed = truncate_chars(&output, limit);
        blocks.push(format!("From {dep_id}:\n{trimmed}"));
    }
    blocks.join("\n\n")
}

pub fn truncate_chars(s: &str, limit: usize) -> String {
    if s.chars().count() <= limit {
        s.to_string()
    } else {
        let mut truncated: String = s.chars().take(limit).collect();
        truncated.push_str("...");
        truncated
    }
}

/// Runs one agent to completion: builds its prompt, binds tools if its role
/// needs them, and loops on tool calls up to [`MAX_TOOL_ROUNDS`]. When
/// `allow_delegation` is set, the prompt additionally invites the model to
/// respond with a delegation request instead of a direct answer; the caller
/// is responsible for calling [`parse_delegation`] on the returned text and
/// acting on it (the agent runner has no access to the scheduler it would
/// need to execute the delegated subtasks).
pub async fn run_agent(
    llm: &dyn LlmAdapter,
    tool_client: &ToolClient,
    role: &Role,
    agent: &AgentSpec,
    query: &str,
    dependency_context: &str,
    history_tail: &[Message],
    config: &EngineConfig,
    ledger: &mut TokenLedger,
    agent_id: &str,
    allow_delegation: bool,
) -> OrchestrionResult<String> {
    let mut user_content = String::new();
    user_content.push_str("Original query: ");
    user_content.push_str(query);
    if !dependency_context.is_empty() {
        user_content.push_str("\n\nContext from prior agents:\n");
        user_content.push_str(dependency_context);
    }
    user_content.push_str("\n\nYour task: ");
    user_content.push_str(&agent.task);
    if allow_delegation {
        user_content.push_str(DELEGATION_INSTRUCTIONS);
    }

    let mut messages = vec![Message::system(role.system_prompt)];
    messages.extend(history_tail.iter().cloned());
    messages.push(Message::user(user_content));

    let tools = if role.needs_tools {
        tool_client.tools_for_role(role).await.unwrap_or_default()
    } else {
        Vec::new()
    };

    let mut rounds = 0u32;
    loop {
        let options = CompletionOptions {
            temperature: None,
            json_format: false,
            run_tags: vec![agent_id.to_string()],
            tools: if tools.is_empty() { None } else { Some(tools.clone()) },
        };

        let completion = llm
            .complete(&messages, options)
            .await
            .map_err(|e| OrchestrionError::AgentFailure {
                agent_id: agent_id.to_string(),
                message: e.to_string(),
            })?;

        if let Some(usage) = completion.token_usage {
            ledger.record_agent(agent_id, usage);
        }

        if completion.tool_calls.is_empty() || rounds >= MAX_TOOL_ROUNDS || !role.needs_tools {
            return Ok(completion.text);
        }

        messages.push(Message::assistant(completion.text.clone()));
        for call in &completion.tool_calls {
            let result = tool_client.execute(&call.name, call.arguments.clone()).await;
            let content = match result {
                Ok(value) => value.to_string(),
                Err(e) => format!("error: {e}"),
            };
            messages.push(Message::tool_result(call.id.clone(), content));
        }
        rounds += 1;
    }
}
