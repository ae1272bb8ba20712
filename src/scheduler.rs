//! DAG Scheduler (C7): runs an [`ExecutionPlan`] layer by layer, fanning
//! each layer out under a global concurrency cap and merging dependency
//! outputs into each agent's prompt before it runs.
//!
//! Grounded on `orchestration.rs`'s `execute_hierarchical`: agents within a
//! layer are spawned concurrently and the scheduler barriers on the whole
//! layer before starting the next one, since a later layer's agents may
//! depend on any agent in an earlier one.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::agent_runner;
use crate::config::EngineConfig;
use crate::error::{OrchestrionError, OrchestrionResult};
use crate::llm::{LlmAdapter, Message};
use crate::plan::{AgentSpec, ExecutionPlan};
use crate::planner;
use crate::role;
use crate::token::TokenLedger;
use crate::tool_client::ToolClient;

#[derive(Debug, Clone)]
pub struct ExecutionTraceEntry {
    pub agent_id: String,
    pub role: String,
    pub task: String,
    pub output: String,
    pub layer: usize,
    pub depth: u8,
}

/// Everything accumulated over one orchestration run, including every
/// nested delegated run (their trace entries are flattened into the same
/// `execution_trace`, tagged with their own `depth`).
pub struct ExecutionState {
    pub query: String,
    pub session_id: String,
    pub start_time: DateTime<Utc>,
    pub agent_outputs: HashMap<String, String>,
    pub execution_trace: Vec<ExecutionTraceEntry>,
    pub final_output: String,
}

/// Shared, read-only context for one orchestration run and every recursive
/// delegation beneath it.
pub struct RunContext<'a> {
    pub llm: &'a dyn LlmAdapter,
    pub tool_client: &'a ToolClient,
    pub config: &'a EngineConfig,
    pub current_year: String,
    pub semaphore: Arc<Semaphore>,
    pub cancellation: CancellationToken,
}

/// Runs `query` end to end: plans at depth 0, executes the plan layer by
/// layer, and returns the accumulated [`ExecutionState`].
pub async fn run(
    ctx: &RunContext<'_>,
    query: &str,
    history: &[Message],
    ledger: &mut TokenLedger,
) -> OrchestrionResult<ExecutionState> {
    let session_id = uuid::Uuid::new_v4().to_string();
    let start_time = Utc::now();

    let mut state = ExecutionState {
        query: query.to_string(),
        session_id,
        start_time,
        agent_outputs: HashMap::new(),
        execution_trace: Vec::new(),
        final_output: String::new(),
    };

    run_at_depth(ctx, query, history, 0, ledger, &mut state).await?;
    Ok(state)
}

async fn run_at_depth(
    ctx: &RunContext<'_>,
    query: &str,
    history: &[Message],
    depth: u8,
    ledger: &mut TokenLedger,
    state: &mut ExecutionState,
) -> OrchestrionResult<()> {
    if ctx.cancellation.is_cancelled() {
        return Err(OrchestrionError::Cancelled);
    }

    let plan = planner::plan(ctx.llm, query, depth, history, ctx.config, &ctx.current_year, ledger).await;
    execute_plan(ctx, &plan, query, history, depth, ledger, state).await
}

async fn execute_plan(
    ctx: &RunContext<'_>,
    plan: &ExecutionPlan,
    query: &str,
    history: &[Message],
    depth: u8,
    ledger: &mut TokenLedger,
    state: &mut ExecutionState,
) -> OrchestrionResult<()> {
    let layers = plan.execution_layers();
    let agent_ids: Vec<String> = (0..plan.agents.len()).map(|i| plan.agent_id(i)).collect();
    let history_tail = agent_runner::clipped_history_tail(history, ctx.config.agent_history_limit * 2);

    let mut layer_outputs: HashMap<String, String> = HashMap::new();

    for (layer_idx, layer) in layers.iter().enumerate() {
        if ctx.cancellation.is_cancelled() {
            return Err(OrchestrionError::Cancelled);
        }

        let mut handles = Vec::with_capacity(layer.len());
        for &agent_index in layer {
            let agent = plan.agents[agent_index].clone();
            let agent_id = agent_ids[agent_index].clone();
            let dependency_context = agent_runner::format_dependency_context(
                &agent,
                |i| agent_ids[i].clone(),
                |id| layer_outputs.get(id).cloned(),
                ctx.config.agent_context_limit,
            );

            let role = match role::get(&agent.role) {
                Some(role) => role,
                None => {
                    return Err(OrchestrionError::RoleUnknown(agent.role.clone()));
                }
            };

            let allow_delegation =
                role.can_delegate && depth < ctx.config.max_depth_ceiling && !role.needs_tools;

            let semaphore = Arc::clone(&ctx.semaphore);
            let query = query.to_string();
            let history_tail = history_tail.clone();
            let cancellation = ctx.cancellation.clone();
            let llm = ctx.llm;
            let tool_client = ctx.tool_client;
            let config = ctx.config;

            handles.push(async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .expect("scheduler never closes its own semaphore");
                if cancellation.is_cancelled() {
                    return (agent_id, agent, Err(OrchestrionError::Cancelled), TokenLedger::new());
                }
                let mut local_ledger = TokenLedger::new();
                let result = agent_runner::run_agent(
                    llm,
                    tool_client,
                    role,
                    &agent,
                    &query,
                    &dependency_context,
                    &history_tail,
                    config,
                    &mut local_ledger,
                    &agent_id,
                    allow_delegation,
                )
                .await;
                (agent_id, agent, result, local_ledger)
            });
        }

        let results = futures_util::future::join_all(handles).await;
        for (agent_id, agent, result, local_ledger) in results {
            for (id, usage, _calls) in local_ledger.summary().per_agent {
                ledger.record_agent(&id, usage);
            }

            let raw_output = match result {
                Ok(text) => text,
                Err(e) => {
                    log::warn!("scheduler: agent {agent_id} failed: {e}");
                    format!("error: {e}")
                }
            };

            let role_of_agent = role::get(&agent.role);
            let allow_delegation = role_of_agent.map(|r| r.can_delegate).unwrap_or(false)
                && depth < ctx.config.max_depth_ceiling
                && role_of_agent.map(|r| !r.needs_tools).unwrap_or(false);

            let output = if allow_delegation {
                match agent_runner::parse_delegation(&raw_output) {
                    Some(request) => {
                        run_delegation(ctx, &agent, &request, &history_tail, depth, ledger, state, &agent_id)
                            .await?
                    }
                    None => raw_output,
                }
            } else {
                raw_output
            };

            layer_outputs.insert(agent_id.clone(), output.clone());
            state.agent_outputs.insert(agent_id.clone(), output.clone());

            state.execution_trace.push(ExecutionTraceEntry {
                agent_id: agent_id.clone(),
                role: agent.role.clone(),
                task: agent.task.clone(),
                output,
                layer: layer_idx,
                depth,
            });
        }
    }

    state.final_output = final_output_of(&agent_ids, &layer_outputs);
    Ok(())
}

/// Runs each of `request`'s subtasks as an independent, fully re-planned
/// nested orchestration at `depth + 1` (sequentially, matching the
/// delegating agent's own expectation that it is reading sub-results one at
/// a time), then makes one more LLM call to combine them into the
/// delegating agent's final answer.
async fn run_delegation(
    ctx: &RunContext<'_>,
    agent: &AgentSpec,
    request: &agent_runner::DelegationRequest,
    history_tail: &[Message],
    depth: u8,
    ledger: &mut TokenLedger,
    state: &mut ExecutionState,
    agent_id: &str,
) -> OrchestrionResult<String> {
    let role = role::get(&agent.role).ok_or_else(|| OrchestrionError::RoleUnknown(agent.role.clone()))?;

    let mut sub_results = Vec::with_capacity(request.subtasks.len());
    for subtask in &request.subtasks {
        let mut nested_state = ExecutionState {
            query: subtask.task.clone(),
            session_id: state.session_id.clone(),
            start_time: state.start_time,
            agent_outputs: HashMap::new(),
            execution_trace: Vec::new(),
            final_output: String::new(),
        };
        Box::pin(run_at_depth(
            ctx,
            &subtask.task,
            history_tail,
            depth + 1,
            ledger,
            &mut nested_state,
        ))
        .await?;
        state.execution_trace.extend(nested_state.execution_trace.clone());
        sub_results.push(format!("{}: {}", subtask.role, nested_state.final_output));
    }

    if sub_results.is_empty() {
        return Ok(String::new());
    }

    let synthesis = format!(
        "Original task: {}\n\nSub-agent results:\n{}\n\nCombine these results to complete your original task.",
        agent.task,
        sub_results
            .iter()
            .enumerate()
            .map(|(i, r)| format!("{}. {r}", i + 1))
            .collect::<Vec<_>>()
            .join("\n")
    );

    let mut messages = vec![Message::system(role.system_prompt)];
    messages.extend(history_tail.iter().cloned());
    messages.push(Message::user(synthesis));

    let completion = ctx
        .llm
        .complete(
            &messages,
            crate::llm::CompletionOptions {
                temperature: None,
                json_format: false,
                run_tags: vec![format!("{agent_id}_delegation_synthesis")],
                tools: None,
            },
        )
        .await
        .map_err(|e| OrchestrionError::AgentFailure {
            agent_id: agent_id.to_string(),
            message: e.to_string(),
        })?;

    if let Some(usage) = completion.token_usage {
        ledger.record_agent(agent_id, usage);
    }

    Ok(completion.text)
}

/// The last agent in the last execution layer is the plan's output, the way
/// the original engine keys `agent_outputs["<last-role>_<N-1>"]`;
/// `"No output generated"` is the default when that key is somehow absent.
fn final_output_of(agent_ids: &[String], outputs: &HashMap<String, String>) -> String {
    agent_ids
        .last()
        .and_then(|last_id| outputs.get(last_id))
        .cloned()
        .unwrap_or_else(|| "No output generated".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan_two_then_one() -> ExecutionPlan {
        ExecutionPlan {
            description: "d".into(),
            depth: 0,
            agents: vec![
                AgentSpec {
                    index: 0,
                    role: "researcher".into(),
                    task: "a".into(),
                    depends_on: vec![],
                    can_delegate: false,
                },
                AgentSpec {
                    index: 1,
                    role: "researcher".into(),
                    task: "b".into(),
                    depends_on: vec![],
                    can_delegate: false,
                },
                AgentSpec {
                    index: 2,
                    role: "synthesizer".into(),
                    task: "c".into(),
                    depends_on: vec![0, 1],
                    can_delegate: false,
                },
            ],
        }
    }

    #[test]
    fn final_output_is_last_agents_output() {
        let plan = plan_two_then_one();
        let agent_ids: Vec<String> = (0..plan.agents.len()).map(|i| plan.agent_id(i)).collect();
        let mut outputs = HashMap::new();
        outputs.insert(agent_ids[0].clone(), "r1".to_string());
        outputs.insert(agent_ids[1].clone(), "r2".to_string());
        outputs.insert(agent_ids[2].clone(), "final".to_string());
        assert_eq!(final_output_of(&agent_ids, &outputs), "final");
    }

    #[test]
    fn missing_final_output_defaults_to_the_standard_placeholder() {
        let agent_ids = vec!["analyzer_0".to_string()];
        let outputs = HashMap::new();
        assert_eq!(final_output_of(&agent_ids, &outputs), "No output generated");
    }
}
