//! Planner (C6): turns a user query into a validated [`ExecutionPlan`].
//!
//! Grounded on `planner.rs`'s prompt-construction shape: role catalog, a
//! worked example, trimmed prior turns, then the query, with a low
//! temperature and JSON-only output mode so the model is steered toward a
//! single parseable object rather than prose.

use crate::agent_runner;
use crate::complexity;
use crate::config::EngineConfig;
use crate::llm::{CompletionOptions, LlmAdapter, Message};
use crate::plan::{ExecutionPlan, PlanValidationOutcome};
use crate::role;
use crate::token::TokenLedger;
use crate::validator;

const WORKED_EXAMPLE: &str = r#"{"description":"Summarize recent developments in a topic","agents":[{"role":"researcher","task":"Gather recent information on the topic","depends_on":[]},{"role":"synthesizer","task":"Combine the findings into a final summary","depends_on":[0]}]}"#;

fn planning_prompt(query: &str, depth: u8, max_depth: u8, history: &[Message], config: &EngineConfig) -> Vec<Message> {
    let system = format!(
        "You are the planning module of a multi-agent orchestration engine. \
         Decompose the user's query into a JSON execution plan.\n\n\
         Available roles:\n{}\n\n\
         Respond with exactly one JSON object shaped like:\n{WORKED_EXAMPLE}\n\n\
         Rules:\n\
         - `depends_on` indices must be strictly less than the agent's own index.\n\
         - Use as few agents as necessary; do not pad the plan.\n\
         - Current recursion depth is {depth}, maximum allowed depth is {max_depth}.\n\
         - Respond with JSON only, no prose, no markdown fences.",
        role::describe()
    );

    let mut messages = vec![Message::system(system)];
    messages.extend(agent_runner::clipped_history_tail(history, config.agent_history_limit * 2));
    messages.push(Message::user(query.to_string()));
    messages
}

/// Produces an [`ExecutionPlan`] for `query` at recursion `depth`, recording
/// the planning LLM call's token usage on `ledger`.
pub async fn plan(
    llm: &dyn LlmAdapter,
    query: &str,
    depth: u8,
    history: &[Message],
    config: &EngineConfig,
    current_year: &str,
    ledger: &mut TokenLedger,
) -> ExecutionPlan {
    let max_depth = complexity::max_depth(query).min(config.max_depth_ceiling);
    let messages = planning_prompt(query, depth, max_depth, history, config);

    let options = CompletionOptions {
        temperature: Some(0.1),
        json_format: true,
        run_tags: vec!["planning".to_string()],
        tools: None,
    };

    let raw = match llm.complete(&messages, options).await {
        Ok(completion) => {
            if let Some(usage) = completion.token_usage {
                ledger.record_planning(usage);
            }
            completion.text
        }
        Err(e) => {
            log::warn!("planner: llm call failed ({e}), falling back to validator's deterministic plan");
            String::new()
        }
    };

    let outcome = validator::validate(&raw, query, depth, current_year);
    match &outcome {
        PlanValidationOutcome::Fallback(_) => {
            log::info!("planner: validator substituted the fallback plan for depth {depth}");
        }
        PlanValidationOutcome::Valid(plan) => {
            log::debug!("planner: validated a {}-agent plan at depth {depth}", plan.agents.len());
        }
    }
    outcome.into_plan()
}
