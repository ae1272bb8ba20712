//! A DAG-scheduled multi-agent orchestration engine.
//!
//! A query is turned into an [`plan::ExecutionPlan`] by the [`planner`], the
//! plan is validated and repaired by the [`validator`], and the
//! [`scheduler`] executes it layer by layer, dispatching each agent through
//! the [`agent_runner`] and, when an agent needs tools, the [`tool_client`]
//! against a [`gateway`].

pub mod agent_runner;
pub mod complexity;
pub mod config;
pub mod error;
pub mod gateway;
pub mod llm;
pub mod plan;
pub mod planner;
pub mod role;
pub mod scheduler;
pub mod token;
pub mod tool_client;
pub mod validator;

pub use error::{OrchestrionError, OrchestrionResult};
pub use llm::{HttpLlmAdapter, LlmAdapter};
pub use plan::ExecutionPlan;
pub use scheduler::{ExecutionState, RunContext};
pub use tool_client::ToolClient;

use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Convenience constructor for a [`RunContext`] wired from [`config::EngineConfig`]
/// and [`config::GatewayConfig`]-free defaults: one global semaphore bounding
/// in-flight agents, a fresh cancellation token, and the current UTC year for
/// the planner's "is this query time-sensitive" fallback check.
pub fn run_context<'a>(
    llm: &'a dyn LlmAdapter,
    tool_client: &'a ToolClient,
    engine_config: &'a config::EngineConfig,
) -> RunContext<'a> {
    RunContext {
        llm,
        tool_client,
        config: engine_config,
        current_year: chrono::Utc::now().format("%Y").to_string(),
        semaphore: Arc::new(Semaphore::new(engine_config.max_parallel_agents)),
        cancellation: CancellationToken::new(),
    }
}
