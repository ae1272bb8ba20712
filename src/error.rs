//! The error taxonomy shared across the planner, scheduler and gateway.
//!
//! Every failure mode named in the design is a variant of [`OrchestrionError`]
//! rather than a scattered collection of ad-hoc error types. Most variants are
//! handled locally (see the variant docs for the recovery path); only
//! [`OrchestrionError::Cancelled`] and a scheduler-level
//! [`OrchestrionError::Cycle`] that survives fallback are meant to propagate
//! all the way to the caller.

use std::fmt;

/// Unified error type for the orchestration engine.
#[derive(Debug, Clone)]
pub enum OrchestrionError {
    /// The plan validator could not produce a single valid agent.
    ///
    /// Recovery: the caller substitutes the deterministic fallback plan and
    /// continues; this variant is informational when logged, not terminal.
    InvalidPlan(String),
    /// The planner proposed a role outside the closed registry.
    ///
    /// Recovery: the offending agent is dropped and the rejection recorded.
    RoleUnknown(String),
    /// The dependency graph contains a cycle that best-effort repair could
    /// not remove.
    ///
    /// Recovery: degrade to sequential layering (one agent per layer).
    Cycle,
    /// An individual agent's LLM or tool work failed.
    ///
    /// Recovery: recorded in the trace; the agent's output becomes the error
    /// string and downstream agents proceed using it as dependency context.
    AgentFailure { agent_id: String, message: String },
    /// The circuit breaker for a backend is open.
    ToolUnavailable { backend: String },
    /// A tool call exceeded its timeout after exhausting retries.
    ToolTimeout { backend: String, tool: String },
    /// A tool call returned a non-2xx HTTP response.
    ToolUpstream {
        backend: String,
        tool: String,
        status: u16,
        body: String,
    },
    /// The run was cancelled via the caller's cancellation token.
    Cancelled,
    /// The LLM adapter raised a transport or protocol error.
    Llm(String),
    /// The gateway could not serve a request for a reason unrelated to the
    /// circuit breaker (malformed backend config, internal panic, etc).
    GatewayInternal(String),
    /// The requested backend or tool is not registered with the gateway.
    NotFound(String),
}

impl fmt::Display for OrchestrionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrchestrionError::InvalidPlan(reason) => write!(f, "invalid plan: {reason}"),
            OrchestrionError::RoleUnknown(role) => write!(f, "unknown role: {role}"),
            OrchestrionError::Cycle => write!(f, "dependency graph contains a cycle"),
            OrchestrionError::AgentFailure { agent_id, message } => {
                write!(f, "agent {agent_id} failed: {message}")
            }
            OrchestrionError::ToolUnavailable { backend } => {
                write!(f, "backend {backend} unavailable (circuit open)")
            }
            OrchestrionError::ToolTimeout { backend, tool } => {
                write!(f, "tool {backend}/{tool} timed out")
            }
            OrchestrionError::ToolUpstream {
                backend,
                tool,
                status,
                body,
            } => write!(
                f,
                "tool {backend}/{tool} upstream error {status}: {body}"
            ),
            OrchestrionError::Cancelled => write!(f, "run cancelled"),
            OrchestrionError::Llm(message) => write!(f, "llm error: {message}"),
            OrchestrionError::GatewayInternal(message) => {
                write!(f, "gateway internal error: {message}")
            }
            OrchestrionError::NotFound(what) => write!(f, "not found: {what}"),
        }
    }
}

impl std::error::Error for OrchestrionError {}

pub type OrchestrionResult<T> = Result<T, OrchestrionError>;
