//! End-to-end scenarios over [`orchestrion::scheduler::run`] against a stub
//! [`LlmAdapter`], exercising the planner → validator → scheduler path
//! without any real network calls.

use async_trait::async_trait;
use orchestrion::config::EngineConfig;
use orchestrion::error::OrchestrionResult;
use orchestrion::llm::{Completion, CompletionOptions, Message};
use orchestrion::{run_context, scheduler, token::TokenLedger, LlmAdapter, ToolClient};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Routes each `complete` call by the first user message it sees, so a test
/// can script the planner's call and every agent's call independently.
struct ScriptedLlm {
    by_marker: HashMap<&'static str, &'static str>,
    default_response: &'static str,
    calls: AtomicUsize,
}

impl ScriptedLlm {
    fn new(default_response: &'static str) -> Self {
        ScriptedLlm {
            by_marker: HashMap::new(),
            default_response,
            calls: AtomicUsize::new(0),
        }
    }

    fn with(mut self, marker: &'static str, response: &'static str) -> Self {
        self.by_marker.insert(marker, response);
        self
    }
}

#[async_trait]
impl LlmAdapter for ScriptedLlm {
    async fn complete(&self, messages: &[Message], _options: CompletionOptions) -> OrchestrionResult<Completion> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let haystack: String = messages.iter().map(|m| m.content.as_ref()).collect::<Vec<_>>().join("\n");
        let text = self
            .by_marker
            .iter()
            .find(|(marker, _)| haystack.contains(*marker))
            .map(|(_, response)| *response)
            .unwrap_or(self.default_response);
        Ok(Completion {
            text: text.to_string(),
            tool_calls: vec![],
            token_usage: None,
        })
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// S1: a single-agent plan with no dependencies runs once and its output is
/// the final answer.
#[tokio::test]
async fn greeting_produces_a_single_agent_run() {
    let llm = ScriptedLlm::new(r#"{"agents":[{"role":"analyzer","task":"say hi"}]}"#)
        .with("Your task: say hi", "hello there");
    let tool_client = ToolClient::new("http://127.0.0.1:1");
    let config = EngineConfig::default();
    let ctx = run_context(&llm, &tool_client, &config);
    let mut ledger = TokenLedger::new();

    let state = scheduler::run(&ctx, "hi", &[], &mut ledger).await.unwrap();

    assert_eq!(state.execution_trace.len(), 1);
    assert_eq!(state.final_output, "hello there");
}

/// S2: two independent researchers feed a synthesizer. Both researchers run
/// in the same layer; the synthesizer's dependency context must contain both
/// of their outputs, and its own output is the final answer.
#[tokio::test]
async fn two_researchers_then_a_synthesizer_combines_both_outputs() {
    let plan = r#"{"agents":[
        {"role":"researcher","task":"find A","depends_on":[]},
        {"role":"researcher","task":"find B","depends_on":[]},
        {"role":"synthesizer","task":"combine","depends_on":[0,1]}
    ]}"#;
    let llm = ScriptedLlm::new(plan)
        .with("find A", "fact about A")
        .with("find B", "fact about B")
        .with(
            "Your task: combine",
            "synthesis of fact about A and fact about B",
        );
    let tool_client = ToolClient::new("http://127.0.0.1:1");
    let config = EngineConfig::default();
    let ctx = run_context(&llm, &tool_client, &config);
    let mut ledger = TokenLedger::new();

    let state = scheduler::run(&ctx, "research A and B", &[], &mut ledger).await.unwrap();

    assert_eq!(state.execution_trace.len(), 3);
    assert_eq!(state.final_output, "synthesis of fact about A and fact about B");
    let layers: Vec<usize> = state.execution_trace.iter().map(|e| e.layer).collect();
    assert_eq!(layers.iter().filter(|&&l| l == 0).count(), 2);
    assert_eq!(layers.iter().filter(|&&l| l == 1).count(), 1);
}

/// A validated plan can never carry a cycle (the validator rejects forward
/// and self dependencies before a plan is handed to the scheduler; see
/// `validator::logically_valid` and `plan::execution_layers`'s own
/// degrade-on-cycle unit tests for that path in isolation). What the
/// scheduler itself must get right is a three-deep dependency chain: each
/// agent becomes its own layer and runs only after its predecessor.
#[tokio::test]
async fn three_deep_dependency_chain_runs_one_layer_at_a_time() {
    let plan = r#"{"agents":[
        {"role":"researcher","task":"a","depends_on":[]},
        {"role":"analyzer","task":"b","depends_on":[0]},
        {"role":"writer","task":"c","depends_on":[1]}
    ]}"#;
    let llm = ScriptedLlm::new(plan)
        .with("Your task: a", "step a done")
        .with("Your task: b", "step b done")
        .with("Your task: c", "step c done");
    let tool_client = ToolClient::new("http://127.0.0.1:1");
    let config = EngineConfig::default();
    let ctx = run_context(&llm, &tool_client, &config);
    let mut ledger = TokenLedger::new();

    let state = scheduler::run(&ctx, "chain this", &[], &mut ledger).await.unwrap();

    assert_eq!(state.execution_trace.len(), 3);
    assert_eq!(state.final_output, "step c done");
    let layers: Vec<usize> = state.execution_trace.iter().map(|e| e.layer).collect();
    assert_eq!(layers, vec![0, 1, 2]);
}

/// S6: a planner proposing an unknown role has that agent silently dropped
/// by the validator; if nothing survives, the deterministic fallback plan
/// runs instead, so the overall run still completes.
#[tokio::test]
async fn unknown_role_is_dropped_and_the_run_still_completes() {
    let plan = r#"{"agents":[{"role":"architect","task":"design a system"}]}"#;
    let llm = ScriptedLlm::new(plan).with("Your task:", "fallback answer");
    let tool_client = ToolClient::new("http://127.0.0.1:1");
    let config = EngineConfig::default();
    let ctx = run_context(&llm, &tool_client, &config);
    let mut ledger = TokenLedger::new();

    let state = scheduler::run(&ctx, "design a system", &[], &mut ledger).await.unwrap();

    // The fallback plan for a non-timely query is a single analyzer agent.
    assert_eq!(state.execution_trace.len(), 1);
    assert_eq!(state.execution_trace[0].role, "analyzer");
}

/// Testable property: a layer barriers on every one of its agents before the
/// next layer's agents are dispatched, even when one agent in the layer is
/// slower than the others.
#[tokio::test]
async fn layer_barrier_waits_for_the_slowest_agent_in_the_layer() {
    struct BarrierLlm {
        order: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LlmAdapter for BarrierLlm {
        async fn complete(&self, messages: &[Message], _options: CompletionOptions) -> OrchestrionResult<Completion> {
            let haystack: String = messages.iter().map(|m| m.content.as_ref()).collect::<Vec<_>>().join("\n");
            // Check the most specific (agent-task) markers first: the
            // original query text is echoed into every agent's prompt, so a
            // marker on the query alone would also match later calls.
            if haystack.contains("Your task: slow one") {
                tokio::time::sleep(std::time::Duration::from_millis(40)).await;
                self.order.lock().unwrap().push("slow".to_string());
                return Ok(Completion {
                    text: "slow result".to_string(),
                    tool_calls: vec![],
                    token_usage: None,
                });
            }
            if haystack.contains("Your task: fast one") {
                self.order.lock().unwrap().push("fast".to_string());
                return Ok(Completion {
                    text: "fast result".to_string(),
                    tool_calls: vec![],
                    token_usage: None,
                });
            }
            if haystack.contains("Your task: combine") {
                self.order.lock().unwrap().push("synthesizer".to_string());
                return Ok(Completion {
                    text: "combined".to_string(),
                    tool_calls: vec![],
                    token_usage: None,
                });
            }
            // Only the initial planning call falls through to here.
            Ok(Completion {
                text: r#"{"agents":[
                    {"role":"researcher","task":"slow one","depends_on":[]},
                    {"role":"researcher","task":"fast one","depends_on":[]},
                    {"role":"synthesizer","task":"combine","depends_on":[0,1]}
                ]}"#
                    .to_string(),
                tool_calls: vec![],
                token_usage: None,
            })
        }

        fn model_name(&self) -> &str {
            "barrier"
        }
    }

    let llm = BarrierLlm { order: Mutex::new(Vec::new()) };
    let tool_client = ToolClient::new("http://127.0.0.1:1");
    let config = EngineConfig::default();
    let ctx = run_context(&llm, &tool_client, &config);
    let mut ledger = TokenLedger::new();

    scheduler::run(&ctx, "say hi", &[], &mut ledger).await.unwrap();

    let order = llm.order.lock().unwrap().clone();
    assert_eq!(order.last().unwrap(), "synthesizer");
    assert_eq!(order.len(), 3);
}

/// Testable property: the scheduler never runs more agents concurrently
/// than `max_parallel_agents`, even within a single wide layer.
#[tokio::test]
async fn concurrency_never_exceeds_the_configured_cap() {
    struct CappedLlm {
        in_flight: AtomicUsize,
        max_observed: AtomicUsize,
    }

    #[async_trait]
    impl LlmAdapter for CappedLlm {
        async fn complete(&self, messages: &[Message], _options: CompletionOptions) -> OrchestrionResult<Completion> {
            let haystack: String = messages.iter().map(|m| m.content.as_ref()).collect::<Vec<_>>().join("\n");
            if haystack.contains("Your task: leaf") {
                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_observed.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                return Ok(Completion {
                    text: "leaf done".to_string(),
                    tool_calls: vec![],
                    token_usage: None,
                });
            }
            // Only the initial planning call falls through to here.
            let agents: Vec<String> = (0..6)
                .map(|i| format!(r#"{{"role":"researcher","task":"leaf {i}","depends_on":[]}}"#))
                .collect();
            Ok(Completion {
                text: format!(r#"{{"agents":[{}]}}"#, agents.join(",")),
                tool_calls: vec![],
                token_usage: None,
            })
        }

        fn model_name(&self) -> &str {
            "capped"
        }
    }

    let llm = CappedLlm {
        in_flight: AtomicUsize::new(0),
        max_observed: AtomicUsize::new(0),
    };
    let tool_client = ToolClient::new("http://127.0.0.1:1");
    let mut config = EngineConfig::default();
    config.max_parallel_agents = 2;
    let ctx = run_context(&llm, &tool_client, &config);
    let mut ledger = TokenLedger::new();

    scheduler::run(&ctx, "fan out", &[], &mut ledger).await.unwrap();

    assert!(llm.max_observed.load(Ordering::SeqCst) <= 2);
}

/// Testable property: a cancelled run returns `Cancelled` instead of
/// executing any layer.
#[tokio::test]
async fn cancellation_before_the_run_starts_short_circuits_immediately() {
    let llm = ScriptedLlm::new(r#"{"agents":[{"role":"analyzer","task":"x"}]}"#);
    let tool_client = ToolClient::new("http://127.0.0.1:1");
    let config = EngineConfig::default();
    let ctx = run_context(&llm, &tool_client, &config);
    ctx.cancellation.cancel();
    let mut ledger = TokenLedger::new();

    let result = scheduler::run(&ctx, "hi", &[], &mut ledger).await;

    assert!(matches!(result, Err(orchestrion::OrchestrionError::Cancelled)));
    assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
}

/// A `coordinator` agent that chooses to delegate spawns a fully independent,
/// re-planned nested run for its one subtask, then synthesizes the nested
/// run's output into its own final answer - exercising the whole
/// plan → delegate → nested-plan → nested-agent → synthesize chain end to
/// end with no mocked intermediate step.
#[tokio::test]
async fn coordinator_delegation_runs_a_nested_plan_and_synthesizes_its_output() {
    struct DelegatingLlm;

    #[async_trait]
    impl LlmAdapter for DelegatingLlm {
        async fn complete(&self, messages: &[Message], _options: CompletionOptions) -> OrchestrionResult<Completion> {
            let haystack: String = messages.iter().map(|m| m.content.as_ref()).collect::<Vec<_>>().join("\n");

            // Most specific markers first, since the root query and the
            // subtask query are both echoed into every downstream prompt.
            if haystack.contains("Combine these results to complete your original task.") {
                return Ok(reply("final synthesized answer"));
            }
            if haystack.contains("Your task: summarize findings") {
                return Ok(reply("nested analysis output"));
            }
            if haystack.contains("Your task: handle the project") {
                return Ok(reply(
                    r#"{"needs_delegation": true, "subtasks": [{"role": "researcher", "task": "research the subtopic"}]}"#,
                ));
            }
            if haystack.contains("research the subtopic") {
                return Ok(reply(
                    r#"{"agents":[{"role":"analyzer","task":"summarize findings","depends_on":[]}]}"#,
                ));
            }
            // Only the root planning call falls through to here.
            Ok(reply(r#"{"agents":[{"role":"coordinator","task":"handle the project","depends_on":[]}]}"#))
        }

        fn model_name(&self) -> &str {
            "delegating"
        }
    }

    fn reply(text: &str) -> Completion {
        Completion {
            text: text.to_string(),
            tool_calls: vec![],
            token_usage: None,
        }
    }

    let llm = DelegatingLlm;
    let tool_client = ToolClient::new("http://127.0.0.1:1");
    let config = EngineConfig::default();
    let ctx = run_context(&llm, &tool_client, &config);
    let mut ledger = TokenLedger::new();

    let state = scheduler::run(&ctx, "please coordinate this project", &[], &mut ledger)
        .await
        .unwrap();

    assert_eq!(state.final_output, "final synthesized answer");
    // The top-level coordinator plus the one nested analyzer both show up in
    // the flattened trace, tagged with their respective depths.
    assert_eq!(state.execution_trace.len(), 2);
    assert!(state.execution_trace.iter().any(|e| e.role == "coordinator" && e.depth == 0));
    assert!(state.execution_trace.iter().any(|e| e.role == "analyzer" && e.depth == 1));
}
