//! `orchestrion-cli`: reads a query from the command line and runs one
//! orchestration end to end against a configured LLM backend and gateway,
//! printing the final output and a token usage summary.

use orchestrion::config::{EngineConfig, LlmConfig};
use orchestrion::{run_context, scheduler, token::TokenLedger, HttpLlmAdapter, ToolClient};

#[tokio::main]
async fn main() {
    env_logger::init();

    let query = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if query.trim().is_empty() {
        eprintln!("usage: orchestrion-cli <query...>");
        std::process::exit(2);
    }

    let llm_config = LlmConfig::from_env();
    let llm = HttpLlmAdapter::new(llm_config.base_url, llm_config.model, llm_config.api_key);
    let gateway_url = std::env::var("GATEWAY_URL").unwrap_or_else(|_| "http://127.0.0.1:8088".to_string());
    let tool_client = ToolClient::new(gateway_url);
    let engine_config = EngineConfig::from_env();

    let ctx = run_context(&llm, &tool_client, &engine_config);
    let mut ledger = TokenLedger::new();

    match scheduler::run(&ctx, &query, &[], &mut ledger).await {
        Ok(state) => {
            println!("{}", state.final_output);
            let summary = ledger.summary();
            log::info!(
                "tokens used: {} (planning: {})",
                summary.total.total,
                summary.planning_total.total
            );
        }
        Err(e) => {
            eprintln!("orchestration failed: {e}");
            std::process::exit(1);
        }
    }
}
