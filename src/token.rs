//! Token Accounting (C10): aggregates per-agent and planning token usage.
//!
//! Grounded on `orchestration.rs`'s `total_tokens_used` accumulation pattern,
//! generalized from one running total into a per-agent breakdown plus a
//! dedicated planning bucket.

use crate::llm::TokenUsage;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
struct Bucket {
    usage: TokenUsage,
    calls: u32,
}

/// Accumulates token usage across one run: one bucket per agent id plus a
/// separate "planning" bucket for the planner's own LLM call.
#[derive(Debug, Default)]
pub struct TokenLedger {
    planning: Bucket,
    per_agent: HashMap<String, Bucket>,
}

/// Per-agent line plus the grand totals, as returned by
/// [`TokenLedger::summary`].
#[derive(Debug, Clone)]
pub struct TokenSummary {
    pub total: TokenUsage,
    pub planning_total: TokenUsage,
    pub per_agent: Vec<(String, TokenUsage, u32)>,
}

impl TokenLedger {
    pub fn new() -> Self {
        TokenLedger::default()
    }

    pub fn record_planning(&mut self, usage: TokenUsage) {
        self.planning.usage += usage;
        self.planning.calls += 1;
    }

    pub fn record_agent(&mut self, agent_id: &str, usage: TokenUsage) {
        let bucket = self.per_agent.entry(agent_id.to_string()).or_default();
        bucket.usage += usage;
        bucket.calls += 1;
    }

    pub fn summary(&self) -> TokenSummary {
        let mut per_agent: Vec<(String, TokenUsage, u32)> = self
            .per_agent
            .iter()
            .map(|(id, bucket)| (id.clone(), bucket.usage, bucket.calls))
            .collect();
        per_agent.sort_by(|a, b| a.0.cmp(&b.0));

        let agents_total = per_agent
            .iter()
            .fold(TokenUsage::default(), |acc, (_, usage, _)| acc + *usage);

        TokenSummary {
            total: agents_total + self.planning.usage,
            planning_total: self.planning.usage,
            per_agent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(total: u64) -> TokenUsage {
        TokenUsage {
            prompt: total / 2,
            completion: total - total / 2,
            total,
        }
    }

    #[test]
    fn total_equals_planning_plus_sum_of_agents() {
        let mut ledger = TokenLedger::new();
        ledger.record_planning(usage(10));
        ledger.record_agent("researcher_0", usage(20));
        ledger.record_agent("synthesizer_1", usage(15));

        let summary = ledger.summary();
        assert_eq!(summary.planning_total.total, 10);
        assert_eq!(summary.total.total, 45);
        assert_eq!(summary.per_agent.len(), 2);
    }

    #[test]
    fn repeated_calls_to_same_agent_accumulate_and_count() {
        let mut ledger = TokenLedger::new();
        ledger.record_agent("coder_2", usage(5));
        ledger.record_agent("coder_2", usage(5));

        let summary = ledger.summary();
        let (_, total, calls) = &summary.per_agent[0];
        assert_eq!(total.total, 10);
        assert_eq!(*calls, 2);
    }
}
