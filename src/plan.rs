//! The plan data model (§3) and the pure layering algorithm it carries.
//!
//! Grounded on `original_source/src/coordinator/plan.py`'s `ExecutionPlan`:
//! dependency graph construction and Kahn's-algorithm layering are kept as
//! inherent methods here rather than free functions so the scheduler and the
//! testable-properties suite in `tests/` can call `plan.execution_layers()`
//! directly.

use serde::{Deserialize, Serialize};

/// `index` (0-based position in the plan), `role`, `task` (free text),
/// `depends_on` (indices strictly less than `index`), `can_delegate` (derived
/// from the role at validation time).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSpec {
    pub index: usize,
    pub role: String,
    pub task: String,
    pub depends_on: Vec<usize>,
    pub can_delegate: bool,
}

/// `description`, an ordered sequence of [`AgentSpec`], and `depth` (recursion
/// level, 0 at root).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub description: String,
    pub agents: Vec<AgentSpec>,
    #[serde(default)]
    pub depth: u8,
}

/// Outcome of running a raw planner string through the plan validator:
/// either a validated plan, or the deterministic fallback plan substituted in
/// its place. Kept as a closed tagged record per the redesign note in §9
/// rather than a raw boolean-plus-plan pair.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanValidationOutcome {
    Valid(ExecutionPlan),
    Fallback(ExecutionPlan),
}

impl PlanValidationOutcome {
    pub fn into_plan(self) -> ExecutionPlan {
        match self {
            PlanValidationOutcome::Valid(plan) => plan,
            PlanValidationOutcome::Fallback(plan) => plan,
        }
    }
}

impl ExecutionPlan {
    /// Maps each agent index to the list of indices it depends on, filtering
    /// out self-dependencies and out-of-range indices the way the original
    /// `get_dependency_graph` tolerates malformed input defensively.
    pub fn dependency_graph(&self) -> Vec<Vec<usize>> {
        let n = self.agents.len();
        self.agents
            .iter()
            .enumerate()
            .map(|(i, agent)| {
                agent
                    .depends_on
                    .iter()
                    .copied()
                    .filter(|&d| d < n && d != i)
                    .collect()
            })
            .collect()
    }

    /// Groups agent indices into execution layers via Kahn's algorithm: each
    /// layer is the set of indices whose dependencies are all satisfied by
    /// earlier layers. If the graph has a cycle, no more zero-in-degree nodes
    /// can be found and the function degrades to one agent per layer, in
    /// index order, over the remaining nodes.
    pub fn execution_layers(&self) -> Vec<Vec<usize>> {
        self.layer_with_cycle_flag().0
    }

    /// True when Kahn's algorithm could not make progress and the layering
    /// had to degrade to one agent per layer.
    pub fn has_cycle(&self) -> bool {
        self.layer_with_cycle_flag().1
    }

    fn layer_with_cycle_flag(&self) -> (Vec<Vec<usize>>, bool) {
        let graph = self.dependency_graph();
        let n = graph.len();

        // in_degree[i] = number of not-yet-emitted dependencies of i.
        let mut in_degree: Vec<usize> = graph.iter().map(|deps| deps.len()).collect();
        let mut remaining: Vec<bool> = vec![true; n];
        let mut remaining_count = n;
        let mut layers = Vec::new();

        while remaining_count > 0 {
            let current_layer: Vec<usize> = (0..n)
                .filter(|&i| remaining[i] && in_degree[i] == 0)
                .collect();

            if current_layer.is_empty() {
                // Cycle detected: fall back to sequential layering over what's left.
                let rest: Vec<Vec<usize>> = (0..n).filter(|&i| remaining[i]).map(|i| vec![i]).collect();
                layers.extend(rest);
                return (layers, true);
            }

            for &node in &current_layer {
                remaining[node] = false;
                remaining_count -= 1;
            }
            for (i, deps) in graph.iter().enumerate() {
                if remaining[i] {
                    for &dep in deps {
                        if current_layer.contains(&dep) {
                            in_degree[i] -= 1;
                        }
                    }
                }
            }

            layers.push(current_layer);
        }

        (layers, false)
    }

    pub fn agent_id(&self, index: usize) -> String {
        match self.agents.get(index) {
            Some(agent) => format!("{}_{}", agent.role, index),
            None => format!("unknown_{index}"),
        }
    }
}
