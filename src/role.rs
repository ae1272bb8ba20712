//! Fixed catalog of agent roles (C1).
//!
//! The role set is closed: a planner that proposes anything else has that
//! agent silently dropped by the plan validator. Lookup is case-insensitive
//! so that `"Researcher"` and `"researcher"` resolve to the same [`Role`].

use lazy_static::lazy_static;
use std::collections::{HashMap, HashSet};

/// An immutable, process-static description of one agent kind.
#[derive(Debug, Clone)]
pub struct Role {
    pub name: &'static str,
    pub system_prompt: &'static str,
    pub can_delegate: bool,
    pub needs_tools: bool,
    pub tool_servers: HashSet<&'static str>,
}

fn servers(names: &[&'static str]) -> HashSet<&'static str> {
    names.iter().copied().collect()
}

lazy_static! {
    static ref ROLES: HashMap<&'static str, Role> = {
        let mut map = HashMap::new();
        let mut insert = |role: Role| {
            map.insert(role.name, role);
        };
        insert(Role {
            name: "researcher",
            system_prompt: "You are a researcher. Gather and summarize relevant facts for the task, citing sources where tools provide them.",
            can_delegate: false,
            needs_tools: true,
            tool_servers: servers(&["websearch", "github", "memory"]),
        });
        insert(Role {
            name: "analyzer",
            system_prompt: "You are an analyzer. Examine the provided information and produce a clear, direct assessment.",
            can_delegate: false,
            needs_tools: false,
            tool_servers: servers(&[]),
        });
        insert(Role {
            name: "planner",
            system_prompt: "You are a planner. Break the task into an ordered sequence of steps.",
            can_delegate: true,
            needs_tools: false,
            tool_servers: servers(&[]),
        });
        insert(Role {
            name: "writer",
            system_prompt: "You are a writer. Compose a polished final answer from the material you are given.",
            can_delegate: false,
            needs_tools: false,
            tool_servers: servers(&[]),
        });
        insert(Role {
            name: "coder",
            system_prompt: "You are a coder. Produce correct, runnable code for the task using the tools available to you.",
            can_delegate: false,
            needs_tools: true,
            tool_servers: servers(&["filesystem", "github", "python", "database"]),
        });
        insert(Role {
            name: "critic",
            system_prompt: "You are a critic. Identify flaws, gaps and risks in the material you are given.",
            can_delegate: false,
            needs_tools: false,
            tool_servers: servers(&[]),
        });
        insert(Role {
            name: "synthesizer",
            system_prompt: "You are a synthesizer. Combine the outputs of the other agents into one coherent final answer.",
            can_delegate: false,
            needs_tools: false,
            tool_servers: servers(&[]),
        });
        insert(Role {
            name: "coordinator",
            system_prompt: "You are a coordinator. Decide whether this task should be delegated into subtasks, and to which roles.",
            can_delegate: true,
            needs_tools: false,
            tool_servers: servers(&[]),
        });
        insert(Role {
            name: "retriever",
            system_prompt: "You are a retriever. Fetch the most relevant stored material for the task.",
            can_delegate: false,
            needs_tools: true,
            tool_servers: servers(&["memory", "database"]),
        });
        map
    };
}

/// Looks up a role by name, case-insensitively.
pub fn get(name: &str) -> Option<&'static Role> {
    ROLES.get(name.to_lowercase().as_str())
}

/// Lists the closed set of registered role names.
pub fn list_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = ROLES.keys().copied().collect();
    names.sort_unstable();
    names
}

/// Human-readable description of the whole registry, one line per role.
pub fn describe() -> String {
    list_names()
        .into_iter()
        .map(|name| {
            let role = ROLES.get(name).expect("name came from the registry");
            format!("{}: {}", role.name, role.system_prompt)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
