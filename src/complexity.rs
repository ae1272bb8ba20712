//! Complexity Heuristic (C9): maps query text to a recursion depth budget.
//!
//! Grounded textually on `orchestration.rs`'s `jaccard_similarity` — a plain
//! word-splitting, score-accumulating pure function with no external state.

const MULTI_STEP_MARKERS: &[&str] = &[
    "plan",
    "design",
    "create",
    "build",
    "develop",
    "comprehensive",
    "complete",
    "detailed",
    "step-by-step",
    "workflow",
    "process",
    "strategy",
    "roadmap",
    "architecture",
    "system",
];

const ANALYSIS_MARKERS: &[&str] = &[
    "compare",
    "analyze",
    "evaluate",
    "assess",
    "review",
    "investigate",
    "research",
    "study",
    "examine",
];

/// Scores `query` on lexical signals and maps the score to a depth budget in
/// `1..=5`.
pub fn max_depth(query: &str) -> u8 {
    let lower = query.to_lowercase();
    let words: Vec<&str> = lower.split_whitespace().collect();

    let mut score = 0.0_f64;

    for marker in MULTI_STEP_MARKERS {
        score += 2.0 * count_occurrences(&lower, marker) as f64;
    }
    for marker in ANALYSIS_MARKERS {
        score += 1.5 * count_occurrences(&lower, marker) as f64;
    }

    let and_count = count_occurrences(&lower, " and ");
    if and_count >= 1 {
        score += and_count as f64;
    }

    if words.len() > 20 {
        score += 2.0;
    } else if words.len() > 10 {
        score += 1.0;
    }

    let question_marks = query.matches('?').count();
    if question_marks > 1 {
        score += question_marks as f64;
    }

    depth_for_score(score)
}

fn depth_for_score(score: f64) -> u8 {
    if score >= 8.0 {
        5
    } else if score >= 5.0 {
        4
    } else if score >= 3.0 {
        3
    } else if score >= 1.0 {
        2
    } else {
        1
    }
}

fn count_occurrences(haystack: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    haystack.matches(needle).count()
}
