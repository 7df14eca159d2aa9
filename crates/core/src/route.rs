// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Keyword-weighted intent router.
//!
//! Maps a natural-language request to one primitive plus extracted
//! parameters. Retained as a library for offline use; the serving host
//! selects primitives with its own language capability, so this is not
//! exposed as a tool.
//!
//! Scoring is deterministic and data-driven: the table below is the whole
//! model, and the weights are consts so tests can target them.

use regex::Regex;
use std::sync::LazyLock;

/// Score added per matched primary keyword.
pub const PRIMARY_WEIGHT: i32 = 50;
/// Score added per matched context keyword.
pub const CONTEXT_WEIGHT: i32 = 10;
/// Boost for a literal task id whose origin matches the primitive.
pub const TASK_ID_MATCH_BOOST: i32 = 40;
/// Penalty for a literal task id of the other origin.
pub const TASK_ID_MISMATCH_PENALTY: i32 = -30;
/// Boost for an explicit "in the cloud" phrasing on cloud primitives.
pub const CLOUD_PHRASE_BOOST: i32 = 25;
/// Penalty the same phrasing applies to local primitives.
pub const CLOUD_PHRASE_PENALTY: i32 = -20;
/// A single candidate at or above this confidence is selected outright.
pub const SELECT_CONFIDENCE: i32 = 70;
/// A candidate this far ahead of the runner-up is selected outright.
pub const SELECT_GAP: i32 = 20;
/// How many alternatives a disambiguation response lists.
pub const DISAMBIGUATION_LIMIT: usize = 3;

/// Declarative routing entry for one primitive.
pub struct RouteSpec {
    pub primitive: &'static str,
    pub base: i32,
    pub keywords: &'static [&'static str],
    pub context_keywords: &'static [&'static str],
}

/// The routing table. Order is presentation order on ties.
pub const ROUTES: &[RouteSpec] = &[
    RouteSpec {
        primitive: "local_run",
        base: 0,
        keywords: &["run", "perform"],
        context_keywords: &["here", "locally", "repo"],
    },
    RouteSpec {
        primitive: "local_exec",
        base: 0,
        keywords: &["exec", "background", "kick off"],
        context_keywords: &["async", "long", "meanwhile"],
    },
    RouteSpec {
        primitive: "local_resume",
        base: 0,
        keywords: &["resume", "continue", "follow up"],
        context_keywords: &["thread", "again", "previous"],
    },
    RouteSpec {
        primitive: "local_status",
        base: 0,
        keywords: &["status"],
        context_keywords: &["check", "progress", "going", "tasks"],
    },
    RouteSpec {
        primitive: "local_results",
        base: 0,
        keywords: &["results", "result", "output"],
        context_keywords: &["show", "final", "finished"],
    },
    RouteSpec {
        primitive: "local_wait",
        base: 0,
        keywords: &["wait"],
        context_keywords: &["until", "finish", "done", "block"],
    },
    RouteSpec {
        primitive: "local_cancel",
        base: 0,
        keywords: &["cancel", "stop", "abort", "kill"],
        context_keywords: &["task", "running"],
    },
    RouteSpec {
        primitive: "cloud_submit",
        base: 0,
        keywords: &["submit", "run", "execute", "launch"],
        context_keywords: &["cloud", "remote", "hosted", "environment"],
    },
    RouteSpec {
        primitive: "cloud_status",
        base: 0,
        keywords: &["status"],
        context_keywords: &["check", "cloud", "remote", "progress"],
    },
    RouteSpec {
        primitive: "cloud_results",
        base: 0,
        keywords: &["results", "result", "output"],
        context_keywords: &["cloud", "remote", "show"],
    },
    RouteSpec {
        primitive: "cloud_wait",
        base: 0,
        keywords: &["wait"],
        context_keywords: &["cloud", "remote", "until", "finish"],
    },
    RouteSpec {
        primitive: "cloud_cancel",
        base: 0,
        keywords: &["cancel", "stop", "abort"],
        context_keywords: &["cloud", "remote"],
    },
    RouteSpec {
        primitive: "cloud_list_environments",
        base: 0,
        keywords: &["environments", "environment"],
        context_keywords: &["list", "configured", "available", "which"],
    },
    RouteSpec {
        primitive: "cloud_github_setup",
        base: 0,
        keywords: &["github", "setup"],
        context_keywords: &["repo", "repository", "connect", "integration"],
    },
];

static TASK_ID_RE: LazyLock<Regex> = LazyLock::new(task_id_regex);

#[allow(clippy::unwrap_used)] // literal pattern, covered by tests
fn task_id_regex() -> Regex {
    Regex::new(r"\bT-(local|cloud)-[a-z0-9]+\b").unwrap()
}

/// One scored candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    pub primitive: &'static str,
    pub confidence: i32,
    /// Task id literal found in the request, if any.
    pub task_id: Option<String>,
    /// The request text, carried for task-creating primitives.
    pub instruction: Option<String>,
}

/// Router verdict: a single selection or a short list of alternatives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    Selected(RouteMatch),
    Ambiguous { candidates: Vec<RouteMatch> },
}

fn creates_task(primitive: &str) -> bool {
    matches!(
        primitive,
        "local_run" | "local_exec" | "local_resume" | "cloud_submit"
    )
}

/// Classify a request.
pub fn route(request: &str) -> RouteDecision {
    let text = request.to_lowercase();
    let id_literal = TASK_ID_RE
        .find(request)
        .map(|m| m.as_str().to_string());
    let id_origin = id_literal.as_deref().map(|id| {
        if id.starts_with("T-cloud-") {
            "cloud"
        } else {
            "local"
        }
    });
    let cloud_phrase = text.contains("in the cloud") || text.contains("on the cloud");

    let mut scored: Vec<RouteMatch> = ROUTES
        .iter()
        .map(|spec| {
            let mut score = spec.base;
            for kw in spec.keywords {
                if text.contains(kw) {
                    score += PRIMARY_WEIGHT;
                }
            }
            for kw in spec.context_keywords {
                if text.contains(kw) {
                    score += CONTEXT_WEIGHT;
                }
            }
            let spec_origin = spec
                .primitive
                .split('_')
                .next()
                .unwrap_or_default();
            if let Some(origin) = id_origin {
                score += if origin == spec_origin {
                    TASK_ID_MATCH_BOOST
                } else {
                    TASK_ID_MISMATCH_PENALTY
                };
            }
            if cloud_phrase {
                score += if spec_origin == "cloud" {
                    CLOUD_PHRASE_BOOST
                } else {
                    CLOUD_PHRASE_PENALTY
                };
            }
            RouteMatch {
                primitive: spec.primitive,
                confidence: score.clamp(0, 100),
                task_id: id_literal.clone(),
                instruction: creates_task(spec.primitive).then(|| request.to_string()),
            }
        })
        .collect();

    // Stable sort keeps table order on equal confidence.
    scored.sort_by(|a, b| b.confidence.cmp(&a.confidence));

    let top = scored[0].confidence;
    let runner_up = scored.get(1).map(|m| m.confidence).unwrap_or(0);
    if top >= SELECT_CONFIDENCE || top - runner_up >= SELECT_GAP {
        let mut selected = scored.swap_remove(0);
        if !creates_task(selected.primitive) {
            selected.instruction = None;
        }
        RouteDecision::Selected(selected)
    } else {
        RouteDecision::Ambiguous {
            candidates: scored
                .into_iter()
                .filter(|m| m.confidence > 0)
                .take(DISAMBIGUATION_LIMIT)
                .collect(),
        }
    }
}

#[cfg(test)]
#[path = "route_tests.rs"]
mod tests;
