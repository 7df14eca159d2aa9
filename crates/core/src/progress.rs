// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Progress inference: a pure fold from an agent event sequence into a
//! structured snapshot.
//!
//! Replaying the same events always yields the same snapshot; the fold
//! keeps no state outside its arguments so live updates and post-hoc
//! recomputation agree.

use crate::event::{AgentEvent, ItemKind, ItemPayload};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Per-item lifecycle state within the fold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    InProgress,
    Completed,
}

impl StepState {
    fn as_str(&self) -> &'static str {
        match self {
            StepState::InProgress => "in_progress",
            StepState::Completed => "completed",
        }
    }
}

/// One entry in the snapshot's step list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSummary {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub status: String,
}

/// Structured progress view of a running or finished task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub current_action: String,
    pub total_steps: usize,
    pub completed_steps: usize,
    /// `floor(100 * completed / total)`, zero when no steps have started.
    pub progress_percentage: u8,
    pub files_changed: usize,
    pub commands_executed: usize,
    pub steps: Vec<StepSummary>,
    pub is_complete: bool,
    pub has_failed: bool,
}

/// Tracked item: latest payload, latest state, first-seen order.
struct ItemTrack {
    payload: ItemPayload,
    state: StepState,
}

/// Fold an event sequence into a [`ProgressSnapshot`].
pub fn infer_progress(events: &[AgentEvent]) -> ProgressSnapshot {
    let mut order: Vec<String> = Vec::new();
    let mut items: HashMap<String, ItemTrack> = HashMap::new();
    let mut last_turn_message = String::from("starting");
    let mut is_complete = false;
    let mut has_failed = false;

    let mut upsert = |order: &mut Vec<String>,
                      items: &mut HashMap<String, ItemTrack>,
                      item: &ItemPayload,
                      state: StepState| {
        match items.get_mut(&item.id) {
            Some(track) => {
                track.payload = item.clone();
                // completed is sticky: a late item.updated after
                // item.completed must not resurrect the step
                if track.state != StepState::Completed {
                    track.state = state;
                }
            }
            None => {
                order.push(item.id.clone());
                items.insert(
                    item.id.clone(),
                    ItemTrack {
                        payload: item.clone(),
                        state,
                    },
                );
            }
        }
    };

    for event in events {
        match event {
            AgentEvent::ThreadStarted { .. } => last_turn_message = "thread started".to_string(),
            AgentEvent::TurnStarted => last_turn_message = "working".to_string(),
            AgentEvent::TurnCompleted { .. } => {
                is_complete = true;
                last_turn_message = "turn completed".to_string();
            }
            AgentEvent::TurnFailed { error } => {
                is_complete = true;
                has_failed = true;
                last_turn_message = format!("turn failed: {error}");
            }
            AgentEvent::ItemStarted { item } | AgentEvent::ItemUpdated { item } => {
                upsert(&mut order, &mut items, item, StepState::InProgress);
            }
            AgentEvent::ItemCompleted { item } => {
                upsert(&mut order, &mut items, item, StepState::Completed);
            }
            AgentEvent::Unknown { .. } => {}
        }
    }

    let total_steps = order.len();
    let completed_steps = order
        .iter()
        .filter_map(|id| items.get(id))
        .filter(|t| t.state == StepState::Completed)
        .count();

    let mut files: HashSet<&str> = HashSet::new();
    let mut commands_executed = 0usize;
    for id in &order {
        let Some(track) = items.get(id) else { continue };
        if track.state != StepState::Completed {
            continue;
        }
        match track.payload.kind {
            ItemKind::FileChange => {
                files.extend(track.payload.paths.iter().map(String::as_str));
            }
            ItemKind::CommandExecution => commands_executed += 1,
            _ => {}
        }
    }

    // Most recent item still in progress wins; otherwise the last turn
    // state message stands in.
    let current_action = order
        .iter()
        .rev()
        .filter_map(|id| items.get(id))
        .find(|t| t.state != StepState::Completed)
        .map(|t| t.payload.description.clone())
        .unwrap_or(last_turn_message);

    let progress_percentage = if total_steps == 0 {
        0
    } else {
        (100 * completed_steps / total_steps) as u8
    };

    let steps = order
        .iter()
        .filter_map(|id| items.get(id))
        .map(|t| StepSummary {
            kind: t.payload.kind.as_str().to_string(),
            description: t.payload.description.clone(),
            status: t.state.as_str().to_string(),
        })
        .collect();

    ProgressSnapshot {
        current_action,
        total_steps,
        completed_steps,
        progress_percentage,
        files_changed: files.len(),
        commands_executed,
        steps,
        is_complete,
        has_failed,
    }
}

#[cfg(test)]
#[path = "progress_tests.rs"]
mod tests;
