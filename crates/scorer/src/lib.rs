//! Deterministic importance scoring: a pure function over a frame's events
//! and anchors, producing a score in `[0, 1]`.
//!
//! `Scorer` is loaded once per process with its weights and importance
//! table; `score()` never reads the store or any other mutable state, so
//! the same inputs always produce the same output.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod table;

pub use table::ImportanceTable;

use stackmemory_core::{Anchor, AnchorType, Event, EventType, Frame, FrameType, ScorerWeights};
use std::collections::HashSet;

/// Days over which persistence decays by half.
const PERSISTENCE_HALF_LIFE_DAYS: f64 = 30.0;
/// Reference-count normalization denominator.
const REFERENCE_DECAY_DENOMINATOR: f64 = 10.0;
/// Saturation constant for the impact curve.
const IMPACT_SATURATION: f64 = 5.0;

/// Computes importance scores from weights and a base-importance table.
#[derive(Debug, Clone)]
pub struct Scorer {
    weights: ScorerWeights,
    table: ImportanceTable,
}

impl Scorer {
    /// Build a scorer with the given weights and table. Both are expected
    /// to be constructed once and reused for every call.
    pub fn new(weights: ScorerWeights, table: ImportanceTable) -> Self {
        Scorer { weights, table }
    }

    /// Score a frame given its events and anchors. `now` is unix seconds,
    /// passed in rather than read from the clock so the result is
    /// reproducible in tests.
    pub fn score(&self, frame: &Frame, events: &[Event], anchors: &[Anchor], now: i64) -> f64 {
        let base = self.base_component(frame, events);
        let impact = self.impact_component(events, anchors);
        let persistence = self.persistence_component(frame, events, now);
        let reference = self.reference_component(frame);

        let total = base * self.weights.base
            + impact * self.weights.impact
            + persistence * self.weights.persistence
            + reference * self.weights.reference;

        total.clamp(0.0, 1.0)
    }

    fn base_component(&self, frame: &Frame, events: &[Event]) -> f64 {
        let tool_names = events
            .iter()
            .filter(|e| e.event_type == EventType::ToolCall)
            .filter_map(|e| e.payload.get("tool").and_then(|v| v.as_str()));

        tool_names
            .map(|name| self.table.lookup(name))
            .fold(None, |acc: Option<f64>, w| Some(acc.map_or(w, |a: f64| a.max(w))))
            .unwrap_or_else(|| self.table.lookup(frame_type_key(frame.frame_type)))
    }

    fn impact_component(&self, events: &[Event], anchors: &[Anchor]) -> f64 {
        let pinned_anchors = anchors
            .iter()
            .filter(|a| matches!(a.anchor_type, AnchorType::Decision | AnchorType::Constraint))
            .count();
        let files_touched = files_touched(events).len();
        let raw = (pinned_anchors + files_touched) as f64;
        1.0 - (-raw / IMPACT_SATURATION).exp()
    }

    fn persistence_component(&self, frame: &Frame, events: &[Event], now: i64) -> f64 {
        let made_durable_change = events.iter().any(|e| {
            matches!(e.event_type, EventType::ToolCall | EventType::ToolResult)
                && e.payload
                    .get("action")
                    .and_then(|v| v.as_str())
                    .map(|a| matches!(a, "write" | "delete" | "create"))
                    .unwrap_or(false)
        });
        if !made_durable_change {
            return 0.0;
        }
        match frame.closed_at {
            None => 1.0,
            Some(closed_at) => {
                let age_days = ((now - closed_at).max(0) as f64) / 86_400.0;
                0.5f64.powf(age_days / PERSISTENCE_HALF_LIFE_DAYS)
            }
        }
    }

    fn reference_component(&self, frame: &Frame) -> f64 {
        let access_count = frame
            .outputs
            .get("access_count")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        (access_count as f64 / REFERENCE_DECAY_DENOMINATOR).min(1.0)
    }
}

fn files_touched(events: &[Event]) -> HashSet<String> {
    events
        .iter()
        .filter_map(|e| {
            e.payload
                .get("path")
                .or_else(|| e.payload.get("file"))
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
        })
        .collect()
}

fn frame_type_key(frame_type: FrameType) -> &'static str {
    match frame_type {
        FrameType::Decision | FrameType::Milestone => "decision_recording",
        FrameType::Feature | FrameType::Architecture | FrameType::Write => "write_new_file",
        FrameType::Debug | FrameType::Error => "edit",
        FrameType::Review => "read",
        FrameType::Task | FrameType::Other => "search",
    }
}
