//! `CompactionGuard`: watches token flow for one run and preserves context
//! before an anticipated host-side compaction wipes it out.

use crate::snapshot::{self, PreservationSnapshot};
use parking_lot::Mutex;
use stackmemory_core::{
    AnchorId, AnchorType, CompactionConfig, Error, FrameId, FrameType, ProjectId, Result, RunId,
};
use stackmemory_frame::FrameManager;
use std::collections::VecDeque;
use std::sync::Arc;

const MAX_PRESERVED_RECORDS: usize = 64;

/// Phrases a host commonly emits when it has already summarized away
/// earlier conversation turns.
const COMPACTION_INDICATORS: &[&str] = &[
    "earlier in this conversation",
    "[context truncated]",
    "conversation has been summarized",
    "previous messages have been condensed",
];

/// One preservation pass, kept in memory so `rehydrate` doesn't need to
/// re-scan the store for the newest anchor.
struct PreservedRecord {
    anchor_id: AnchorId,
    frame_id: FrameId,
    created_at: i64,
    snapshot: PreservationSnapshot,
}

struct GuardState {
    estimated_tokens: u64,
    warned: bool,
    critical: bool,
    preserved: VecDeque<PreservedRecord>,
}

/// Stateful sentinel tracking token usage for one run, triggering context
/// preservation before the host is expected to compact its own history.
///
/// Safe to call from any number of concurrent event recorders: the counter
/// and anchor-write path are both behind one mutex.
pub struct CompactionGuard {
    frame_manager: Arc<FrameManager>,
    run_id: RunId,
    project_id: ProjectId,
    config: CompactionConfig,
    state: Mutex<GuardState>,
}

impl CompactionGuard {
    /// Build a guard for one run, sharing the project's `FrameManager`.
    pub fn new(frame_manager: Arc<FrameManager>, run_id: RunId, project_id: ProjectId, config: CompactionConfig) -> Self {
        CompactionGuard {
            frame_manager,
            run_id,
            project_id,
            config,
            state: Mutex::new(GuardState {
                estimated_tokens: 0,
                warned: false,
                critical: false,
                preserved: VecDeque::new(),
            }),
        }
    }

    /// Current running token estimate.
    pub fn estimated_tokens(&self) -> u64 {
        self.state.lock().estimated_tokens
    }

    /// Add `text` to the running token estimate; trigger a preservation pass
    /// if a threshold was just crossed for the first time this window.
    /// Returns whether a preservation pass fired.
    pub fn track(&self, text: &str, now: i64) -> Result<bool> {
        let estimate = estimate_tokens(text);
        let should_preserve = {
            let mut state = self.state.lock();
            state.estimated_tokens += estimate;
            let tokens = state.estimated_tokens;
            if tokens >= self.config.critical_threshold() && !state.critical {
                state.critical = true;
                state.warned = true;
                true
            } else if tokens >= self.config.warning_threshold() && !state.warned {
                state.warned = true;
                true
            } else {
                false
            }
        };

        if should_preserve {
            self.preserve_critical_context(now)?;
        }
        Ok(should_preserve)
    }

    /// Scan the run's current frame and write a single `COMPACTION_PRESERVE`
    /// anchor capturing tool calls, file operations, decisions, and
    /// error/resolution chains. A no-op if the run has no active frame.
    pub fn preserve_critical_context(&self, now: i64) -> Result<Option<AnchorId>> {
        let Some(frame) = self.frame_manager.get_active_path(&self.run_id).pop() else {
            tracing::warn!(run_id = %self.run_id, "no active frame to preserve context for");
            return Ok(None);
        };
        let events = self.frame_manager.get_events(frame.frame_id);
        let snapshot = snapshot::build(&events);

        let metadata = match serde_json::to_value(&snapshot) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        let summary = format!(
            "preserved {} tool calls, {} file ops, {} decisions, {} error chains",
            snapshot.tool_calls.len(),
            snapshot.file_operations.len(),
            snapshot.decisions.len(),
            snapshot.error_resolutions.len(),
        );
        let anchor_id =
            self.frame_manager
                .add_anchor(frame.frame_id, AnchorType::CompactionPreserve, summary, 10, metadata)?;

        let mut state = self.state.lock();
        if state.preserved.len() >= MAX_PRESERVED_RECORDS {
            state.preserved.pop_front();
        }
        state.preserved.push_back(PreservedRecord {
            anchor_id,
            frame_id: frame.frame_id,
            created_at: now,
            snapshot,
        });
        Ok(Some(anchor_id))
    }

    /// Reset the threshold-crossing window (but not the running token
    /// count), so a later crossing of the same threshold will preserve
    /// again. Callers invoke this once the host's actual compaction has
    /// been observed via [`Self::detect_compaction`] and rehydration has run.
    pub fn reset_window(&self) {
        let mut state = self.state.lock();
        state.warned = false;
        state.critical = false;
    }

    /// Whether `text` contains a phrase indicating the host already
    /// summarized away earlier turns.
    pub fn detect_compaction(text: &str) -> bool {
        let lower = text.to_lowercase();
        COMPACTION_INDICATORS.iter().any(|needle| lower.contains(needle))
    }

    /// Restore the most recent preservation as a fresh frame, with
    /// per-field anchors at descending priority.
    pub fn rehydrate(&self) -> Result<FrameId> {
        let snapshot = {
            let state = self.state.lock();
            let newest = state
                .preserved
                .iter()
                .max_by_key(|record| record.created_at)
                .ok_or_else(|| Error::NotFound("no preserved context to rehydrate".to_string()))?;
            tracing::debug!(
                anchor_id = %newest.anchor_id,
                source_frame_id = %newest.frame_id,
                created_at = newest.created_at,
                "rehydrating from preserved context"
            );
            newest.snapshot.clone()
        };

        let restoration_frame_id = self.frame_manager.create_frame(
            self.run_id.clone(),
            self.project_id.clone(),
            FrameType::Review,
            "Context Restoration After Compaction",
            serde_json::Map::new(),
            None,
        )?;

        if !snapshot.tool_calls.is_empty() {
            let text = snapshot
                .tool_calls
                .iter()
                .map(|t| t.tool.as_str())
                .collect::<Vec<_>>()
                .join(" -> ");
            self.frame_manager.add_anchor(
                restoration_frame_id,
                AnchorType::Fact,
                format!("tool sequence: {text}"),
                9,
                serde_json::Map::new(),
            )?;
        }

        if !snapshot.file_operations.is_empty() {
            let text = snapshot
                .file_operations
                .iter()
                .map(|f| f.path.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            self.frame_manager.add_anchor(
                restoration_frame_id,
                AnchorType::Fact,
                format!("files touched: {text}"),
                8,
                serde_json::Map::new(),
            )?;
        }

        for decision in &snapshot.decisions {
            self.frame_manager.add_anchor(
                restoration_frame_id,
                AnchorType::Decision,
                decision.text.clone(),
                7,
                serde_json::Map::new(),
            )?;
        }

        Ok(restoration_frame_id)
    }
}

fn estimate_tokens(text: &str) -> u64 {
    ((text.chars().count() as f64) / 4.0).ceil() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use stackmemory_core::config::{DurabilityMode, StoreConfig};
    use stackmemory_core::{EventType, FrameManagerConfig};
    use stackmemory_store::Store;

    fn guard(dir: &std::path::Path, limit: u64) -> (CompactionGuard, RunId, ProjectId) {
        let mut cfg = StoreConfig::default();
        cfg.db_path = dir.join("memory.db").to_string_lossy().to_string();
        cfg.durability = DurabilityMode::Strict;
        let store = Arc::new(Store::open(&cfg).unwrap());
        let fm = Arc::new(FrameManager::new(store, FrameManagerConfig::default(), None));
        let run_id = RunId::new("r1");
        let project_id = ProjectId::new("p1");
        fm.create_frame(run_id.clone(), project_id.clone(), FrameType::Task, "root", serde_json::Map::new(), None)
            .unwrap();
        (
            CompactionGuard::new(fm, run_id.clone(), project_id.clone(), CompactionConfig::new(limit)),
            run_id,
            project_id,
        )
    }

    #[test]
    fn estimate_matches_char_count_over_four() {
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn track_below_threshold_does_not_preserve() {
        let dir = tempfile::tempdir().unwrap();
        let (guard, ..) = guard(dir.path(), 1_000_000);
        let fired = guard.track("short text", 0).unwrap();
        assert!(!fired);
    }

    #[test]
    fn track_crossing_warning_threshold_preserves_once() {
        let dir = tempfile::tempdir().unwrap();
        let (guard, ..) = guard(dir.path(), 40);
        let long_text = "x".repeat(200);
        let fired_first = guard.track(&long_text, 0).unwrap();
        assert!(fired_first);
        let fired_second = guard.track("more", 1).unwrap();
        assert!(!fired_second);
    }

    #[test]
    fn detect_compaction_matches_known_phrases() {
        assert!(CompactionGuard::detect_compaction("Earlier in this conversation we discussed X"));
        assert!(!CompactionGuard::detect_compaction("nothing unusual here"));
    }

    #[test]
    fn preserve_then_rehydrate_round_trips_decisions() {
        let dir = tempfile::tempdir().unwrap();
        let (guard, run_id, _project) = guard(dir.path(), 1_000_000);
        let frame_id = guard.frame_manager.get_active_path(&run_id).pop().unwrap().frame_id;
        guard
            .frame_manager
            .record_event(frame_id, EventType::Decision, serde_json::json!({"text": "use sqlite"}))
            .unwrap();
        let anchor_id = guard.preserve_critical_context(10).unwrap();
        assert!(anchor_id.is_some());

        let restored = guard.rehydrate().unwrap();
        let anchors = guard.frame_manager.get_anchors(restored);
        assert!(anchors.iter().any(|a| a.anchor_type == AnchorType::Decision && a.text == "use sqlite"));
    }

    #[test]
    fn rehydrate_without_preservation_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (guard, ..) = guard(dir.path(), 1_000_000);
        assert!(guard.rehydrate().is_err());
    }
}
