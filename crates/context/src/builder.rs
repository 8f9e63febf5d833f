//! `ContextBuilder`: read-only assembly of a [`ContextBundle`] from the
//! frames, anchors, and digests already on disk.

use crate::bundle::{AnchorSummary, ContextBundle, DigestSummary, FrameSummary};
use stackmemory_core::{Anchor, AnchorType, ContextBuilderConfig, Frame, FrameId, ProjectId, Result, RunId, Tier};
use stackmemory_store::Store;
use std::collections::HashSet;
use std::sync::Arc;

/// How many of a project's most recently closed frames are considered for
/// anchor inclusion alongside the active path.
const RECENT_CLOSED_FRAMES_FOR_ANCHORS: usize = 20;
/// Cap on anchors returned in one bundle.
const MAX_ANCHORS: usize = 20;

/// Assembles context bundles by reading frames, anchors, and storage tier
/// metadata straight from the `Store`. Never writes.
pub struct ContextBuilder {
    store: Arc<Store>,
    config: ContextBuilderConfig,
}

impl ContextBuilder {
    /// Build a context assembler over an already-open store.
    pub fn new(store: Arc<Store>, config: ContextBuilderConfig) -> Self {
        ContextBuilder { store, config }
    }

    /// Assemble a bundle for `run_id` within `project_id`, never exceeding
    /// `token_budget` (or the configured default if `None`).
    pub fn build_context_bundle(
        &self,
        project_id: &ProjectId,
        run_id: &RunId,
        token_budget: Option<u64>,
    ) -> Result<ContextBundle> {
        let budget = token_budget.unwrap_or(self.config.default_token_budget);
        let mut remaining = budget;
        let mut truncated_count = 0u64;

        let active_path: Vec<Frame> =
            self.store.stack(run_id).into_iter().filter_map(|id| self.store.get_frame(id)).collect();
        let active_ids: HashSet<FrameId> = active_path.iter().map(|f| f.frame_id).collect();

        for frame in &active_path {
            remaining = remaining.saturating_sub(estimate_tokens(&frame.name));
        }
        let active_path = active_path
            .into_iter()
            .map(|f| FrameSummary {
                frame_id: f.frame_id,
                frame_type: f.frame_type,
                name: f.name,
                digest_text: f.digest_text,
                state: f.state,
            })
            .collect();

        let closed = self.store.closed_frames_by_project(project_id);
        let mut recent_closed: Vec<&Frame> = closed.iter().collect();
        recent_closed.sort_by_key(|f| std::cmp::Reverse(f.closed_at.unwrap_or(f.created_at)));

        let mut anchor_candidates: Vec<Anchor> = Vec::new();
        for frame_id in active_ids.iter().copied().chain(recent_closed.iter().take(RECENT_CLOSED_FRAMES_FOR_ANCHORS).map(|f| f.frame_id))
        {
            anchor_candidates.extend(self.store.anchors_of(frame_id));
        }
        anchor_candidates.sort_by(|a, b| {
            is_decision_or_constraint(b.anchor_type)
                .cmp(&is_decision_or_constraint(a.anchor_type))
                .then(b.priority.cmp(&a.priority))
                .then(b.created_at.cmp(&a.created_at))
                .then(a.frame_id.to_string().cmp(&b.frame_id.to_string()))
        });

        let mut anchors = Vec::new();
        for anchor in anchor_candidates.into_iter().take(MAX_ANCHORS) {
            let cost = estimate_tokens(&anchor.text);
            if cost <= remaining {
                remaining -= cost;
                anchors.push(AnchorSummary {
                    anchor_id: anchor.anchor_id,
                    frame_id: anchor.frame_id,
                    anchor_type: anchor.anchor_type,
                    text: anchor.text,
                    priority: anchor.priority,
                });
            } else {
                truncated_count += 1;
            }
        }

        let mut digest_candidates: Vec<&Frame> =
            closed.iter().filter(|f| !active_ids.contains(&f.frame_id)).collect();
        let (min_closed, max_closed) = closed_at_bounds(&digest_candidates);
        digest_candidates.sort_by(|a, b| {
            blended_score(*b, min_closed, max_closed, &self.config)
                .partial_cmp(&blended_score(*a, min_closed, max_closed, &self.config))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.frame_id.to_string().cmp(&b.frame_id.to_string()))
        });

        let mut digests = Vec::new();
        let mut remote_pointers = Vec::new();
        for frame in digest_candidates {
            let is_remote = self
                .store
                .storage_item_for_frame(frame.frame_id)
                .map(|item| item.tier == Tier::Remote)
                .unwrap_or(false);

            if is_remote {
                let cost = estimate_tokens(&frame.frame_id.to_string());
                if cost <= remaining {
                    remaining -= cost;
                    remote_pointers.push(frame.frame_id);
                } else {
                    truncated_count += 1;
                }
                continue;
            }

            let text = frame.digest_text.clone().unwrap_or_default();
            let cost = estimate_tokens(&text).max(estimate_tokens(&frame.name));
            if cost <= remaining {
                remaining -= cost;
                digests.push(DigestSummary {
                    frame_id: frame.frame_id,
                    name: frame.name.clone(),
                    digest_text: frame.digest_text.clone(),
                    score: frame.score,
                });
            } else {
                truncated_count += 1;
            }
        }

        Ok(ContextBundle { active_path, anchors, digests, remote_pointers, truncated_count })
    }
}

fn is_decision_or_constraint(anchor_type: AnchorType) -> bool {
    matches!(anchor_type, AnchorType::Decision | AnchorType::Constraint)
}

fn closed_at_bounds(frames: &[&Frame]) -> (i64, i64) {
    let mut min = i64::MAX;
    let mut max = i64::MIN;
    for frame in frames {
        let ts = frame.closed_at.unwrap_or(frame.created_at);
        min = min.min(ts);
        max = max.max(ts);
    }
    if min > max {
        (0, 0)
    } else {
        (min, max)
    }
}

fn blended_score(frame: &Frame, min_closed: i64, max_closed: i64, config: &ContextBuilderConfig) -> f64 {
    let ts = frame.closed_at.unwrap_or(frame.created_at);
    let recency = if max_closed > min_closed {
        (ts - min_closed) as f64 / (max_closed - min_closed) as f64
    } else {
        1.0
    };
    config.score_weight * frame.score + config.recency_weight * recency
}

fn estimate_tokens(text: &str) -> u64 {
    ((text.chars().count() as f64) / 4.0).ceil() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use stackmemory_core::config::{DurabilityMode, StoreConfig};
    use stackmemory_core::{Frame as CoreFrame, FrameId as CoreFrameId, FrameState, FrameType};

    fn builder(dir: &std::path::Path, budget: u64) -> (Arc<Store>, ContextBuilder) {
        let mut cfg = StoreConfig::default();
        cfg.db_path = dir.join("memory.db").to_string_lossy().to_string();
        cfg.durability = DurabilityMode::Strict;
        let store = Arc::new(Store::open(&cfg).unwrap());
        let mut cb_config = ContextBuilderConfig::default();
        cb_config.default_token_budget = budget;
        (store.clone(), ContextBuilder::new(store, cb_config))
    }

    fn root_frame(run_id: &RunId, project_id: &ProjectId, now: i64) -> CoreFrame {
        CoreFrame::new(
            CoreFrameId::new(),
            run_id.clone(),
            project_id.clone(),
            None,
            0,
            FrameType::Task,
            "root".to_string(),
            serde_json::Map::new(),
            now,
        )
    }

    #[test]
    fn active_path_includes_current_stack() {
        let dir = tempfile::tempdir().unwrap();
        let (store, cb) = builder(dir.path(), 10_000);
        let run = RunId::new("r1");
        let project = ProjectId::new("p1");
        let frame = root_frame(&run, &project, 0);
        let frame_id = frame.frame_id;
        store.insert_frame(frame).unwrap();

        let bundle = cb.build_context_bundle(&project, &run, None).unwrap();
        assert_eq!(bundle.active_path.len(), 1);
        assert_eq!(bundle.active_path[0].frame_id, frame_id);
    }

    #[test]
    fn decisions_and_constraints_rank_above_other_anchor_types() {
        let dir = tempfile::tempdir().unwrap();
        let (store, cb) = builder(dir.path(), 10_000);
        let run = RunId::new("r1");
        let project = ProjectId::new("p1");
        let frame = root_frame(&run, &project, 0);
        let frame_id = frame.frame_id;
        store.insert_frame(frame).unwrap();
        store
            .insert_anchor(Anchor {
                anchor_id: stackmemory_core::AnchorId::new(),
                frame_id,
                anchor_type: AnchorType::Fact,
                text: "some fact".to_string(),
                priority: 10,
                metadata: serde_json::Map::new(),
                created_at: 1,
            })
            .unwrap();
        store
            .insert_anchor(Anchor {
                anchor_id: stackmemory_core::AnchorId::new(),
                frame_id,
                anchor_type: AnchorType::Decision,
                text: "use postgres".to_string(),
                priority: 5,
                metadata: serde_json::Map::new(),
                created_at: 0,
            })
            .unwrap();

        let bundle = cb.build_context_bundle(&project, &run, None).unwrap();
        assert_eq!(bundle.anchors[0].anchor_type, AnchorType::Decision);
    }

    #[test]
    fn tight_budget_truncates_and_counts() {
        let dir = tempfile::tempdir().unwrap();
        let (store, cb) = builder(dir.path(), 1);
        let run = RunId::new("r1");
        let project = ProjectId::new("p1");
        let frame = root_frame(&run, &project, 0);
        let frame_id = frame.frame_id;
        store.insert_frame(frame).unwrap();
        store
            .insert_anchor(Anchor {
                anchor_id: stackmemory_core::AnchorId::new(),
                frame_id,
                anchor_type: AnchorType::Fact,
                text: "a much longer fact than the tiny budget allows".to_string(),
                priority: 5,
                metadata: serde_json::Map::new(),
                created_at: 0,
            })
            .unwrap();

        let bundle = cb.build_context_bundle(&project, &run, None).unwrap();
        assert!(bundle.anchors.is_empty());
        assert_eq!(bundle.truncated_count, 1);
    }

    #[test]
    fn remote_tier_frames_become_pointers_not_digests() {
        let dir = tempfile::tempdir().unwrap();
        let (store, cb) = builder(dir.path(), 10_000);
        let run = RunId::new("r1");
        let project = ProjectId::new("p1");
        let mut closed = root_frame(&run, &project, 0);
        closed.state = FrameState::Closed;
        closed.closed_at = Some(10);
        closed.digest_text = Some("did the thing".to_string());
        let frame_id = closed.frame_id;
        store.insert_frame(closed).unwrap();
        store
            .upsert_storage_item(stackmemory_core::StorageItem {
                storage_id: stackmemory_core::StorageId::new(),
                frame_id,
                tier: Tier::Remote,
                data: vec![],
                original_size: 10,
                compressed_size: 0,
                compression: stackmemory_core::Compression::Gzip,
                importance: 0.5,
                access_count: 0,
                last_accessed: 0,
                created_at: 0,
                remote_key: Some("k".to_string()),
            })
            .unwrap();

        let bundle = cb.build_context_bundle(&project, &RunId::new("other-run"), None).unwrap();
        assert!(bundle.digests.is_empty());
        assert_eq!(bundle.remote_pointers, vec![frame_id]);
    }
}
