//! GCWorker: incremental, generational, non-blocking collection of closed
//! frames.
//!
//! Runs on a timer in the engine; every cycle is bounded (at most
//! `frames_per_cycle` candidates, deleted in small chunks) so it never
//! holds a long transaction and always leaves room for a cooperative stop.

#![warn(missing_docs)]
#![warn(clippy::all)]

use stackmemory_core::{Frame, GcConfig, ProjectId, Result, RunId, StorageItem, TierConfig};
use stackmemory_store::Store;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const CHUNK_SIZE: usize = 10;
/// Frames younger than this are protected regardless of other rules.
const RECENT_PROTECTION_SECS: i64 = 3600;
/// Fraction of the mature ceiling past which a low-scoring frame becomes
/// a P4 candidate.
const MATURE_STALE_FRACTION: f64 = 0.8;
/// Score below which a stale mature frame is collected (P4).
const MATURE_STALE_SCORE_THRESHOLD: f64 = 0.3;

/// Archives a frame's local storage item to the remote tier before GC
/// deletes the frame. Implemented by the TierStore.
pub trait TierArchiver: Send + Sync {
    /// Archive `item` to the remote tier. Errors abort the delete for this
    /// cycle; the frame is retried on a later cycle.
    fn archive_to_remote(&self, item: &StorageItem) -> Result<()>;
}

/// An archiver that refuses every archive, for stores with no tiering
/// configured. Candidates with a non-remote StorageItem are simply never
/// collected.
pub struct NoArchiver;

impl TierArchiver for NoArchiver {
    fn archive_to_remote(&self, _item: &StorageItem) -> Result<()> {
        Err(stackmemory_core::Error::Integrity(
            "no TierArchiver configured; cannot archive before delete".to_string(),
        ))
    }
}

/// Age bucket used for GC candidate selection, matching `TierConfig`'s
/// ceilings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AgeBucket {
    Young,
    Mature,
    Old,
    Remote,
}

fn bucket_of(age_secs: i64, tier: &TierConfig) -> AgeBucket {
    if age_secs < tier.young_ceiling.as_secs() as i64 {
        AgeBucket::Young
    } else if age_secs < tier.mature_ceiling.as_secs() as i64 {
        AgeBucket::Mature
    } else if age_secs < tier.old_ceiling.as_secs() as i64 {
        AgeBucket::Old
    } else {
        AgeBucket::Remote
    }
}

/// Counts and timings from one collection cycle.
#[derive(Debug, Clone, Default)]
pub struct GcCycleReport {
    /// Candidates considered this cycle (after protection filtering, before the cap).
    pub candidates_found: u64,
    /// Frames actually deleted.
    pub frames_deleted: u64,
    /// Frames skipped because archiving their StorageItem failed.
    pub archive_failures: u64,
    /// Wall-clock time spent in this cycle.
    pub elapsed: Duration,
    /// Whether the cycle stopped early via the cooperative stop signal.
    pub stopped_early: bool,
}

/// Runs one incremental collection cycle at a time; owns no background
/// thread of its own (the engine's scheduler drives `run_cycle`).
pub struct GcWorker {
    store: Arc<Store>,
    archiver: Arc<dyn TierArchiver>,
    gc_config: GcConfig,
    tier_config: TierConfig,
}

impl GcWorker {
    /// Build a GCWorker over an open store and its tier archiver.
    pub fn new(
        store: Arc<Store>,
        archiver: Arc<dyn TierArchiver>,
        gc_config: GcConfig,
        tier_config: TierConfig,
    ) -> Self {
        GcWorker {
            store,
            archiver,
            gc_config,
            tier_config,
        }
    }

    /// Run one collection cycle scoped to `project_id`. Frames owned by
    /// `current_run_id` are always protected.
    pub fn run_cycle(
        &self,
        project_id: &ProjectId,
        current_run_id: &RunId,
        now: i64,
        stop: &AtomicBool,
    ) -> Result<GcCycleReport> {
        let start = Instant::now();
        let mut report = GcCycleReport::default();

        let frames = self.store.frames_by_project(project_id);
        let candidates = self.select_candidates(&frames, current_run_id, now);
        report.candidates_found = candidates.len() as u64;

        for chunk in candidates.chunks(CHUNK_SIZE) {
            if stop.load(Ordering::Relaxed) {
                report.stopped_early = true;
                break;
            }
            for frame_id in chunk {
                if let Some(frame) = self.store.get_frame(*frame_id) {
                    match self.try_delete(&frame)? {
                        true => report.frames_deleted += 1,
                        false => report.archive_failures += 1,
                    }
                }
            }
        }

        report.elapsed = start.elapsed();
        tracing::debug!(
            candidates = report.candidates_found,
            deleted = report.frames_deleted,
            archive_failures = report.archive_failures,
            "gc cycle complete"
        );
        Ok(report)
    }

    fn try_delete(&self, frame: &Frame) -> Result<bool> {
        if let Some(item) = self.store.storage_item_for_frame(frame.frame_id) {
            if item.tier != stackmemory_core::Tier::Remote {
                if let Err(e) = self.archiver.archive_to_remote(&item) {
                    tracing::warn!(frame_id = %frame.frame_id, error = %e, "archive before delete failed; deferring to a later cycle");
                    return Ok(false);
                }
            }
        }
        self.store.delete_frame(frame.frame_id)?;
        Ok(true)
    }

    fn is_protected(&self, frame: &Frame, current_run_id: &RunId, now: i64) -> bool {
        frame.run_id == *current_run_id
            || frame.is_active()
            || (now - frame.created_at) < RECENT_PROTECTION_SECS
            || !frame.outputs.is_empty()
            || frame.depth == 0
            || frame
                .inputs
                .get("pinned")
                .and_then(|v| v.as_bool())
                .unwrap_or(false)
    }

    fn select_candidates(&self, frames: &[Frame], current_run_id: &RunId, now: i64) -> Vec<stackmemory_core::FrameId> {
        let eligible: Vec<&Frame> = frames
            .iter()
            .filter(|f| !self.is_protected(f, current_run_id, now))
            .collect();

        let mut selected = HashSet::new();
        let mut ordered = Vec::new();
        let cap = self.gc_config.frames_per_cycle as usize;

        macro_rules! add {
            ($iter:expr) => {
                for f in $iter {
                    if ordered.len() >= cap {
                        break;
                    }
                    if selected.insert(f.frame_id) {
                        ordered.push(f.frame_id);
                    }
                }
            };
        }

        // P1: closed, empty outputs, old bucket.
        add!(eligible.iter().copied().filter(|f| {
            !f.is_active()
                && f.outputs.is_empty()
                && bucket_of(now - f.created_at, &self.tier_config) == AgeBucket::Old
        }));

        // P2: orphaned (no parent, depth > 0, closed) in mature/old.
        add!(eligible.iter().copied().filter(|f| {
            !f.is_active()
                && f.parent_frame_id.is_none()
                && f.depth > 0
                && matches!(
                    bucket_of(now - f.created_at, &self.tier_config),
                    AgeBucket::Mature | AgeBucket::Old
                )
        }));

        // P3: duplicate traces. Keep the newest per (type, name, outputs, digest_text).
        let eligible_ids: HashSet<stackmemory_core::FrameId> =
            eligible.iter().map(|f| f.frame_id).collect();
        add!(self
            .duplicate_candidates(frames)
            .into_iter()
            .filter(|f| eligible_ids.contains(&f.frame_id)));

        // P4: mature, past 80% of the mature ceiling, low score.
        let mature_stale_secs =
            (self.tier_config.mature_ceiling.as_secs() as f64 * MATURE_STALE_FRACTION) as i64;
        add!(eligible.iter().copied().filter(|f| {
            !f.is_active()
                && bucket_of(now - f.created_at, &self.tier_config) == AgeBucket::Mature
                && (now - f.created_at) >= mature_stale_secs
                && f.score < MATURE_STALE_SCORE_THRESHOLD
        }));

        ordered
    }

    fn duplicate_candidates<'a>(&self, frames: &'a [Frame]) -> Vec<&'a Frame> {
        let mut by_signature: std::collections::HashMap<String, Vec<&Frame>> =
            std::collections::HashMap::new();
        for frame in frames.iter().filter(|f| !f.is_active()) {
            by_signature.entry(signature(frame)).or_default().push(frame);
        }

        let mut duplicates = Vec::new();
        for group in by_signature.values() {
            if group.len() < 2 {
                continue;
            }
            let newest = group.iter().map(|f| f.created_at).max().unwrap();
            let mut seen_newest = false;
            for frame in group {
                if !seen_newest && frame.created_at == newest {
                    seen_newest = true;
                    continue;
                }
                duplicates.push(*frame);
            }
        }
        duplicates
    }
}

fn signature(frame: &Frame) -> String {
    format!(
        "{}\u{0}{}\u{0}{}\u{0}{}",
        frame.frame_type.as_str(),
        frame.name,
        serde_json::to_string(&frame.outputs).unwrap_or_default(),
        frame.digest_text.as_deref().unwrap_or(""),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use stackmemory_core::config::{DurabilityMode, StoreConfig};
    use stackmemory_core::{FrameId, FrameState, FrameType};
    use tempfile::tempdir;

    fn store(dir: &std::path::Path) -> Arc<Store> {
        let mut cfg = StoreConfig::default();
        cfg.db_path = dir.join("memory.db").to_string_lossy().to_string();
        cfg.durability = DurabilityMode::Strict;
        Arc::new(Store::open(&cfg).unwrap())
    }

    fn closed_frame(run: &RunId, project: &ProjectId, created_at: i64, name: &str) -> Frame {
        let mut f = Frame::new(
            FrameId::new(),
            run.clone(),
            project.clone(),
            Some(FrameId::new()),
            1,
            FrameType::Task,
            name.into(),
            serde_json::Map::new(),
            created_at,
        );
        f.state = FrameState::Closed;
        f.closed_at = Some(created_at + 10);
        f
    }

    #[test]
    fn old_closed_empty_frame_is_collected() {
        let dir = tempdir().unwrap();
        let db = store(dir.path());
        let run = RunId::new("r1");
        let project = ProjectId::new("p1");
        let old_frame = closed_frame(&run, &project, -40 * 24 * 3600, "old-task");
        let id = old_frame.frame_id;
        db.insert_frame(old_frame).unwrap();

        let gc = GcWorker::new(db.clone(), Arc::new(NoArchiver), GcConfig::default(), TierConfig::default());
        let stop = AtomicBool::new(false);
        let report = gc.run_cycle(&project, &RunId::new("current"), 0, &stop).unwrap();

        assert_eq!(report.frames_deleted, 1);
        assert!(db.get_frame(id).is_none());
    }

    #[test]
    fn recent_frame_is_protected() {
        let dir = tempdir().unwrap();
        let db = store(dir.path());
        let run = RunId::new("r1");
        let project = ProjectId::new("p1");
        let recent = closed_frame(&run, &project, -10, "recent-task");
        let id = recent.frame_id;
        db.insert_frame(recent).unwrap();

        let gc = GcWorker::new(db.clone(), Arc::new(NoArchiver), GcConfig::default(), TierConfig::default());
        let stop = AtomicBool::new(false);
        let report = gc.run_cycle(&project, &RunId::new("current"), 0, &stop).unwrap();

        assert_eq!(report.frames_deleted, 0);
        assert!(db.get_frame(id).is_some());
    }

    #[test]
    fn current_run_frame_is_protected_even_if_old() {
        let dir = tempdir().unwrap();
        let db = store(dir.path());
        let run = RunId::new("live");
        let project = ProjectId::new("p1");
        let old_frame = closed_frame(&run, &project, -40 * 24 * 3600, "old-but-live-run");
        let id = old_frame.frame_id;
        db.insert_frame(old_frame).unwrap();

        let gc = GcWorker::new(db.clone(), Arc::new(NoArchiver), GcConfig::default(), TierConfig::default());
        let stop = AtomicBool::new(false);
        let report = gc.run_cycle(&project, &run, 0, &stop).unwrap();

        assert_eq!(report.frames_deleted, 0);
        assert!(db.get_frame(id).is_some());
    }

    #[test]
    fn duplicate_traces_keep_the_newest() {
        let dir = tempdir().unwrap();
        let db = store(dir.path());
        let run = RunId::new("r1");
        let project = ProjectId::new("p1");

        let older = closed_frame(&run, &project, -40 * 24 * 3600, "dup");
        let newer = closed_frame(&run, &project, -39 * 24 * 3600, "dup");
        let older_id = older.frame_id;
        let newer_id = newer.frame_id;
        db.insert_frame(older).unwrap();
        db.insert_frame(newer).unwrap();

        let gc = GcWorker::new(db.clone(), Arc::new(NoArchiver), GcConfig::default(), TierConfig::default());
        let stop = AtomicBool::new(false);
        gc.run_cycle(&project, &RunId::new("current"), 0, &stop).unwrap();

        assert!(db.get_frame(older_id).is_none());
        assert!(db.get_frame(newer_id).is_some());
    }

    #[test]
    fn archive_failure_defers_deletion() {
        let dir = tempdir().unwrap();
        let db = store(dir.path());
        let run = RunId::new("r1");
        let project = ProjectId::new("p1");
        let old_frame = closed_frame(&run, &project, -40 * 24 * 3600, "archived-task");
        let id = old_frame.frame_id;
        db.insert_frame(old_frame).unwrap();
        db.upsert_storage_item(StorageItem {
            storage_id: stackmemory_core::StorageId::new(),
            frame_id: id,
            tier: stackmemory_core::Tier::Old,
            data: vec![1, 2, 3],
            original_size: 3,
            compressed_size: 3,
            compression: stackmemory_core::Compression::Zstd,
            importance: 0.1,
            access_count: 0,
            last_accessed: 0,
            created_at: 0,
            remote_key: None,
        })
        .unwrap();

        let gc = GcWorker::new(db.clone(), Arc::new(NoArchiver), GcConfig::default(), TierConfig::default());
        let stop = AtomicBool::new(false);
        let report = gc.run_cycle(&project, &RunId::new("current"), 0, &stop).unwrap();

        assert_eq!(report.frames_deleted, 0);
        assert_eq!(report.archive_failures, 1);
        assert!(db.get_frame(id).is_some());
    }

    #[test]
    fn stop_signal_halts_before_next_chunk() {
        let dir = tempdir().unwrap();
        let db = store(dir.path());
        let run = RunId::new("r1");
        let project = ProjectId::new("p1");
        for i in 0..3 {
            db.insert_frame(closed_frame(&run, &project, -40 * 24 * 3600, &format!("task-{i}")))
                .unwrap();
        }

        let gc = GcWorker::new(db.clone(), Arc::new(NoArchiver), GcConfig::default(), TierConfig::default());
        let stop = AtomicBool::new(true);
        let report = gc.run_cycle(&project, &RunId::new("current"), 0, &stop).unwrap();

        assert!(report.stopped_early);
        assert_eq!(report.frames_deleted, 0);
    }
}
