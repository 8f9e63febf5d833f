//! In-memory relational tables. The WAL is the durable source of truth;
//! these tables are the rebuildable index over it, protected for concurrent
//! reads by sharded locking (`dashmap`) rather than one coarse lock.

use dashmap::DashMap;
use stackmemory_core::{
    Anchor, Event, Frame, FrameId, JobId, JobStatus, MigrationJob, ProjectId, RunId, StorageId,
    StorageItem, Tier,
};

/// The full in-memory schema.
#[derive(Default)]
pub struct Tables {
    frames: DashMap<FrameId, Frame>,
    events: DashMap<FrameId, Vec<Event>>,
    anchors: DashMap<FrameId, Vec<Anchor>>,
    children: DashMap<FrameId, Vec<FrameId>>,
    storage_items: DashMap<StorageId, StorageItem>,
    storage_item_by_frame: DashMap<FrameId, StorageId>,
    migration_jobs: DashMap<JobId, MigrationJob>,
    run_stacks: DashMap<RunId, Vec<FrameId>>,
}

impl Tables {
    /// Build an empty schema.
    pub fn new() -> Self {
        Tables::default()
    }

    // -- frames --------------------------------------------------------

    pub(crate) fn insert_frame(&self, frame: Frame) {
        let run_id = frame.run_id.clone();
        let frame_id = frame.frame_id;
        if let Some(parent) = frame.parent_frame_id {
            self.children.entry(parent).or_default().push(frame_id);
        }
        self.frames.insert(frame_id, frame);
        self.run_stacks.entry(run_id).or_default().push(frame_id);
    }

    pub(crate) fn update_frame(&self, frame: Frame) {
        let frame_id = frame.frame_id;
        let is_active = frame.is_active();
        let run_id = frame.run_id.clone();
        self.frames.insert(frame_id, frame);
        if !is_active {
            if let Some(mut stack) = self.run_stacks.get_mut(&run_id) {
                stack.retain(|id| *id != frame_id);
            }
        }
    }

    /// Look up a frame by id.
    pub fn get_frame(&self, frame_id: FrameId) -> Option<Frame> {
        self.frames.get(&frame_id).map(|r| r.clone())
    }

    /// The currently active frame at the top of `run_id`'s stack, if any.
    pub fn stack_tip(&self, run_id: &RunId) -> Option<FrameId> {
        self.run_stacks.get(run_id).and_then(|s| s.last().copied())
    }

    /// Full active stack for a run, root-first.
    pub fn stack(&self, run_id: &RunId) -> Vec<FrameId> {
        self.run_stacks
            .get(run_id)
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Direct children of a frame, in creation order.
    pub fn children_of(&self, frame_id: FrameId) -> Vec<FrameId> {
        self.children
            .get(&frame_id)
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    /// All frames still `active` whose `run_id` is not `current_run_id` and
    /// whose `created_at` is older than `cutoff` (unix seconds) — orphan
    /// candidates for the recovery sweep.
    pub fn active_frames_older_than(&self, current_run_id: &RunId, cutoff: i64) -> Vec<Frame> {
        self.frames
            .iter()
            .filter(|entry| {
                let f = entry.value();
                f.is_active() && &f.run_id != current_run_id && f.created_at < cutoff
            })
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// All frames scoped to a project, regardless of state.
    pub fn frames_by_project(&self, project_id: &ProjectId) -> Vec<Frame> {
        self.frames
            .iter()
            .filter(|entry| &entry.value().project_id == project_id)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Closed frames scoped to a project, for scoring/GC/context sweeps.
    pub fn closed_frames_by_project(&self, project_id: &ProjectId) -> Vec<Frame> {
        self.frames
            .iter()
            .filter(|entry| {
                let f = entry.value();
                &f.project_id == project_id && !f.is_active()
            })
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Restore a frame loaded from a checkpoint: indexes it, and pushes it
    /// onto its run's stack only if it's still active.
    pub(crate) fn restore_frame(&self, frame: Frame) {
        let run_id = frame.run_id.clone();
        let frame_id = frame.frame_id;
        let is_active = frame.is_active();
        if let Some(parent) = frame.parent_frame_id {
            self.children.entry(parent).or_default().push(frame_id);
        }
        self.frames.insert(frame_id, frame);
        if is_active {
            self.run_stacks.entry(run_id).or_default().push(frame_id);
        }
    }

    /// Restore an event loaded from a checkpoint.
    pub(crate) fn restore_event(&self, event: Event) {
        self.append_event(event);
    }

    /// Restore an anchor loaded from a checkpoint.
    pub(crate) fn restore_anchor(&self, anchor: Anchor) {
        self.insert_anchor(anchor);
    }

    /// Restore a storage item loaded from a checkpoint.
    pub(crate) fn restore_storage_item(&self, item: StorageItem) {
        self.upsert_storage_item(item);
    }

    /// Restore a migration job loaded from a checkpoint.
    pub(crate) fn restore_migration_job(&self, job: MigrationJob) {
        self.upsert_migration_job(job);
    }

    // -- events ----------------------------------------------------------

    pub(crate) fn append_event(&self, event: Event) {
        self.events.entry(event.frame_id).or_default().push(event);
    }

    /// Events for a frame, in `seq` order (the order they were appended).
    pub fn events_of(&self, frame_id: FrameId) -> Vec<Event> {
        self.events.get(&frame_id).map(|e| e.clone()).unwrap_or_default()
    }

    // -- anchors -----------------------------------------------------------

    pub(crate) fn insert_anchor(&self, anchor: Anchor) {
        self.anchors.entry(anchor.frame_id).or_default().push(anchor);
    }

    /// Anchors attached to a frame, in insertion order.
    pub fn anchors_of(&self, frame_id: FrameId) -> Vec<Anchor> {
        self.anchors.get(&frame_id).map(|a| a.clone()).unwrap_or_default()
    }

    // -- storage items -----------------------------------------------------

    pub(crate) fn upsert_storage_item(&self, item: StorageItem) {
        self.storage_item_by_frame.insert(item.frame_id, item.storage_id);
        self.storage_items.insert(item.storage_id, item);
    }

    pub(crate) fn delete_storage_item(&self, id: StorageId) {
        if let Some((_, item)) = self.storage_items.remove(&id) {
            self.storage_item_by_frame.remove(&item.frame_id);
        }
    }

    /// The storage item for a frame, if it has ever been persisted off the
    /// active WAL path.
    pub fn storage_item_for_frame(&self, frame_id: FrameId) -> Option<StorageItem> {
        let id = self.storage_item_by_frame.get(&frame_id)?;
        self.storage_items.get(&id).map(|r| r.clone())
    }

    pub fn get_storage_item(&self, id: StorageId) -> Option<StorageItem> {
        self.storage_items.get(&id).map(|r| r.clone())
    }

    /// All storage items currently resident in `tier`.
    pub fn storage_items_in_tier(&self, tier: Tier) -> Vec<StorageItem> {
        self.storage_items
            .iter()
            .filter(|entry| entry.value().tier == tier)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Total bytes resident locally (`data.len()` summed across all items;
    /// archived-remote items report 0 since their `data` is empty).
    pub fn local_bytes_used(&self) -> u64 {
        self.storage_items
            .iter()
            .map(|entry| entry.value().compressed_size)
            .sum()
    }

    // -- migration jobs ------------------------------------------------

    pub(crate) fn upsert_migration_job(&self, job: MigrationJob) {
        self.migration_jobs.insert(job.job_id, job);
    }

    pub(crate) fn delete_migration_job(&self, id: JobId) {
        self.migration_jobs.remove(&id);
    }

    /// Pending jobs ordered `(priority desc, created_at asc)`, capped at
    /// `limit`.
    pub fn pending_migration_jobs(&self, limit: usize) -> Vec<MigrationJob> {
        let mut jobs: Vec<MigrationJob> = self
            .migration_jobs
            .iter()
            .filter(|entry| entry.value().status == JobStatus::Pending)
            .map(|entry| entry.value().clone())
            .collect();
        jobs.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        jobs.truncate(limit);
        jobs
    }

    /// Pending jobs ordered by their storage item's importance ascending
    /// (lowest-importance first), capped at `limit`. Used instead of
    /// `pending_migration_jobs`'s priority ordering when local storage is
    /// over its soft limit and needs to shed low-value bytes first. Jobs
    /// whose storage item is already gone sort first (importance 0.0).
    pub fn pending_migration_jobs_by_importance(&self, limit: usize) -> Vec<MigrationJob> {
        let mut jobs: Vec<(f64, MigrationJob)> = self
            .migration_jobs
            .iter()
            .filter(|entry| entry.value().status == JobStatus::Pending)
            .map(|entry| {
                let job = entry.value().clone();
                let importance = self
                    .storage_items
                    .get(&job.item_id)
                    .map(|item| item.importance)
                    .unwrap_or(0.0);
                (importance, job)
            })
            .collect();
        jobs.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.1.priority.cmp(&a.1.priority))
                .then_with(|| a.1.created_at.cmp(&b.1.created_at))
        });
        jobs.truncate(limit);
        jobs.into_iter().map(|(_, job)| job).collect()
    }

    /// Every migration job, for checkpointing.
    pub fn all_migration_jobs(&self) -> Vec<MigrationJob> {
        self.migration_jobs.iter().map(|e| e.value().clone()).collect()
    }

    /// Every storage item, for checkpointing.
    pub fn all_storage_items(&self) -> Vec<StorageItem> {
        self.storage_items.iter().map(|e| e.value().clone()).collect()
    }

    /// Every frame, for checkpointing.
    pub fn all_frames(&self) -> Vec<Frame> {
        self.frames.iter().map(|e| e.value().clone()).collect()
    }

    /// Every event, for checkpointing.
    pub fn all_events(&self) -> Vec<Event> {
        self.events.iter().flat_map(|e| e.value().clone()).collect()
    }

    /// Every anchor, for checkpointing.
    pub fn all_anchors(&self) -> Vec<Anchor> {
        self.anchors.iter().flat_map(|e| e.value().clone()).collect()
    }

    /// Frame ids that have an events entry, whether or not that frame still
    /// exists. Used by the recovery cascade-hygiene scan.
    pub fn event_frame_ids(&self) -> Vec<FrameId> {
        self.events.iter().map(|e| *e.key()).collect()
    }

    /// Drop the whole events entry for each given frame id.
    pub(crate) fn purge_events_for_frames(&self, frame_ids: &[FrameId]) {
        for id in frame_ids {
            self.events.remove(id);
        }
    }

    /// Delete a frame and everything that exists only in its name: its
    /// events, its anchors, its storage item, and its slot in its parent's
    /// children index. Does not recurse into children; callers only
    /// delete leaf-like frames.
    pub(crate) fn delete_frame(&self, frame_id: FrameId) {
        if let Some((_, frame)) = self.frames.remove(&frame_id) {
            if let Some(parent) = frame.parent_frame_id {
                if let Some(mut kids) = self.children.get_mut(&parent) {
                    kids.retain(|id| *id != frame_id);
                }
            }
            if let Some(mut stack) = self.run_stacks.get_mut(&frame.run_id) {
                stack.retain(|id| *id != frame_id);
            }
        }
        self.children.remove(&frame_id);
        self.events.remove(&frame_id);
        self.anchors.remove(&frame_id);
        if let Some((_, storage_id)) = self.storage_item_by_frame.remove(&frame_id) {
            self.storage_items.remove(&storage_id);
        }
    }
}
