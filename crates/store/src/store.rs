//! `Store`: the single embedded database every other component reads and
//! writes through. One writer lock serializes commits; reads go straight to
//! the sharded in-memory tables so concurrent readers never block on each
//! other or on a writer mid-commit.

use crate::checkpoint::Snapshot;
use crate::tables::Tables;
use crate::txn::{self, WriteOp};
use crate::wal::{WalReader, WalWriter};
use parking_lot::Mutex;
use stackmemory_core::config::StoreConfig;
use stackmemory_core::{
    Anchor, Error, Event, Frame, FrameId, JobId, MigrationJob, ProjectId, Result, RunId,
    StorageId, StorageItem, Tier,
};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

/// The embedded, WAL-backed store for frames, events, anchors, storage
/// items, and migration jobs.
pub struct Store {
    tables: Tables,
    wal: Mutex<WalWriter>,
    db_path: PathBuf,
}

impl Store {
    /// Open (or create) the store at `config.db_path`, replaying the WAL
    /// sidecar on top of the last checkpoint snapshot.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let db_path = PathBuf::from(&config.db_path);
        let wal_path = Self::wal_sidecar_path(&db_path);

        let tables = Tables::new();
        if let Some(snapshot) = Snapshot::load(&db_path)? {
            snapshot.restore_into(&tables);
        }

        let replay = WalReader::read_all(&wal_path)
            .map_err(|e| Error::TransientIo(format!("reading WAL {}: {e}", wal_path.display())))?;
        for entry in &replay.entries {
            let ops: Vec<WriteOp> = bincode::deserialize(&entry.payload).map_err(|e| {
                Error::Corrupt(format!("WAL entry {} failed to decode: {e}", entry.seq))
            })?;
            txn::apply(&tables, &ops);
        }
        if replay.truncated {
            tracing::warn!(
                path = %wal_path.display(),
                "recovered store after a truncated WAL tail"
            );
        }

        let wal = WalWriter::open(
            wal_path,
            config.durability,
            config.batch_interval_ms(),
            config.batch_size(),
            replay.max_seq + 1,
        )
        .map_err(|e| Error::TransientIo(e.to_string()))?;

        Ok(Store {
            tables,
            wal: Mutex::new(wal),
            db_path,
        })
    }

    /// Sidecar WAL path for a given main database path.
    pub fn wal_sidecar_path(db_path: &std::path::Path) -> PathBuf {
        let mut p = db_path.as_os_str().to_owned();
        p.push(".wal");
        PathBuf::from(p)
    }

    /// Commit a batch of operations atomically: one WAL record, then one
    /// application pass over the in-memory tables, both under the same held
    /// lock so no other writer's commit can interleave between them.
    pub fn commit(&self, ops: Vec<WriteOp>) -> Result<()> {
        if ops.is_empty() {
            return Ok(());
        }
        let mut wal = self.wal.lock();
        self.commit_locked(&mut wal, ops)
    }

    /// The shared critical section behind every write: WAL-append then
    /// table-apply, with `wal` already locked by the caller. Held across
    /// both steps so a reader of `self.tables` mid-commit of another writer
    /// is impossible, and so anything the caller derived from `self.tables`
    /// before taking the lock (e.g. a next-`seq` value) stays valid.
    fn commit_locked(&self, wal: &mut WalWriter, ops: Vec<WriteOp>) -> Result<()> {
        let payload = bincode::serialize(&ops)
            .map_err(|e| Error::Validation(format!("encoding transaction: {e}")))?;
        let timestamp = now_millis();
        wal.append(timestamp, &payload)
            .map_err(|e| Error::TransientIo(e.to_string()))?;
        txn::apply(&self.tables, &ops);
        Ok(())
    }

    /// Force the WAL to disk regardless of durability mode.
    pub fn flush(&self) -> Result<()> {
        self.wal
            .lock()
            .flush()
            .map_err(|e| Error::TransientIo(e.to_string()))
    }

    /// Snapshot the in-memory tables to the main database file and truncate
    /// the WAL. Called periodically and on graceful shutdown.
    pub fn checkpoint(&self) -> Result<()> {
        let snapshot = Snapshot::capture(&self.tables);
        snapshot.save(&self.db_path)?;
        self.wal
            .lock()
            .truncate_after_checkpoint()
            .map_err(|e| Error::TransientIo(e.to_string()))?;
        Ok(())
    }

    /// Whether the WAL currently holds any entries beyond its header (i.e.
    /// there is something a checkpoint would actually fold in).
    pub fn wal_is_nontrivial(&self) -> bool {
        let path = self.wal.lock().path().to_path_buf();
        std::fs::metadata(&path)
            .map(|m| m.len() > crate::format::WAL_HEADER_SIZE as u64)
            .unwrap_or(false)
    }

    /// Checkpoint only if the WAL holds more than its header. Returns
    /// whether a checkpoint actually ran.
    pub fn checkpoint_if_nontrivial(&self) -> Result<bool> {
        if !self.wal_is_nontrivial() {
            return Ok(false);
        }
        self.checkpoint()?;
        Ok(true)
    }

    // -- frames ----------------------------------------------------------

    /// Insert a newly created frame.
    pub fn insert_frame(&self, frame: Frame) -> Result<()> {
        self.commit(vec![WriteOp::InsertFrame(frame)])
    }

    /// Replace a frame's row (state/outputs/digest/score transitions).
    pub fn update_frame(&self, frame: Frame) -> Result<()> {
        self.commit(vec![WriteOp::UpdateFrame(frame)])
    }

    /// Look up a frame by id.
    pub fn get_frame(&self, frame_id: FrameId) -> Option<Frame> {
        self.tables.get_frame(frame_id)
    }

    /// The active frame at the top of a run's stack.
    pub fn stack_tip(&self, run_id: &RunId) -> Option<FrameId> {
        self.tables.stack_tip(run_id)
    }

    /// The full active stack for a run, root-first.
    pub fn stack(&self, run_id: &RunId) -> Vec<FrameId> {
        self.tables.stack(run_id)
    }

    /// Direct children of a frame.
    pub fn children_of(&self, frame_id: FrameId) -> Vec<FrameId> {
        self.tables.children_of(frame_id)
    }

    /// Active frames from other runs older than `cutoff` (unix seconds).
    pub fn active_frames_older_than(&self, current_run_id: &RunId, cutoff: i64) -> Vec<Frame> {
        self.tables.active_frames_older_than(current_run_id, cutoff)
    }

    /// All frames in a project.
    pub fn frames_by_project(&self, project_id: &ProjectId) -> Vec<Frame> {
        self.tables.frames_by_project(project_id)
    }

    /// Closed frames in a project.
    pub fn closed_frames_by_project(&self, project_id: &ProjectId) -> Vec<Frame> {
        self.tables.closed_frames_by_project(project_id)
    }

    /// Every frame in the store, regardless of project.
    pub fn all_frames(&self) -> Vec<Frame> {
        self.tables.all_frames()
    }

    /// Every anchor in the store, regardless of frame.
    pub fn all_anchors(&self) -> Vec<Anchor> {
        self.tables.all_anchors()
    }

    /// Every storage item in the store, regardless of tier.
    pub fn all_storage_items(&self) -> Vec<StorageItem> {
        self.tables.all_storage_items()
    }

    /// Every migration job in the store, regardless of status.
    pub fn all_migration_jobs(&self) -> Vec<MigrationJob> {
        self.tables.all_migration_jobs()
    }

    /// Frame ids that have an events entry, whether or not that frame still
    /// exists.
    pub fn event_frame_ids(&self) -> Vec<FrameId> {
        self.tables.event_frame_ids()
    }

    /// Cascade-hygiene: drop the events recorded under frame ids that no
    /// longer have a frame row.
    pub fn purge_events_for_frames(&self, frame_ids: Vec<FrameId>) -> Result<()> {
        if frame_ids.is_empty() {
            return Ok(());
        }
        self.commit(vec![WriteOp::PurgeEventsForFrames(frame_ids)])
    }

    /// Delete a frame and cascade its events/anchors/storage item. Each
    /// deletion is its own transaction, per the GCWorker's no-long-lived-
    /// transaction rule.
    pub fn delete_frame(&self, frame_id: FrameId) -> Result<()> {
        self.commit(vec![WriteOp::DeleteFrame(frame_id)])
    }

    // -- events ------------------------------------------------------------

    /// Append an event to its frame, assigning `seq` as the next value for
    /// that frame. `seq` assignment and the table push happen under the
    /// same held lock, so two concurrent callers on the same frame can
    /// never observe the same "next seq" and race each other into
    /// producing duplicates.
    pub fn append_event(&self, mut event: Event) -> Result<()> {
        let mut wal = self.wal.lock();
        event.seq = self.tables.events_of(event.frame_id).len() as u64 + 1;
        self.commit_locked(&mut wal, vec![WriteOp::AppendEvent(event)])
    }

    /// Events for a frame, in append order.
    pub fn events_of(&self, frame_id: FrameId) -> Vec<Event> {
        self.tables.events_of(frame_id)
    }

    // -- anchors -------------------------------------------------------

    /// Attach an anchor to a frame.
    pub fn insert_anchor(&self, anchor: Anchor) -> Result<()> {
        self.commit(vec![WriteOp::InsertAnchor(anchor)])
    }

    /// Anchors attached to a frame.
    pub fn anchors_of(&self, frame_id: FrameId) -> Vec<Anchor> {
        self.tables.anchors_of(frame_id)
    }

    // -- storage items -------------------------------------------------

    /// Insert or replace a frame's storage item.
    pub fn upsert_storage_item(&self, item: StorageItem) -> Result<()> {
        self.commit(vec![WriteOp::UpsertStorageItem(item)])
    }

    /// Remove a storage item.
    pub fn delete_storage_item(&self, id: StorageId) -> Result<()> {
        self.commit(vec![WriteOp::DeleteStorageItem(id)])
    }

    /// The storage item for a frame, if any.
    pub fn storage_item_for_frame(&self, frame_id: FrameId) -> Option<StorageItem> {
        self.tables.storage_item_for_frame(frame_id)
    }

    /// Look up a storage item by id.
    pub fn get_storage_item(&self, id: StorageId) -> Option<StorageItem> {
        self.tables.get_storage_item(id)
    }

    /// All storage items currently resident in `tier`.
    pub fn storage_items_in_tier(&self, tier: Tier) -> Vec<StorageItem> {
        self.tables.storage_items_in_tier(tier)
    }

    /// Bytes of local (non-remote) storage currently in use.
    pub fn local_bytes_used(&self) -> u64 {
        self.tables.local_bytes_used()
    }

    // -- migration jobs --------------------------------------------------

    /// Queue a new tier migration job.
    pub fn enqueue_migration_job(&self, job: MigrationJob) -> Result<()> {
        self.commit(vec![WriteOp::EnqueueMigrationJob(job)])
    }

    /// Replace a migration job's row.
    pub fn update_migration_job(&self, job: MigrationJob) -> Result<()> {
        self.commit(vec![WriteOp::UpdateMigrationJob(job)])
    }

    /// Remove a migration job.
    pub fn delete_migration_job(&self, id: JobId) -> Result<()> {
        self.commit(vec![WriteOp::DeleteMigrationJob(id)])
    }

    /// Pending jobs, `(priority desc, created_at asc)`, capped at `limit`.
    pub fn pending_migration_jobs(&self, limit: usize) -> Vec<MigrationJob> {
        self.tables.pending_migration_jobs(limit)
    }

    /// Pending jobs ordered by importance ascending, capped at `limit`.
    pub fn pending_migration_jobs_by_importance(&self, limit: usize) -> Vec<MigrationJob> {
        self.tables.pending_migration_jobs_by_importance(limit)
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use stackmemory_core::config::DurabilityMode;
    use stackmemory_core::{FrameType, ProjectId, RunId};
    use tempfile::tempdir;

    fn cfg(dir: &std::path::Path) -> StoreConfig {
        let mut cfg = StoreConfig::default();
        cfg.db_path = dir.join("memory.db").to_string_lossy().to_string();
        cfg.durability = DurabilityMode::Strict;
        cfg
    }

    fn make_frame(run: &RunId, project: &ProjectId) -> Frame {
        Frame::new(
            FrameId::new(),
            run.clone(),
            project.clone(),
            None,
            0,
            FrameType::Task,
            "root".into(),
            serde_json::Map::new(),
            0,
        )
    }

    #[test]
    fn insert_and_fetch_frame() {
        let dir = tempdir().unwrap();
        let store = Store::open(&cfg(dir.path())).unwrap();
        let run = RunId::new("run-1");
        let project = ProjectId::new("proj-1");
        let frame = make_frame(&run, &project);
        let id = frame.frame_id;

        store.insert_frame(frame).unwrap();
        assert!(store.get_frame(id).is_some());
        assert_eq!(store.stack_tip(&run), Some(id));
    }

    #[test]
    fn checkpoint_then_reopen_preserves_state() {
        let dir = tempdir().unwrap();
        let config = cfg(dir.path());
        let run = RunId::new("run-1");
        let project = ProjectId::new("proj-1");
        let frame_id;
        {
            let store = Store::open(&config).unwrap();
            let frame = make_frame(&run, &project);
            frame_id = frame.frame_id;
            store.insert_frame(frame).unwrap();
            store.checkpoint().unwrap();
        }
        {
            let store = Store::open(&config).unwrap();
            assert!(store.get_frame(frame_id).is_some());
            assert_eq!(store.stack_tip(&run), Some(frame_id));
        }
    }

    #[test]
    fn wal_replay_recovers_uncheckpointed_writes() {
        let dir = tempdir().unwrap();
        let config = cfg(dir.path());
        let run = RunId::new("run-1");
        let project = ProjectId::new("proj-1");
        let frame_id;
        {
            let store = Store::open(&config).unwrap();
            let frame = make_frame(&run, &project);
            frame_id = frame.frame_id;
            store.insert_frame(frame).unwrap();
            store.flush().unwrap();
            // No checkpoint: the frame only lives in the WAL.
        }
        {
            let store = Store::open(&config).unwrap();
            assert!(store.get_frame(frame_id).is_some());
        }
    }
}
