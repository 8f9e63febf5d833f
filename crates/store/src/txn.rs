//! The write operations that make up a transaction, and their application
//! to the in-memory tables. This is the only path that mutates state; the
//! WAL stores exactly a `Vec<WriteOp>` per committed transaction.

use crate::tables::Tables;
use serde::{Deserialize, Serialize};
use stackmemory_core::{Anchor, Event, Frame, JobId, MigrationJob, StorageId, StorageItem};

/// A single mutation to the store's relational state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WriteOp {
    /// Insert a newly created frame and push it onto its run's stack.
    InsertFrame(Frame),
    /// Replace a frame's row wholesale (state transitions, digest, score, ...).
    UpdateFrame(Frame),
    /// Append an immutable event to its frame.
    AppendEvent(Event),
    /// Attach an anchor to its frame.
    InsertAnchor(Anchor),
    /// Insert or replace a frame's storage item.
    UpsertStorageItem(StorageItem),
    /// Remove a storage item (after a remote archive, or a GC delete).
    DeleteStorageItem(StorageId),
    /// Queue a new tier migration.
    EnqueueMigrationJob(MigrationJob),
    /// Replace a migration job's row (status/attempts transitions).
    UpdateMigrationJob(MigrationJob),
    /// Remove a completed or abandoned migration job.
    DeleteMigrationJob(JobId),
    /// Drop the events recorded for each frame id (cascade hygiene: the
    /// frame referenced no longer exists in the store).
    PurgeEventsForFrames(Vec<stackmemory_core::FrameId>),
    /// Delete a frame and cascade: its events, anchors, storage item, and
    /// its entry in its parent's children index.
    DeleteFrame(stackmemory_core::FrameId),
}

/// Apply a batch of operations to `tables`. Ops within a transaction are
/// applied in order; there is no partial application on error because
/// `WriteOp` construction cannot itself fail.
pub fn apply(tables: &Tables, ops: &[WriteOp]) {
    for op in ops {
        apply_one(tables, op);
    }
}

fn apply_one(tables: &Tables, op: &WriteOp) {
    match op {
        WriteOp::InsertFrame(frame) => tables.insert_frame(frame.clone()),
        WriteOp::UpdateFrame(frame) => tables.update_frame(frame.clone()),
        WriteOp::AppendEvent(event) => tables.append_event(event.clone()),
        WriteOp::InsertAnchor(anchor) => tables.insert_anchor(anchor.clone()),
        WriteOp::UpsertStorageItem(item) => tables.upsert_storage_item(item.clone()),
        WriteOp::DeleteStorageItem(id) => tables.delete_storage_item(*id),
        WriteOp::EnqueueMigrationJob(job) => tables.upsert_migration_job(job.clone()),
        WriteOp::UpdateMigrationJob(job) => tables.upsert_migration_job(job.clone()),
        WriteOp::DeleteMigrationJob(id) => tables.delete_migration_job(*id),
        WriteOp::PurgeEventsForFrames(ids) => tables.purge_events_for_frames(ids),
        WriteOp::DeleteFrame(id) => tables.delete_frame(*id),
    }
}
