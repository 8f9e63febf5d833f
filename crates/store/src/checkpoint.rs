//! Checkpoint snapshots: a full, point-in-time dump of the tables written
//! to the main database file so the WAL can be truncated.
//!
//! Written atomically (temp file + rename) so a crash mid-checkpoint leaves
//! either the old snapshot or the new one, never a half-written file.

use crate::tables::Tables;
use crc32fast::Hasher;
use serde::{Deserialize, Serialize};
use stackmemory_core::{Anchor, Error, Event, Frame, MigrationJob, Result, StorageItem};
use std::path::Path;

const SNAPSHOT_MAGIC: [u8; 4] = *b"SMDB";

/// A full dump of the relational tables, as written to the main database
/// file at checkpoint time.
#[derive(Debug, Serialize, Deserialize)]
pub struct Snapshot {
    frames: Vec<Frame>,
    events: Vec<Event>,
    anchors: Vec<Anchor>,
    storage_items: Vec<StorageItem>,
    migration_jobs: Vec<MigrationJob>,
}

impl Snapshot {
    /// Capture the current state of `tables`.
    pub fn capture(tables: &Tables) -> Self {
        Snapshot {
            frames: tables.all_frames(),
            events: tables.all_events(),
            anchors: tables.all_anchors(),
            storage_items: tables.all_storage_items(),
            migration_jobs: tables.all_migration_jobs(),
        }
    }

    /// Rebuild `Tables` from a loaded snapshot. Frames are restored
    /// directly (not through `WriteOp::InsertFrame`) so only still-active
    /// frames repopulate their run's stack.
    pub fn restore_into(&self, tables: &Tables) {
        // Restore in creation order so each run's stack rebuilds root-first.
        let mut frames = self.frames.clone();
        frames.sort_by_key(|f| f.created_at);
        for frame in frames {
            tables.restore_frame(frame);
        }
        for event in &self.events {
            tables.restore_event(event.clone());
        }
        for anchor in &self.anchors {
            tables.restore_anchor(anchor.clone());
        }
        for item in &self.storage_items {
            tables.restore_storage_item(item.clone());
        }
        for job in &self.migration_jobs {
            tables.restore_migration_job(job.clone());
        }
    }

    /// Write this snapshot to `path` atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        let body = bincode::serialize(self)
            .map_err(|e| Error::Validation(format!("encoding checkpoint: {e}")))?;
        let crc = {
            let mut hasher = Hasher::new();
            hasher.update(&body);
            hasher.finalize()
        };

        let mut out = Vec::with_capacity(4 + 4 + body.len());
        out.extend_from_slice(&SNAPSHOT_MAGIC);
        out.extend_from_slice(&crc.to_le_bytes());
        out.extend_from_slice(&body);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::TransientIo(format!("creating {}: {e}", parent.display())))?;
        }
        let tmp_path = path.with_extension("db.tmp");
        std::fs::write(&tmp_path, &out)
            .map_err(|e| Error::TransientIo(format!("writing {}: {e}", tmp_path.display())))?;
        std::fs::rename(&tmp_path, path)
            .map_err(|e| Error::TransientIo(format!("renaming checkpoint into place: {e}")))?;
        Ok(())
    }

    /// Load a snapshot from `path`, or `None` if it doesn't exist yet.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read(path)
            .map_err(|e| Error::TransientIo(format!("reading {}: {e}", path.display())))?;
        if raw.len() < 8 || raw[0..4] != SNAPSHOT_MAGIC {
            return Err(Error::Corrupt(format!(
                "{} is not a valid checkpoint file",
                path.display()
            )));
        }
        let stored_crc = u32::from_le_bytes(raw[4..8].try_into().unwrap());
        let body = &raw[8..];
        let computed_crc = {
            let mut hasher = Hasher::new();
            hasher.update(body);
            hasher.finalize()
        };
        if stored_crc != computed_crc {
            return Err(Error::Corrupt(format!(
                "{} failed its checksum",
                path.display()
            )));
        }
        let snapshot: Snapshot = bincode::deserialize(body)
            .map_err(|e| Error::Corrupt(format!("decoding checkpoint: {e}")))?;
        Ok(Some(snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stackmemory_core::{FrameId, FrameType, ProjectId, RunId};
    use tempfile::tempdir;

    #[test]
    fn capture_and_restore_roundtrips() {
        let tables = Tables::new();
        let frame = Frame::new(
            FrameId::new(),
            RunId::new("r"),
            ProjectId::new("p"),
            None,
            0,
            FrameType::Task,
            "root".into(),
            serde_json::Map::new(),
            0,
        );
        tables.restore_frame(frame.clone());

        let snapshot = Snapshot::capture(&tables);
        let restored = Tables::new();
        snapshot.restore_into(&restored);
        assert!(restored.get_frame(frame.frame_id).is_some());
    }

    #[test]
    fn save_then_load_detects_corruption() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("memory.db");
        let snapshot = Snapshot {
            frames: vec![],
            events: vec![],
            anchors: vec![],
            storage_items: vec![],
            migration_jobs: vec![],
        };
        snapshot.save(&path).unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        assert!(Snapshot::load(&path).is_err());
    }
}
