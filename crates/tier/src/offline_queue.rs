//! Disk-persisted queue for migration jobs whose upload failed.
//!
//! One JSON object per line, append-only on enqueue. A drain pass rewrites
//! the whole file with whatever didn't succeed, mirroring the teacher's
//! segment-rotation WAL vocabulary at file-per-queue scale instead of
//! file-per-segment.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use stackmemory_core::{Error, FrameId, JobId, Result};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

/// A migration job parked after exhausting its in-line retry attempts.
///
/// Carries enough to retry the archive on its own, since the originating
/// `MigrationJob` row is deleted from the active table once a job is
/// offlined.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineEntry {
    /// The migration job's id, kept for log correlation.
    pub job_id: JobId,
    /// The frame whose StorageItem needs archiving to remote.
    pub frame_id: FrameId,
    /// Attempts made so far.
    pub attempts: u32,
    /// Unix-seconds timestamp of the next permitted retry, per exponential
    /// backoff from `backoff_initial` capped at `backoff_cap`.
    pub next_attempt_at: i64,
}

/// Append-only, file-backed retry queue.
pub struct OfflineQueue {
    path: PathBuf,
    lock: Mutex<()>,
}

impl OfflineQueue {
    /// Open (without requiring it to exist yet) the queue file at `path`.
    pub fn new(path: PathBuf) -> Self {
        OfflineQueue { path, lock: Mutex::new(()) }
    }

    /// Append one entry.
    pub fn enqueue(&self, entry: &OfflineEntry) -> Result<()> {
        let _guard = self.lock.lock();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let line = serde_json::to_string(entry)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// Read every entry currently queued.
    pub fn load_all(&self) -> Result<Vec<OfflineEntry>> {
        let _guard = self.lock.lock();
        self.load_all_locked()
    }

    fn load_all_locked(&self) -> Result<Vec<OfflineEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);
        let mut out = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: OfflineEntry = serde_json::from_str(&line)
                .map_err(|e| Error::Corrupt(format!("offline queue line corrupt: {e}")))?;
            out.push(entry);
        }
        Ok(out)
    }

    /// Replace the on-disk queue with exactly `remaining` (used after a
    /// connectivity-probe drain pass: entries that retried successfully are
    /// dropped, the rest are rewritten with updated backoff state).
    pub fn rewrite(&self, remaining: &[OfflineEntry]) -> Result<()> {
        let _guard = self.lock.lock();
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        for entry in remaining {
            let line = serde_json::to_string(entry)?;
            writeln!(file, "{line}")?;
        }
        Ok(())
    }
}

/// Compute the next backoff delay given the attempt count already made,
/// doubling from `initial` and capping at `cap`.
pub fn next_backoff(
    attempts: u32,
    initial: std::time::Duration,
    cap: std::time::Duration,
) -> std::time::Duration {
    let doubled = initial.saturating_mul(1u32 << attempts.min(16));
    doubled.min(cap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn enqueue_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let queue = OfflineQueue::new(dir.path().join("offline.jsonl"));
        let entry = OfflineEntry {
            job_id: JobId::new(),
            frame_id: FrameId::new(),
            attempts: 1,
            next_attempt_at: 100,
        };
        queue.enqueue(&entry).unwrap();
        let loaded = queue.load_all().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].job_id, entry.job_id);
    }

    #[test]
    fn rewrite_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let queue = OfflineQueue::new(dir.path().join("offline.jsonl"));
        queue
            .enqueue(&OfflineEntry {
                job_id: JobId::new(),
                frame_id: FrameId::new(),
                attempts: 1,
                next_attempt_at: 1,
            })
            .unwrap();
        queue
            .enqueue(&OfflineEntry {
                job_id: JobId::new(),
                frame_id: FrameId::new(),
                attempts: 1,
                next_attempt_at: 2,
            })
            .unwrap();
        assert_eq!(queue.load_all().unwrap().len(), 2);
        queue.rewrite(&[]).unwrap();
        assert_eq!(queue.load_all().unwrap().len(), 0);
    }

    #[test]
    fn missing_file_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let queue = OfflineQueue::new(dir.path().join("nope.jsonl"));
        assert!(queue.load_all().unwrap().is_empty());
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let initial = Duration::from_secs(1);
        let cap = Duration::from_secs(30);
        assert_eq!(next_backoff(0, initial, cap), Duration::from_secs(1));
        assert_eq!(next_backoff(1, initial, cap), Duration::from_secs(2));
        assert_eq!(next_backoff(2, initial, cap), Duration::from_secs(4));
        assert_eq!(next_backoff(10, initial, cap), cap);
    }
}
