//! TierStore: owns the StorageItem/MigrationJob tables and every tier
//! transition. Grounded on the teacher's background-worker-with-its-own-
//! small-critical-sections pattern; the Store itself stays policy-free.

use chrono::{Datelike, TimeZone, Utc};
use parking_lot::Mutex;
use stackmemory_core::{
    ColdStorageProvider, Compression, Error, Frame, FrameId, JobStatus, MigrationJob, Result,
    StorageItem, Tier, TierConfig,
};
use stackmemory_store::Store;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::bundle::FrameBundle;
use crate::codec::{self, codec_for};
use crate::offline_queue::{next_backoff, OfflineEntry, OfflineQueue};
use crate::rehydration_cache::RehydrationCache;

/// Default object-key prefix for remote archives.
pub const DEFAULT_REMOTE_PREFIX: &str = "stackmemory/frames/";

/// Outcome of one `run_migration_cycle` call.
#[derive(Debug, Clone, Default)]
pub struct MigrationCycleReport {
    /// Jobs that migrated successfully (local-local or local-remote).
    pub succeeded: u64,
    /// Jobs parked on the offline queue after a provider failure.
    pub offlined: u64,
    /// Jobs that failed for a non-retryable reason (compression error).
    pub failed: u64,
}

/// Outcome of one `drain_offline_queue` call.
#[derive(Debug, Clone, Default)]
pub struct OfflineDrainReport {
    /// Entries that archived successfully and were removed from the queue.
    pub drained: u64,
    /// Entries still waiting (not yet due, or retried and failed again).
    pub remaining: u64,
    /// True if the connectivity probe itself failed and nothing was tried.
    pub probe_failed: bool,
}

/// Executes `store_frame`/`retrieve_frame`/tier transitions per the
/// young/mature/old/remote policy table.
pub struct TierStore {
    store: Arc<Store>,
    provider: Arc<dyn ColdStorageProvider>,
    config: TierConfig,
    remote_prefix: String,
    cache: RehydrationCache,
    offline_queue: OfflineQueue,
    migration_lock: Mutex<()>,
}

impl TierStore {
    /// Build a TierStore. `offline_queue_path` is where the disk-persisted
    /// retry queue lives; callers typically colocate it with the store's db
    /// file (e.g. `<db_path>.offline_queue.jsonl`).
    pub fn new(
        store: Arc<Store>,
        provider: Arc<dyn ColdStorageProvider>,
        config: TierConfig,
        offline_queue_path: PathBuf,
    ) -> Self {
        let cache = RehydrationCache::new(config.rehydration_cache_ttl);
        TierStore {
            store,
            provider,
            config,
            remote_prefix: DEFAULT_REMOTE_PREFIX.to_string(),
            cache,
            offline_queue: OfflineQueue::new(offline_queue_path),
            migration_lock: Mutex::new(()),
        }
    }

    /// Override the default remote object-key prefix.
    pub fn with_remote_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.remote_prefix = prefix.into();
        self
    }

    /// Serialize `(frame, events, anchors)`, compress per the tier implied
    /// by the frame's current age (always `young` for a frame just
    /// closed), and write a StorageItem.
    pub fn store_frame(
        &self,
        frame: Frame,
        events: Vec<stackmemory_core::Event>,
        anchors: Vec<stackmemory_core::Anchor>,
        now: i64,
    ) -> Result<stackmemory_core::StorageId> {
        let frame_id = frame.frame_id;
        let score = frame.score;
        let bundle = FrameBundle { frame, events, anchors };
        let encoded = bundle.encode()?;
        let mut tier = self.compute_target_tier(0, score);
        // Local storage is already over its hard limit: don't let a new
        // write land in `young` (least-compressed) and grow it further.
        // Store it pre-compressed at `mature` instead; `on_access`/the
        // migration cycle will move it the rest of the way as usual.
        if tier == Tier::Young && self.over_hard_limit() {
            tier = Tier::Mature;
        }
        let (compression, data) = codec::compress_for_tier(&encoded, tier);
        let item = StorageItem {
            storage_id: stackmemory_core::StorageId::new(),
            frame_id,
            tier,
            compressed_size: data.len() as u64,
            data,
            original_size: encoded.len() as u64,
            compression,
            importance: score,
            access_count: 0,
            last_accessed: now,
            created_at: now,
            remote_key: None,
        };
        let storage_id = item.storage_id;
        self.store.upsert_storage_item(item)?;
        Ok(storage_id)
    }

    /// Read back a frame's bundle, performing a cold fetch (with caching)
    /// if its current tier is `remote`.
    pub fn retrieve_frame(&self, frame_id: FrameId, now: i64) -> Result<FrameBundle> {
        let mut item = self
            .store
            .storage_item_for_frame(frame_id)
            .ok_or_else(|| Error::NotFound(format!("storage item for frame {frame_id}")))?;

        let bundle = if item.tier == Tier::Remote {
            if let Some(cached) = self.cache.get(frame_id, now) {
                cached
            } else {
                let key = item
                    .remote_key
                    .clone()
                    .ok_or_else(|| Error::Integrity(format!("remote item {frame_id} has no key")))?;
                let bytes = self.fetch_with_timeout(&key)?;
                let raw = codec_for(item.compression).decode(&bytes)?;
                let bundle = FrameBundle::decode(&raw)?;
                self.cache.put(frame_id, bundle.clone(), now);
                bundle
            }
        } else {
            let raw = codec_for(item.compression).decode(&item.data)?;
            FrameBundle::decode(&raw)?
        };

        item.access_count += 1;
        item.last_accessed = now;
        self.store.upsert_storage_item(item)?;
        Ok(bundle)
    }

    /// Compress `data` for `tier`, exposed directly since callers (the
    /// migration cycle) need the codec decision without a full store round
    /// trip.
    pub fn compress_for_tier(&self, data: &[u8], tier: Tier) -> (Compression, Vec<u8>) {
        codec::compress_for_tier(data, tier)
    }

    /// The tier a frame of this age and importance should reside in.
    /// Low-importance frames (`score < 0.3`) age through the ceilings at
    /// half the configured duration, shortening their local retention.
    pub fn compute_target_tier(&self, age_secs: i64, importance: f64) -> Tier {
        let effective_age = if importance < 0.3 { age_secs * 2 } else { age_secs };
        let young = self.config.young_ceiling.as_secs() as i64;
        let mature = self.config.mature_ceiling.as_secs() as i64;
        let old = self.config.old_ceiling.as_secs() as i64;
        if effective_age < young {
            Tier::Young
        } else if effective_age < mature {
            Tier::Mature
        } else if effective_age < old {
            Tier::Old
        } else {
            Tier::Remote
        }
    }

    /// Recompute the resident tier for `frame_id` and enqueue a migration
    /// job if the computed tier has moved forward of the resident one.
    /// Called on each access (context bundle assembly, explicit lookups).
    pub fn on_access(&self, frame_id: FrameId, now: i64) -> Result<()> {
        let item = match self.store.storage_item_for_frame(frame_id) {
            Some(item) => item,
            None => return Ok(()),
        };
        if item.tier == Tier::Remote {
            return Ok(());
        }
        let age = now - item.created_at;
        let target = self.compute_target_tier(age, item.importance);
        if target > item.tier {
            let job = MigrationJob {
                job_id: stackmemory_core::JobId::new(),
                item_id: item.storage_id,
                from_tier: item.tier,
                to_tier: target,
                priority: priority_for(target),
                attempts: 0,
                status: JobStatus::Pending,
                created_at: now,
            };
            self.store.enqueue_migration_job(job)?;
        }
        Ok(())
    }

    /// Process up to `migration_batch_per_minute` pending jobs. When local
    /// storage is over its soft limit, jobs are pulled lowest-importance
    /// first instead of by priority, so low-value frames are the first to
    /// shed local bytes.
    pub fn run_migration_cycle(&self, now: i64, stop: &AtomicBool) -> Result<MigrationCycleReport> {
        let _guard = self.migration_lock.lock();
        let mut report = MigrationCycleReport::default();
        let batch = self.config.migration_batch_per_minute as usize;
        let jobs = if self.over_soft_limit() {
            self.store.pending_migration_jobs_by_importance(batch)
        } else {
            self.store.pending_migration_jobs(batch)
        };
        for job in jobs {
            if stop.load(Ordering::Relaxed) {
                break;
            }
            let item = match self.store.get_storage_item(job.item_id) {
                Some(item) => item,
                None => {
                    self.store.delete_migration_job(job.job_id)?;
                    continue;
                }
            };
            let outcome = if job.to_tier == Tier::Remote {
                self.archive_frame_to_remote(item.frame_id, now)
            } else {
                self.migrate_local_to_local(&item, job.to_tier)
            };
            match outcome {
                Ok(()) => {
                    self.store.delete_migration_job(job.job_id)?;
                    report.succeeded += 1;
                }
                Err(e) if matches!(e, Error::Provider { .. } | Error::TransientIo(_)) => {
                    self.offline_failure(&job, e, now)?;
                    report.offlined += 1;
                }
                Err(e) => {
                    tracing::warn!(job_id = %job.job_id, error = %e, "migration job failed, item left untouched");
                    let mut failed = job.clone();
                    failed.status = JobStatus::Failed;
                    failed.attempts += 1;
                    self.store.update_migration_job(failed)?;
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    fn migrate_local_to_local(&self, item: &StorageItem, to_tier: Tier) -> Result<()> {
        let raw = codec_for(item.compression).decode(&item.data)?;
        let (compression, data) = codec::compress_for_tier(&raw, to_tier);
        let mut updated = item.clone();
        updated.tier = to_tier;
        updated.compression = compression;
        updated.compressed_size = data.len() as u64;
        updated.data = data;
        self.store.upsert_storage_item(updated)
    }

    /// Archive a frame's StorageItem to remote object storage. Idempotent:
    /// a no-op if already archived. This is the shared core both the
    /// migration cycle and the `TierArchiver` seam (called by GCWorker
    /// before deleting a frame) use.
    pub fn archive_frame_to_remote(&self, frame_id: FrameId, now: i64) -> Result<()> {
        let item = self
            .store
            .storage_item_for_frame(frame_id)
            .ok_or_else(|| Error::NotFound(format!("storage item for frame {frame_id}")))?;
        if item.tier == Tier::Remote && item.data.is_empty() {
            return Ok(());
        }
        let raw = codec_for(item.compression).decode(&item.data)?;
        let remote_codec = codec_for(Compression::Gzip);
        let remote_bytes = remote_codec.encode(&raw)?;
        let key = self.remote_key(frame_id, now, Compression::Gzip);
        self.provider.upload(&key, &remote_bytes)?;
        let mut updated = item;
        updated.tier = Tier::Remote;
        updated.compression = Compression::Gzip;
        updated.data = Vec::new();
        updated.compressed_size = 0;
        updated.remote_key = Some(key);
        self.store.upsert_storage_item(updated)
    }

    fn remote_key(&self, frame_id: FrameId, now: i64, compression: Compression) -> String {
        let dt = Utc.timestamp_opt(now, 0).single().unwrap_or_else(Utc::now);
        format!(
            "{}{:04}/{:02}/{}.{}",
            self.remote_prefix,
            dt.year(),
            dt.month(),
            frame_id,
            compression.extension()
        )
    }

    fn offline_failure(&self, job: &MigrationJob, err: Error, now: i64) -> Result<()> {
        let attempts = job.attempts + 1;
        tracing::warn!(job_id = %job.job_id, error = %err, attempts, "migration job failed, provider unreachable");
        if attempts >= self.config.max_attempts_before_offline_queue {
            let item = self.store.get_storage_item(job.item_id);
            let frame_id = match item {
                Some(item) => item.frame_id,
                None => return self.store.delete_migration_job(job.job_id),
            };
            let delay = next_backoff(attempts, self.config.backoff_initial, self.config.backoff_cap);
            self.offline_queue.enqueue(&OfflineEntry {
                job_id: job.job_id,
                frame_id,
                attempts,
                next_attempt_at: now + delay.as_secs() as i64,
            })?;
            self.store.delete_migration_job(job.job_id)
        } else {
            let mut updated = job.clone();
            updated.attempts = attempts;
            self.store.update_migration_job(updated)
        }
    }

    /// Probe connectivity, then retry every due offline entry. Entries that
    /// succeed are dropped; the rest are rewritten with advanced backoff.
    pub fn drain_offline_queue(&self, now: i64) -> Result<OfflineDrainReport> {
        let mut report = OfflineDrainReport::default();
        if !self.probe_connectivity() {
            report.probe_failed = true;
            report.remaining = self.offline_queue.load_all()?.len() as u64;
            return Ok(report);
        }
        let entries = self.offline_queue.load_all()?;
        let mut remaining = Vec::new();
        for entry in entries {
            if entry.next_attempt_at > now {
                remaining.push(entry);
                continue;
            }
            match self.archive_frame_to_remote(entry.frame_id, now) {
                Ok(()) => report.drained += 1,
                Err(e) => {
                    tracing::warn!(job_id = %entry.job_id, error = %e, "offline retry failed again");
                    let attempts = entry.attempts + 1;
                    let delay =
                        next_backoff(attempts, self.config.backoff_initial, self.config.backoff_cap);
                    remaining.push(OfflineEntry {
                        job_id: entry.job_id,
                        frame_id: entry.frame_id,
                        attempts,
                        next_attempt_at: now + delay.as_secs() as i64,
                    });
                }
            }
        }
        report.remaining = remaining.len() as u64;
        self.offline_queue.rewrite(&remaining)?;
        Ok(report)
    }

    fn probe_connectivity(&self) -> bool {
        self.provider.exists("__connectivity_probe__").is_ok()
    }

    fn fetch_with_timeout(&self, key: &str) -> Result<Vec<u8>> {
        let attempt = |provider: Arc<dyn ColdStorageProvider>, key: String| -> Result<Vec<u8>> {
            let (tx, rx) = std::sync::mpsc::channel();
            let key_for_thread = key.clone();
            std::thread::spawn(move || {
                let result = provider.download(&key_for_thread);
                let _ = tx.send(result);
            });
            match rx.recv_timeout(self.config.retrieval_timeout) {
                Ok(Ok(Some(bytes))) => Ok(bytes),
                Ok(Ok(None)) => Err(Error::NotFound(format!("remote object {key} missing"))),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(Error::TransientIo(format!("remote fetch of {key} timed out"))),
            }
        };
        match attempt(self.provider.clone(), key.to_string()) {
            Ok(bytes) => Ok(bytes),
            Err(_) => attempt(self.provider.clone(), key.to_string()),
        }
    }

    /// Total bytes of StorageItem payload currently resident locally.
    pub fn local_bytes_used(&self) -> u64 {
        self.store.local_bytes_used()
    }

    /// Whether local usage has crossed the configured hard limit, meaning
    /// new young-tier writes should be refused until migration catches up.
    pub fn over_hard_limit(&self) -> bool {
        self.local_bytes_used() >= self.config.local_hard_limit_bytes
    }

    /// Whether local usage has crossed the soft limit, meaning the next
    /// migration cycle should prioritize the lowest-importance items.
    pub fn over_soft_limit(&self) -> bool {
        self.local_bytes_used() >= self.config.local_soft_limit_bytes
    }
}

fn priority_for(to_tier: Tier) -> u8 {
    match to_tier {
        Tier::Young => 1,
        Tier::Mature => 3,
        Tier::Old => 5,
        Tier::Remote => 8,
    }
}
