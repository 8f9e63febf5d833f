//! TierStore: young/mature/old local tiers plus a remote cold archive,
//! compression codecs, age/importance-driven migration, and the offline
//! upload queue that backs provider outages.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod bundle;
mod codec;
mod offline_queue;
mod rehydration_cache;
mod store;

pub use bundle::FrameBundle;
pub use codec::{codec_for, compress_for_tier, preferred_for_tier, CompressionCodec};
pub use offline_queue::{next_backoff, OfflineEntry, OfflineQueue};
pub use store::{MigrationCycleReport, OfflineDrainReport, TierStore, DEFAULT_REMOTE_PREFIX};

impl stackmemory_gc::TierArchiver for TierStore {
    fn archive_to_remote(&self, item: &stackmemory_core::StorageItem) -> stackmemory_core::Result<()> {
        if item.tier == stackmemory_core::Tier::Remote {
            return Ok(());
        }
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        self.archive_frame_to_remote(item.frame_id, now)
    }
}
