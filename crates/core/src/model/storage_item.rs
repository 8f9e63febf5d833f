//! StorageItem / MigrationJob: tier metadata for a frame's serialized bundle.

use crate::ids::{FrameId, JobId, StorageId};
use serde::{Deserialize, Serialize};

/// Where a frame's serialized payload currently resides.
///
/// Tiers form the ordered set `young < mature < old < remote`; a frame's
/// tier only ever moves forward, never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Age `< 1 day`, stored uncompressed.
    Young,
    /// Age `1-7 days`, LZ4 by default.
    Mature,
    /// Age `7-30 days`, ZSTD by default.
    Old,
    /// Age `> 30 days`, archived to cold object storage.
    Remote,
}

impl Tier {
    /// All tiers, youngest first.
    pub fn all() -> [Tier; 4] {
        [Tier::Young, Tier::Mature, Tier::Old, Tier::Remote]
    }

    /// Render as wire/string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Young => "young",
            Tier::Mature => "mature",
            Tier::Old => "old",
            Tier::Remote => "remote",
        }
    }
}

/// Compression codec applied to a StorageItem's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    /// No compression (young tier).
    None,
    /// LZ4 (mature tier default).
    Lz4,
    /// Zstandard (old tier default).
    Zstd,
    /// Gzip (universal fallback, remote tier).
    Gzip,
}

impl Compression {
    /// Render as wire/string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Lz4 => "lz4",
            Compression::Zstd => "zstd",
            Compression::Gzip => "gzip",
        }
    }

    /// File extension used in the remote object layout.
    pub fn extension(&self) -> &'static str {
        match self {
            Compression::None => "bin",
            Compression::Lz4 => "lz4",
            Compression::Zstd => "zst",
            Compression::Gzip => "gz",
        }
    }
}

/// Tier metadata for a frame's serialized (frame, events, anchors) bundle.
///
/// At most one StorageItem exists per frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageItem {
    /// Unique identifier.
    pub storage_id: StorageId,
    /// Frame this item stores.
    pub frame_id: FrameId,
    /// Current resident tier.
    pub tier: Tier,
    /// Encoded, possibly compressed payload. Empty once archived to `remote`,
    /// in which case `remote_key` names the object.
    pub data: Vec<u8>,
    /// Size of the encoded payload before compression.
    pub original_size: u64,
    /// Size of `data` (0 once archived remote).
    pub compressed_size: u64,
    /// Codec used to produce `data`.
    pub compression: Compression,
    /// Cached importance score, `[0, 1]`.
    pub importance: f64,
    /// Number of times this item has been read/referenced.
    pub access_count: u64,
    /// Last access time, unix seconds.
    pub last_accessed: i64,
    /// Creation time, unix seconds.
    pub created_at: i64,
    /// Object-store key once archived to `remote`; `None` otherwise.
    pub remote_key: Option<String>,
}

/// Status of a pending tier transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Queued, not yet picked up.
    Pending,
    /// Currently being processed.
    Running,
    /// Completed successfully.
    Done,
    /// Failed; see the job's `attempts` counter for retry history.
    Failed,
}

/// A pending tier transition for a StorageItem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationJob {
    /// Unique identifier.
    pub job_id: JobId,
    /// Item being migrated.
    pub item_id: StorageId,
    /// Current tier.
    pub from_tier: Tier,
    /// Target tier.
    pub to_tier: Tier,
    /// Higher runs first within a batch.
    pub priority: u8,
    /// Number of attempts made so far.
    pub attempts: u32,
    /// Current status.
    pub status: JobStatus,
    /// Creation time, unix seconds; used for `(priority desc, created_at asc)` ordering.
    pub created_at: i64,
}
