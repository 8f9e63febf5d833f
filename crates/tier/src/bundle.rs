//! The serialized (frame, events, anchors) triple a StorageItem holds.

use serde::{Deserialize, Serialize};
use stackmemory_core::{Anchor, Error, Event, Frame, Result};

/// Everything `store_frame`/`retrieve_frame` round-trip for one frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameBundle {
    /// The frame row itself.
    pub frame: Frame,
    /// Its events, in `seq` order.
    pub events: Vec<Event>,
    /// Its anchors, in insertion order.
    pub anchors: Vec<Anchor>,
}

impl FrameBundle {
    /// Encode with `bincode`, the same compact binary format the store
    /// uses for its checkpoint snapshots.
    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| Error::Validation(format!("bundle encode failed: {e}")))
    }

    /// Decode a previously-encoded bundle. A failure here means the bytes
    /// are not a bundle at all (wrong codec chosen, or bit rot) rather than
    /// a codec mismatch, so it's `Corrupt` rather than `Validation`.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| Error::Corrupt(format!("bundle decode failed: {e}")))
    }
}
