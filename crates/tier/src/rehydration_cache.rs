//! Bounded, TTL-based cache of frame bundles fetched from remote storage.
//!
//! Cold fetches are the slow path; once paid for, the result sticks around
//! for `ttl` so a burst of context-builder reads against the same remote
//! frame doesn't re-pay the round trip.

use parking_lot::Mutex;
use stackmemory_core::FrameId;
use std::collections::HashMap;
use std::time::Duration;

use crate::bundle::FrameBundle;

const MAX_ENTRIES: usize = 256;

struct CacheEntry {
    bundle: FrameBundle,
    expires_at: i64,
}

/// Fixed-capacity, TTL-expiring cache keyed by frame id.
pub struct RehydrationCache {
    ttl: Duration,
    entries: Mutex<HashMap<FrameId, CacheEntry>>,
}

impl RehydrationCache {
    /// Build an empty cache with the given TTL.
    pub fn new(ttl: Duration) -> Self {
        RehydrationCache { ttl, entries: Mutex::new(HashMap::new()) }
    }

    /// Fetch a cached bundle if present and not expired.
    pub fn get(&self, frame_id: FrameId, now: i64) -> Option<FrameBundle> {
        let mut entries = self.entries.lock();
        match entries.get(&frame_id) {
            Some(entry) if entry.expires_at > now => Some(entry.bundle.clone()),
            Some(_) => {
                entries.remove(&frame_id);
                None
            }
            None => None,
        }
    }

    /// Insert or refresh a cached bundle, evicting the oldest entry first
    /// if the cache is at capacity.
    pub fn put(&self, frame_id: FrameId, bundle: FrameBundle, now: i64) {
        let mut entries = self.entries.lock();
        if entries.len() >= MAX_ENTRIES && !entries.contains_key(&frame_id) {
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, e)| e.expires_at)
                .map(|(id, _)| *id)
            {
                entries.remove(&oldest);
            }
        }
        entries.insert(
            frame_id,
            CacheEntry { bundle, expires_at: now + self.ttl.as_secs() as i64 },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stackmemory_core::{Frame, FrameType, ProjectId, RunId};

    fn dummy_bundle() -> FrameBundle {
        FrameBundle {
            frame: Frame::new(
                FrameId::new(),
                RunId::new("r"),
                ProjectId::new("p"),
                None,
                0,
                FrameType::Task,
                "x".to_string(),
                serde_json::Map::new(),
                0,
            ),
            events: Vec::new(),
            anchors: Vec::new(),
        }
    }

    #[test]
    fn fresh_entry_is_returned() {
        let cache = RehydrationCache::new(Duration::from_secs(1800));
        let bundle = dummy_bundle();
        let id = bundle.frame.frame_id;
        cache.put(id, bundle, 1000);
        assert!(cache.get(id, 1500).is_some());
    }

    #[test]
    fn expired_entry_is_evicted_on_read() {
        let cache = RehydrationCache::new(Duration::from_secs(10));
        let bundle = dummy_bundle();
        let id = bundle.frame.frame_id;
        cache.put(id, bundle, 1000);
        assert!(cache.get(id, 1011).is_none());
        assert!(cache.get(id, 1011).is_none());
    }

    #[test]
    fn miss_returns_none() {
        let cache = RehydrationCache::new(Duration::from_secs(1800));
        assert!(cache.get(FrameId::new(), 0).is_none());
    }
}
