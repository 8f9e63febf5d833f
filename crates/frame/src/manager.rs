//! FrameManager: the only writer for frames, events, and anchors.
//!
//! Every stack mutation — push, append, pin, pop — goes through here so
//! stack-depth and stack-tip discipline are enforced in one place instead of
//! scattered across callers.

use crate::digest;
use stackmemory_core::{
    clamp_priority, Anchor, AnchorId, AnchorType, DigestJson, Error, Event, EventId, EventType,
    Frame, FrameId, FrameManagerConfig, FrameState, FrameType, ProjectId, Result, RunId, Summarizer,
};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use stackmemory_store::Store;

/// Owns frame lifecycle: creation, event recording, anchoring, and close.
pub struct FrameManager {
    store: Arc<Store>,
    config: FrameManagerConfig,
    summarizer: Option<Arc<dyn Summarizer>>,
}

impl FrameManager {
    /// Build a FrameManager over an already-open store.
    pub fn new(
        store: Arc<Store>,
        config: FrameManagerConfig,
        summarizer: Option<Arc<dyn Summarizer>>,
    ) -> Self {
        FrameManager {
            store,
            config,
            summarizer,
        }
    }

    /// Push a new frame onto `run_id`'s stack.
    ///
    /// If `parent` is `None`, the parent is resolved to the run's current
    /// stack tip (or the frame becomes a new root if the stack is empty).
    pub fn create_frame(
        &self,
        run_id: RunId,
        project_id: ProjectId,
        frame_type: FrameType,
        name: impl Into<String>,
        inputs: Map<String, Value>,
        parent: Option<FrameId>,
    ) -> Result<FrameId> {
        let parent_frame_id = match parent {
            Some(id) => Some(id),
            None => self.store.stack_tip(&run_id),
        };

        let depth = match parent_frame_id {
            None => 0,
            Some(parent_id) => {
                let parent_frame = self
                    .store
                    .get_frame(parent_id)
                    .ok_or_else(|| Error::NotFound(format!("parent frame {parent_id}")))?;
                parent_frame.depth + 1
            }
        };

        if depth >= self.config.max_stack_depth {
            return Err(Error::Validation(format!(
                "stack depth {depth} exceeds max_stack_depth {}",
                self.config.max_stack_depth
            )));
        }

        let frame = Frame::new(
            FrameId::new(),
            run_id,
            project_id,
            parent_frame_id,
            depth,
            frame_type,
            name.into(),
            inputs,
            now_secs(),
        );
        let frame_id = frame.frame_id;
        self.store.insert_frame(frame)?;
        Ok(frame_id)
    }

    /// Append an event to an active frame. Fails if the frame is closed.
    pub fn record_event(
        &self,
        frame_id: FrameId,
        event_type: EventType,
        payload: Value,
    ) -> Result<EventId> {
        let frame = self
            .store
            .get_frame(frame_id)
            .ok_or_else(|| Error::NotFound(format!("frame {frame_id}")))?;
        if !frame.is_active() {
            return Err(Error::Integrity(format!(
                "frame {frame_id} is closed; cannot record further events"
            )));
        }

        // `seq` is assigned by the store under its write lock, atomically
        // with the table push, so concurrent callers on this frame can't
        // race each other into duplicate sequence numbers.
        let event = Event {
            event_id: EventId::new(),
            frame_id,
            run_id: frame.run_id,
            seq: 0,
            event_type,
            payload,
            ts: now_millis(),
        };
        let event_id = event.event_id;
        self.store.append_event(event)?;
        Ok(event_id)
    }

    /// Pin a fact to a frame.
    pub fn add_anchor(
        &self,
        frame_id: FrameId,
        anchor_type: AnchorType,
        text: impl Into<String>,
        priority: i32,
        metadata: Map<String, Value>,
    ) -> Result<AnchorId> {
        if self.store.get_frame(frame_id).is_none() {
            return Err(Error::NotFound(format!("frame {frame_id}")));
        }
        let anchor = Anchor {
            anchor_id: AnchorId::new(),
            frame_id,
            anchor_type,
            text: text.into(),
            priority: clamp_priority(priority),
            metadata,
            created_at: now_secs(),
        };
        let anchor_id = anchor.anchor_id;
        self.store.insert_anchor(anchor)?;
        Ok(anchor_id)
    }

    /// Close a frame: writes `outputs`, generates its digest, and pops it
    /// off the active stack.
    ///
    /// `allow_out_of_order` permits closing a frame that is not currently
    /// the stack tip (used by the RecoveryManager); direct callers should
    /// leave it `false` so stack discipline violations surface immediately.
    pub fn close_frame(
        &self,
        frame_id: FrameId,
        outputs: Map<String, Value>,
        allow_out_of_order: bool,
    ) -> Result<DigestJson> {
        let mut frame = self
            .store
            .get_frame(frame_id)
            .ok_or_else(|| Error::NotFound(format!("frame {frame_id}")))?;

        if !frame.is_active() {
            return Err(Error::Integrity(format!("frame {frame_id} is already closed")));
        }

        if !allow_out_of_order {
            let tip = self.store.stack_tip(&frame.run_id);
            if tip != Some(frame_id) {
                return Err(Error::not_stack_tip(frame_id));
            }
        }

        let now = now_secs();
        let events = self.store.events_of(frame_id);

        frame.outputs = outputs;
        frame.closed_at = Some(now);
        frame.state = if allow_out_of_order {
            FrameState::Recovered
        } else {
            FrameState::Closed
        };

        let digest = digest::generate(
            &frame,
            &events,
            now,
            self.summarizer.as_deref(),
            self.config.summarizer_timeout,
        );
        frame.digest_json = Some(digest.to_value());
        frame.digest_text = digest.ai.as_ref().map(|ai| ai.summary.clone());

        self.store.update_frame(frame)?;
        Ok(digest)
    }

    /// The active stack for a run, root-first.
    pub fn get_active_path(&self, run_id: &RunId) -> Vec<Frame> {
        self.store
            .stack(run_id)
            .into_iter()
            .filter_map(|id| self.store.get_frame(id))
            .collect()
    }

    /// Look up a single frame.
    pub fn get_frame(&self, frame_id: FrameId) -> Option<Frame> {
        self.store.get_frame(frame_id)
    }

    /// Events recorded on a frame, in append order.
    pub fn get_events(&self, frame_id: FrameId) -> Vec<Event> {
        self.store.events_of(frame_id)
    }

    /// Anchors pinned to a frame.
    pub fn get_anchors(&self, frame_id: FrameId) -> Vec<Anchor> {
        self.store.anchors_of(frame_id)
    }
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
