//! Output types for a context bundle.

use serde::{Deserialize, Serialize};
use stackmemory_core::{AnchorId, AnchorType, FrameId, FrameState, FrameType};

/// Compact summary of one frame on the active path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameSummary {
    /// The frame's id.
    pub frame_id: FrameId,
    /// Kind of frame.
    pub frame_type: FrameType,
    /// Frame name.
    pub name: String,
    /// Short digest text, if the frame has been closed.
    pub digest_text: Option<String>,
    /// Lifecycle state.
    pub state: FrameState,
}

/// One anchor included in a bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnchorSummary {
    /// The anchor's id.
    pub anchor_id: AnchorId,
    /// Owning frame.
    pub frame_id: FrameId,
    /// Kind of fact.
    pub anchor_type: AnchorType,
    /// Free text.
    pub text: String,
    /// Priority, `1..=10`.
    pub priority: u8,
}

/// A closed frame included as a relevant digest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestSummary {
    /// The frame's id.
    pub frame_id: FrameId,
    /// Frame name.
    pub name: String,
    /// Short digest text.
    pub digest_text: Option<String>,
    /// Cached importance score.
    pub score: f64,
}

/// The assembled context bundle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextBundle {
    /// Root-to-tip frames on the active path.
    pub active_path: Vec<FrameSummary>,
    /// Top-ranked anchors across the active path and recently closed frames.
    pub anchors: Vec<AnchorSummary>,
    /// Relevant closed-frame digests, ordered by blended score/recency.
    pub digests: Vec<DigestSummary>,
    /// Identifiers of remote-tier frames that matched the digest ordering
    /// but whose payload wasn't pulled in (pointer only, no cold fetch).
    pub remote_pointers: Vec<FrameId>,
    /// Number of candidate items dropped because the token budget ran out.
    pub truncated_count: u64,
}
