//! Frame: a scoped unit of work and node of the call-stack tree.

use crate::ids::{FrameId, ProjectId, RunId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Kind of work a frame represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameType {
    /// A general unit of work.
    Task,
    /// Investigating a bug or unexpected behavior.
    Debug,
    /// Building a new capability.
    Feature,
    /// Structural or cross-cutting design work.
    Architecture,
    /// Reviewing existing work.
    Review,
    /// A notable checkpoint in a larger body of work.
    Milestone,
    /// Handling or investigating an error.
    Error,
    /// A file or data write.
    Write,
    /// Recording a decision.
    Decision,
    /// Anything not covered by the above.
    Other,
}

impl FrameType {
    /// Parse a frame type from its wire/string form.
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "task" => Self::Task,
            "debug" => Self::Debug,
            "feature" => Self::Feature,
            "architecture" => Self::Architecture,
            "review" => Self::Review,
            "milestone" => Self::Milestone,
            "error" => Self::Error,
            "write" => Self::Write,
            "decision" => Self::Decision,
            "other" => Self::Other,
            _ => return None,
        })
    }

    /// Render the frame type as its wire/string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Debug => "debug",
            Self::Feature => "feature",
            Self::Architecture => "architecture",
            Self::Review => "review",
            Self::Milestone => "milestone",
            Self::Error => "error",
            Self::Write => "write",
            Self::Decision => "decision",
            Self::Other => "other",
        }
    }
}

/// Lifecycle state of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameState {
    /// Currently on the active path; may still receive events/anchors.
    Active,
    /// Closed normally through `close_frame`.
    Closed,
    /// Closed out-of-order by the RecoveryManager.
    Recovered,
}

/// A scoped unit of work: a node in the call-stack tree.
///
/// `FrameManager` is the only writer; every other component reads through it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    /// Unique identifier, stable for the lifetime of the frame.
    pub frame_id: FrameId,
    /// Hosting session/process that created this frame.
    pub run_id: RunId,
    /// Project scope boundary.
    pub project_id: ProjectId,
    /// Parent frame, or `None` for a root frame.
    pub parent_frame_id: Option<FrameId>,
    /// Depth in the stack tree; root is 0.
    pub depth: u32,
    /// What kind of work this frame represents.
    pub frame_type: FrameType,
    /// Human-readable label.
    pub name: String,
    /// Lifecycle state.
    pub state: FrameState,
    /// Structured input parameters the frame was created with.
    pub inputs: Map<String, Value>,
    /// Structured results; empty until the frame is closed.
    pub outputs: Map<String, Value>,
    /// Optional short free-text summary.
    pub digest_text: Option<String>,
    /// Structured digest; populated at close.
    pub digest_json: Option<Value>,
    /// Creation time, unix seconds.
    pub created_at: i64,
    /// Close time, unix seconds; `None` while active.
    pub closed_at: Option<i64>,
    /// Importance score in `[0, 1]`, filled by the Scorer.
    pub score: f64,
}

impl Frame {
    /// Construct a new active root or child frame. Callers (FrameManager)
    /// are responsible for depth/parent invariants.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        frame_id: FrameId,
        run_id: RunId,
        project_id: ProjectId,
        parent_frame_id: Option<FrameId>,
        depth: u32,
        frame_type: FrameType,
        name: String,
        inputs: Map<String, Value>,
        created_at: i64,
    ) -> Self {
        Frame {
            frame_id,
            run_id,
            project_id,
            parent_frame_id,
            depth,
            frame_type,
            name,
            state: FrameState::Active,
            inputs,
            outputs: Map::new(),
            digest_text: None,
            digest_json: None,
            created_at,
            closed_at: None,
            score: 0.0,
        }
    }

    /// Whether this frame is the root of its stack tree.
    pub fn is_root(&self) -> bool {
        self.depth == 0 && self.parent_frame_id.is_none()
    }

    /// Whether this frame is still open: `state == Active` iff `closed_at` is unset.
    pub fn is_active(&self) -> bool {
        matches!(self.state, FrameState::Active) && self.closed_at.is_none()
    }
}
