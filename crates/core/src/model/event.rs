//! Event: an immutable, sequenced record inside a frame.

use crate::ids::{EventId, FrameId, RunId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of event recorded within a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A tool invocation.
    ToolCall,
    /// The result of a tool invocation.
    ToolResult,
    /// A conversational message.
    Message,
    /// A recorded decision.
    Decision,
    /// An error.
    Error,
    /// A free-form note.
    Note,
}

impl EventType {
    /// Parse from wire/string form.
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "tool_call" => Self::ToolCall,
            "tool_result" => Self::ToolResult,
            "message" => Self::Message,
            "decision" => Self::Decision,
            "error" => Self::Error,
            "note" => Self::Note,
            _ => return None,
        })
    }

    /// Render as wire/string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ToolCall => "tool_call",
            Self::ToolResult => "tool_result",
            Self::Message => "message",
            Self::Decision => "decision",
            Self::Error => "error",
            Self::Note => "note",
        }
    }
}

/// An append-only record within a frame.
///
/// `(frame_id, seq)` is unique; `seq` is contiguous from 1 upward per frame.
/// Events are immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier.
    pub event_id: EventId,
    /// Owning frame.
    pub frame_id: FrameId,
    /// Hosting session/process, denormalized from the frame for fast filtering.
    pub run_id: RunId,
    /// Monotonic sequence number within the frame, starting at 1.
    pub seq: u64,
    /// Kind of event.
    pub event_type: EventType,
    /// Structured payload.
    pub payload: Value,
    /// Millisecond timestamp.
    pub ts: i64,
}
