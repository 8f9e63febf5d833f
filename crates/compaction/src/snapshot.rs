//! Extraction of a [`PreservationSnapshot`] from a frame's events.
//!
//! Mirrors the deterministic-field extraction in the frame crate's digest
//! generator: a single pass over events, grouping by what the spec asks a
//! preservation pass to remember rather than what a digest summarizes.

use serde::{Deserialize, Serialize};
use stackmemory_core::{Event, EventType};

const FILE_OPS: &[&str] = &["read", "write", "edit", "create", "delete"];
const RESOLUTION_WINDOW: usize = 3;

/// One tool invocation, with its outcome if the next event reported one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallSummary {
    /// Sequence number of the originating event.
    pub seq: u64,
    /// Tool name, or `"unknown"` if the payload didn't carry one.
    pub tool: String,
    /// Short human-readable summary of key inputs/outputs.
    pub summary: String,
    /// Whether the call succeeded, if that could be determined.
    pub success: Option<bool>,
}

/// A file touched by a tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileOperation {
    /// `read`, `write`, `edit`, `create`, or `delete`.
    pub op: String,
    /// Path touched.
    pub path: String,
    /// Whether the operation succeeded, if known.
    pub success: Option<bool>,
}

/// A recorded decision, captured verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreservedDecision {
    /// Sequence number of the decision event.
    pub seq: u64,
    /// Decision text.
    pub text: String,
}

/// An error and the tool calls that followed it, up to
/// [`RESOLUTION_WINDOW`] of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResolution {
    /// Sequence number of the error event.
    pub error_seq: u64,
    /// Error text.
    pub error_text: String,
    /// Tool names of the calls that followed, in order.
    pub resolution_tool_calls: Vec<String>,
}

/// Everything a single `COMPACTION_PRESERVE` anchor carries.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PreservationSnapshot {
    /// Tool calls in frame order.
    pub tool_calls: Vec<ToolCallSummary>,
    /// File operations in frame order.
    pub file_operations: Vec<FileOperation>,
    /// Decisions in frame order.
    pub decisions: Vec<PreservedDecision>,
    /// Error-to-resolution chains, one per error event.
    pub error_resolutions: Vec<ErrorResolution>,
}

fn payload_str<'a>(payload: &'a serde_json::Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| payload.get(k).and_then(|v| v.as_str()))
}

fn payload_bool(payload: &serde_json::Value, keys: &[&str]) -> Option<bool> {
    keys.iter().find_map(|k| payload.get(k).and_then(|v| v.as_bool()))
}

fn summarize_payload(payload: &serde_json::Value) -> String {
    match payload {
        serde_json::Value::Object(map) => {
            let mut parts: Vec<String> = map
                .iter()
                .filter(|(k, _)| *k != "tool")
                .take(4)
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            parts.sort();
            parts.join(", ")
        }
        other => other.to_string(),
    }
}

/// Build a snapshot from one frame's event log, in the order the spec names
/// its fields: tool-call summaries, file operations, decisions, then
/// error/resolution chains.
pub fn build(events: &[Event]) -> PreservationSnapshot {
    let mut snapshot = PreservationSnapshot::default();

    for (idx, event) in events.iter().enumerate() {
        match event.event_type {
            EventType::ToolCall => {
                let tool = payload_str(&event.payload, &["tool"]).unwrap_or("unknown").to_string();
                let success = events
                    .get(idx + 1)
                    .filter(|next| next.event_type == EventType::ToolResult)
                    .and_then(|next| payload_bool(&next.payload, &["success", "ok"]));
                snapshot.tool_calls.push(ToolCallSummary {
                    seq: event.seq,
                    tool: tool.clone(),
                    summary: summarize_payload(&event.payload),
                    success,
                });

                if let Some(path) = payload_str(&event.payload, &["path", "file"]) {
                    let op = if FILE_OPS.contains(&tool.as_str()) { tool } else { "other".to_string() };
                    snapshot.file_operations.push(FileOperation {
                        op,
                        path: path.to_string(),
                        success,
                    });
                }
            }
            EventType::Decision => {
                let text = payload_str(&event.payload, &["text", "decision"])
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| event.payload.to_string());
                snapshot.decisions.push(PreservedDecision { seq: event.seq, text });
            }
            EventType::Error => {
                let error_text = payload_str(&event.payload, &["text", "message", "error"])
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| event.payload.to_string());
                let resolution_tool_calls = events[idx + 1..]
                    .iter()
                    .filter(|e| e.event_type == EventType::ToolCall)
                    .take(RESOLUTION_WINDOW)
                    .map(|e| payload_str(&e.payload, &["tool"]).unwrap_or("unknown").to_string())
                    .collect();
                snapshot.error_resolutions.push(ErrorResolution {
                    error_seq: event.seq,
                    error_text,
                    resolution_tool_calls,
                });
            }
            _ => {}
        }
    }

    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;
    use stackmemory_core::{EventId, FrameId, RunId};

    fn event(seq: u64, event_type: EventType, payload: serde_json::Value) -> Event {
        Event { event_id: EventId::new(), frame_id: FrameId::new(), run_id: RunId::new("r1"), seq, event_type, payload, ts: 0 }
    }

    #[test]
    fn tool_call_picks_up_following_result() {
        let events = vec![
            event(1, EventType::ToolCall, serde_json::json!({"tool": "edit", "path": "a.rs"})),
            event(2, EventType::ToolResult, serde_json::json!({"success": true})),
        ];
        let snap = build(&events);
        assert_eq!(snap.tool_calls.len(), 1);
        assert_eq!(snap.tool_calls[0].success, Some(true));
        assert_eq!(snap.file_operations.len(), 1);
        assert_eq!(snap.file_operations[0].path, "a.rs");
    }

    #[test]
    fn error_collects_up_to_three_following_tool_calls() {
        let events = vec![
            event(1, EventType::Error, serde_json::json!({"message": "boom"})),
            event(2, EventType::ToolCall, serde_json::json!({"tool": "read"})),
            event(3, EventType::ToolCall, serde_json::json!({"tool": "edit"})),
            event(4, EventType::ToolCall, serde_json::json!({"tool": "test"})),
            event(5, EventType::ToolCall, serde_json::json!({"tool": "commit"})),
        ];
        let snap = build(&events);
        assert_eq!(snap.error_resolutions.len(), 1);
        assert_eq!(snap.error_resolutions[0].resolution_tool_calls, vec!["read", "edit", "test"]);
    }

    #[test]
    fn decision_text_falls_back_to_raw_payload() {
        let events = vec![event(1, EventType::Decision, serde_json::json!({"text": "use postgres"}))];
        let snap = build(&events);
        assert_eq!(snap.decisions[0].text, "use postgres");
    }
}
