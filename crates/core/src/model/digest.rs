//! DigestJson: the closed schema for a frame's close-time digest.
//!
//! The deterministic fields are required; the AI-generated portion is an
//! optional sub-object discriminated by `ai_generated` rather than a
//! duck-typed payload, so every digest round-trips through a fixed schema.

use serde::{Deserialize, Serialize};

/// Deterministic fields extracted from a frame's events at close time
/// (the non-model 60% of a hybrid digest).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeterministicDigest {
    /// Number of events recorded in the frame.
    pub events_count: u64,
    /// Distinct file paths touched by tool calls/results.
    pub files_touched: Vec<String>,
    /// Number of tool-call events, by tool name.
    pub tool_call_counts: std::collections::BTreeMap<String, u64>,
    /// Number of error events.
    pub error_count: u64,
    /// Frame duration in seconds (`closed_at - created_at`).
    pub duration_secs: i64,
    /// Coarse outcome: "ok", "error", or "unknown".
    pub exit_outcome: String,
}

/// The model-generated portion of a digest (the remaining 40% of a hybrid).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiDigest {
    /// Short prose summary.
    pub summary: String,
    /// Key decisions the Summarizer identified.
    pub key_decisions: Vec<String>,
    /// Insights learned during the frame.
    pub learned_insights: Vec<String>,
    /// Suggested next steps.
    pub next_steps: Vec<String>,
}

/// The full digest written exactly once at frame close.
///
/// `ai_generated = false` when the Summarizer timed out, failed, or was not
/// configured; in that case `ai` is `None` and only `deterministic` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestJson {
    /// Deterministic fields (always present).
    pub deterministic: DeterministicDigest,
    /// Model-generated fields, if the Summarizer succeeded in time.
    pub ai: Option<AiDigest>,
    /// Discriminator: whether `ai` was actually populated by a model call.
    pub ai_generated: bool,
}

impl DigestJson {
    /// Build a digest with only the deterministic portion (Summarizer absent/timed out).
    pub fn deterministic_only(deterministic: DeterministicDigest) -> Self {
        DigestJson {
            deterministic,
            ai: None,
            ai_generated: false,
        }
    }

    /// Build a digest with both portions populated.
    pub fn hybrid(deterministic: DeterministicDigest, ai: AiDigest) -> Self {
        DigestJson {
            deterministic,
            ai: Some(ai),
            ai_generated: true,
        }
    }

    /// Serialize to a `serde_json::Value` for storage in `Frame::digest_json`.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("DigestJson is always representable as JSON")
    }
}
