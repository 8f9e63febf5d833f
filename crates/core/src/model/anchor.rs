//! Anchor: a pinned, prioritized fact attached to a frame.

use crate::ids::{AnchorId, FrameId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Kind of fact an anchor pins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorType {
    /// A recorded decision.
    Decision,
    /// A constraint the work must respect.
    Constraint,
    /// An interface contract.
    Interface,
    /// A plain fact.
    Fact,
    /// A known risk.
    Risk,
    /// Outstanding follow-up work.
    Todo,
    /// An error worth remembering.
    Error,
    /// A recurring pattern.
    Pattern,
    /// Material captured ahead of an anticipated context compaction.
    CompactionPreserve,
}

impl AnchorType {
    /// Parse from wire/string form.
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "DECISION" => Self::Decision,
            "CONSTRAINT" => Self::Constraint,
            "INTERFACE" => Self::Interface,
            "FACT" => Self::Fact,
            "RISK" => Self::Risk,
            "TODO" => Self::Todo,
            "ERROR" => Self::Error,
            "PATTERN" => Self::Pattern,
            "COMPACTION_PRESERVE" => Self::CompactionPreserve,
            _ => return None,
        })
    }

    /// Render as wire/string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Decision => "DECISION",
            Self::Constraint => "CONSTRAINT",
            Self::Interface => "INTERFACE",
            Self::Fact => "FACT",
            Self::Risk => "RISK",
            Self::Todo => "TODO",
            Self::Error => "ERROR",
            Self::Pattern => "PATTERN",
            Self::CompactionPreserve => "COMPACTION_PRESERVE",
        }
    }
}

/// Clamp a raw priority into the valid `1..=10` range.
pub fn clamp_priority(priority: i32) -> u8 {
    priority.clamp(1, 10) as u8
}

/// A typed, prioritized, pinned fact attached to a frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anchor {
    /// Unique identifier.
    pub anchor_id: AnchorId,
    /// Owning frame.
    pub frame_id: FrameId,
    /// Kind of fact.
    pub anchor_type: AnchorType,
    /// Free text.
    pub text: String,
    /// Priority, `1..=10`; higher wins ties.
    pub priority: u8,
    /// Structured metadata.
    pub metadata: Map<String, Value>,
    /// Creation time, unix seconds.
    pub created_at: i64,
}
