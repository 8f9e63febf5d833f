//! Identifier types used throughout StackMemory.
//!
//! `RunId` and `ProjectId` are host-assigned scope boundaries (the hosting
//! session/process and the project directory), so they wrap plain interned
//! strings rather than generating their own. Every entity StackMemory itself
//! creates (frames, events, anchors, storage items, migration jobs) gets a
//! random UUID via the `uuid_id!` macro below.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            /// Create a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID (used when replaying from storage).
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Get the underlying UUID.
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }

            /// Parse from a string representation.
            pub fn from_string(s: &str) -> Option<Self> {
                Uuid::parse_str(s).ok().map(Self)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(FrameId, "Unique identifier for a Frame.");
uuid_id!(EventId, "Unique identifier for an Event.");
uuid_id!(AnchorId, "Unique identifier for an Anchor.");
uuid_id!(StorageId, "Unique identifier for a StorageItem.");
uuid_id!(JobId, "Unique identifier for a MigrationJob.");
uuid_id!(CheckpointId, "Unique identifier for a rehydration checkpoint.");

/// Identifier of the hosting session/process that owns a frame stack.
///
/// Host-assigned, not generated by StackMemory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunId(String);

impl RunId {
    /// Wrap a host-provided run identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RunId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Scope boundary for all queries; every store operation is parameterized
/// by a `ProjectId` so that multiple projects never see each other's frames.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProjectId(String);

impl ProjectId {
    /// Wrap a host-provided project identifier (typically a path or slug).
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ProjectId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_id_roundtrips_through_string() {
        let id = FrameId::new();
        let s = id.to_string();
        assert_eq!(FrameId::from_string(&s), Some(id));
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(FrameId::new(), FrameId::new());
    }

    #[test]
    fn run_id_display() {
        let run = RunId::new("session-42");
        assert_eq!(run.as_str(), "session-42");
        assert_eq!(run.to_string(), "session-42");
    }
}
