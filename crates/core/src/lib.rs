//! Core types and traits for StackMemory.
//!
//! This crate defines the foundational, dependency-free types every other
//! crate builds on:
//! - `ids`: UUID and string-wrapper identifiers (FrameId, RunId, ...).
//! - `model`: domain entities (Frame, Event, Anchor, StorageItem, Digest).
//! - `error`: the unified `Error`/`Result` used by every operation.
//! - `traits`: the two external provider seams (`Summarizer`, `ColdStorageProvider`).
//! - `config`: per-component configuration, aggregated into `EngineConfig`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod ids;
pub mod model;
pub mod traits;

pub use config::{
    CompactionConfig, ContextBuilderConfig, DurabilityMode, EngineConfig, FrameManagerConfig,
    GcConfig, RecoveryConfig, ScorerWeights, StoreConfig, TierConfig,
};
pub use error::{Error, Result};
pub use ids::{AnchorId, CheckpointId, EventId, FrameId, JobId, ProjectId, RunId, StorageId};
pub use model::{
    clamp_priority, AiDigest, Anchor, AnchorType, Compression, DeterministicDigest, DigestJson,
    Event, EventType, Frame, FrameState, FrameType, JobStatus, MigrationJob, StorageItem, Tier,
};
pub use traits::{ColdStorageProvider, Summarizer, SummarizerOutput};
