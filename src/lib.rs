//! # StackMemory
//!
//! A project-scoped, lossless memory runtime for AI coding assistants: a
//! call-stack-of-frames data model, deterministic importance scoring,
//! tiered local/remote storage, generational garbage collection, and
//! pre-compaction context preservation, all behind one [`Engine`] value a
//! host opens once per project.
//!
//! # Quick start
//!
//! ```no_run
//! use stackmemory::{ColdStorageProvider, Engine, EngineConfig, FrameType, ProjectId, Result, RunId};
//! use std::sync::Arc;
//!
//! struct NoopProvider;
//! impl ColdStorageProvider for NoopProvider {
//!     fn upload(&self, _key: &str, _bytes: &[u8]) -> Result<()> { Ok(()) }
//!     fn download(&self, _key: &str) -> Result<Option<Vec<u8>>> { Ok(None) }
//!     fn exists(&self, _key: &str) -> Result<bool> { Ok(false) }
//!     fn delete(&self, _key: &str) -> Result<()> { Ok(()) }
//!     fn list(&self, _prefix: &str) -> Result<Vec<String>> { Ok(Vec::new()) }
//! }
//!
//! fn main() -> Result<()> {
//!     let engine = Engine::new(
//!         ProjectId::new("my-project"),
//!         EngineConfig::default(),
//!         Arc::new(NoopProvider),
//!         None,
//!     )?;
//!     let run_id = RunId::new("run-1");
//!     engine.startup(&run_id)?;
//!
//!     let frame_id = engine.create_frame(run_id.clone(), FrameType::Task, "fix the bug", Default::default(), None)?;
//!     engine.close_frame(frame_id, Default::default(), false)?;
//!
//!     engine.shutdown()?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! [`Engine`] is the only entry point a host needs; it owns the store and
//! every subsystem built on top of it (frame lifecycle, scoring, tiering,
//! garbage collection, compaction, context assembly) and runs their
//! recurring maintenance work on its own background scheduler. The
//! per-concern crates underneath (`stackmemory-store`, `stackmemory-frame`,
//! `stackmemory-scorer`, `stackmemory-gc`, `stackmemory-tier`,
//! `stackmemory-compaction`, `stackmemory-context`, `stackmemory-recovery`)
//! are implementation detail; only this crate's surface is stable.

pub use stackmemory_core::config::{
    CompactionConfig, ContextBuilderConfig, DurabilityMode, EngineConfig, FrameManagerConfig,
    GcConfig, RecoveryConfig, ScorerWeights, StoreConfig, TierConfig,
};
pub use stackmemory_core::{
    Anchor, AnchorId, AnchorType, ColdStorageProvider, Compression, DigestJson, Error, Event,
    EventId, EventType, Frame, FrameId, FrameType, JobId, JobStatus, MigrationJob, ProjectId,
    Result, RunId, StorageId, StorageItem, Summarizer, SummarizerOutput, Tier,
};
pub use stackmemory_engine::{
    BackgroundScheduler, Engine, EventBus, GcCycleReport, LifecycleEvent, MigrationCycleReport,
    OfflineDrainReport, PeriodicJob, RecoveryReport, SearchFilters, SearchHit, StorageStats,
};
pub use stackmemory_context::{AnchorSummary, ContextBundle, DigestSummary, FrameSummary};
