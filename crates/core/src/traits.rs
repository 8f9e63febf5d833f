//! Provider interfaces the core consumes.
//!
//! These are the only two external seams the Memory Engine reaches through.
//! Everything else (CLI, editor-protocol server, issue trackers, VCS) is an
//! external collaborator the core never imports.

use crate::error::Result;
use std::time::Duration;

/// Structured summary produced by a `Summarizer` for one frame's digest
/// (the AI-generated portion of a hybrid digest).
#[derive(Debug, Clone, Default)]
pub struct SummarizerOutput {
    /// Short prose summary of the frame.
    pub summary: String,
    /// Key decisions identified in the frame's events.
    pub key_decisions: Vec<String>,
    /// Insights the summarizer extracted.
    pub insights: Vec<String>,
    /// Suggested next steps.
    pub next_steps: Vec<String>,
}

/// Narrow capability the FrameManager calls into for the AI portion of a
/// close-time digest. The host wires in an LLM client; the core never talks
/// to one directly.
///
/// # Timeout contract
///
/// `summarize` must respect `timeout` itself: if it cannot produce a result
/// in time, it should return `Err` promptly rather than being externally
/// cancelled. The digest generator treats any `Err` the same way it treats
/// a timeout — it writes the deterministic-only digest.
pub trait Summarizer: Send + Sync {
    /// Summarize the given frame context.
    ///
    /// `context` is the deterministic digest material (events, files
    /// touched, counts) rendered as a prompt-ready string; the core does
    /// not interpret its contents.
    fn summarize(&self, context: &str, timeout: Duration) -> Result<SummarizerOutput>;
}

/// Abstract interface to a remote cold-object-store.
///
/// Implemented by the host for whatever backing store it uses (S3-like
/// object storage, a remote blob service, etc). The TierStore only ever
/// calls through this trait.
pub trait ColdStorageProvider: Send + Sync {
    /// Upload `bytes` under `key`, overwriting any existing object.
    fn upload(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Download the object at `key`, or `None` if it does not exist.
    fn download(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Whether an object exists at `key`.
    fn exists(&self, key: &str) -> Result<bool>;

    /// Delete the object at `key`. No-op if it does not exist.
    fn delete(&self, key: &str) -> Result<()>;

    /// List keys under `prefix`.
    fn list(&self, prefix: &str) -> Result<Vec<String>>;
}
