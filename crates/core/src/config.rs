//! Per-component configuration structs, aggregated into `EngineConfig`.
//!
//! Every component takes its config by value at construction; nothing reads
//! environment variables or global state directly. Defaults mirror the
//! values a fresh project starts with.

use std::time::Duration;

/// Store-level limits.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database file path, relative to the project root.
    pub db_path: String,
    /// Durability mode for the write path.
    pub durability: DurabilityMode,
    /// Maximum time between fsyncs under `Batched` durability.
    pub batch_interval_ms: u64,
    /// Maximum writes between fsyncs under `Batched` durability.
    pub batch_size: usize,
}

impl StoreConfig {
    /// Maximum milliseconds between fsyncs under `Batched` durability.
    pub fn batch_interval_ms(&self) -> u64 {
        self.batch_interval_ms
    }

    /// Maximum writes between fsyncs under `Batched` durability.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            db_path: ".stackmemory/memory.db".to_string(),
            durability: DurabilityMode::Batched,
            batch_interval_ms: 100,
            batch_size: 1000,
        }
    }
}

/// How aggressively the store fsyncs the WAL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurabilityMode {
    /// No persistence; for tests only.
    InMemory,
    /// fsync after every write transaction.
    Strict,
    /// fsync on a timer, batching multiple transactions.
    Batched,
    /// Writes return before fsync completes; a background task flushes.
    Async,
}

/// FrameManager limits.
#[derive(Debug, Clone)]
pub struct FrameManagerConfig {
    /// Maximum stack depth before `create_frame` fails with `StackDepthExceeded`.
    pub max_stack_depth: u32,
    /// Per-call timeout given to the `Summarizer` during close-time digest
    /// generation. On expiry the digest is written deterministic-only.
    pub summarizer_timeout: Duration,
}

impl Default for FrameManagerConfig {
    fn default() -> Self {
        FrameManagerConfig {
            max_stack_depth: 10_000,
            summarizer_timeout: Duration::from_secs(2),
        }
    }
}

/// RecoveryManager timing.
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// How long an active frame from a dead run sits before it's reclaimed
    /// as an orphan.
    pub orphan_threshold: Duration,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        RecoveryConfig {
            orphan_threshold: Duration::from_secs(24 * 3600),
        }
    }
}

/// Weights for the four importance-score components. Must sum to `1.0`.
#[derive(Debug, Clone, Copy)]
pub struct ScorerWeights {
    /// Frame-type and depth baseline.
    pub base: f64,
    /// Output/error/file-touch impact.
    pub impact: f64,
    /// Explicit anchors and pinning.
    pub persistence: f64,
    /// Cross-frame reference count.
    pub reference: f64,
}

impl Default for ScorerWeights {
    fn default() -> Self {
        ScorerWeights {
            base: 0.4,
            impact: 0.3,
            persistence: 0.2,
            reference: 0.1,
        }
    }
}

impl ScorerWeights {
    /// Whether the four weights sum to `1.0` within floating point tolerance.
    pub fn is_normalized(&self) -> bool {
        (self.base + self.impact + self.persistence + self.reference - 1.0).abs() < 1e-9
    }
}

/// GCWorker cadence and batch sizing.
#[derive(Debug, Clone)]
pub struct GcConfig {
    /// Interval between collection cycles.
    pub cycle_interval: Duration,
    /// Maximum frames collected per cycle.
    pub frames_per_cycle: u32,
}

impl Default for GcConfig {
    fn default() -> Self {
        GcConfig {
            cycle_interval: Duration::from_secs(60),
            frames_per_cycle: 100,
        }
    }
}

/// Tier age ceilings and migration throughput.
#[derive(Debug, Clone)]
pub struct TierConfig {
    /// Age at which a young-tier frame becomes mature.
    pub young_ceiling: Duration,
    /// Age at which a mature-tier frame becomes old.
    pub mature_ceiling: Duration,
    /// Age at which an old-tier frame is archived to remote.
    pub old_ceiling: Duration,
    /// Rehydration cache TTL for remote-tier reads.
    pub rehydration_cache_ttl: Duration,
    /// Migration jobs processed per minute.
    pub migration_batch_per_minute: u32,
    /// Per-retrieval timeout for a remote-tier fetch.
    pub retrieval_timeout: Duration,
    /// Initial backoff delay for retryable provider calls.
    pub backoff_initial: Duration,
    /// Backoff delay cap.
    pub backoff_cap: Duration,
    /// Attempts before a migration job is parked in the offline queue.
    pub max_attempts_before_offline_queue: u32,
    /// Local resident-byte soft limit: crossing it triggers selective
    /// migration of the lowest-importance items first.
    pub local_soft_limit_bytes: u64,
    /// Local resident-byte hard limit: crossing it blocks new young-tier
    /// writes until migration brings usage back under the soft limit.
    pub local_hard_limit_bytes: u64,
    /// Interval between the engine's background migration cycles.
    pub migration_cycle_interval: Duration,
    /// Interval between offline-queue drain attempts.
    pub offline_drain_interval: Duration,
}

impl Default for TierConfig {
    fn default() -> Self {
        TierConfig {
            young_ceiling: Duration::from_secs(24 * 3600),
            mature_ceiling: Duration::from_secs(7 * 24 * 3600),
            old_ceiling: Duration::from_secs(30 * 24 * 3600),
            rehydration_cache_ttl: Duration::from_secs(30 * 60),
            migration_batch_per_minute: 50,
            retrieval_timeout: Duration::from_millis(500),
            backoff_initial: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(30),
            max_attempts_before_offline_queue: 3,
            local_soft_limit_bytes: 512 * 1024 * 1024,
            local_hard_limit_bytes: 1024 * 1024 * 1024,
            migration_cycle_interval: Duration::from_secs(60),
            offline_drain_interval: Duration::from_secs(120),
        }
    }
}

/// CompactionGuard thresholds, scaled off the host model's token limit.
#[derive(Debug, Clone)]
pub struct CompactionConfig {
    /// The hosting model's context window, in tokens.
    pub model_token_limit: u64,
    /// Fraction of `model_token_limit` at which a preservation pass triggers.
    pub warning_fraction: f64,
    /// Fraction of `model_token_limit` considered critical.
    pub critical_fraction: f64,
}

impl CompactionConfig {
    /// Construct from a model token limit, using the 0.9/0.95 defaults.
    pub fn new(model_token_limit: u64) -> Self {
        CompactionConfig {
            model_token_limit,
            warning_fraction: 0.9,
            critical_fraction: 0.95,
        }
    }

    /// Token count at which a preservation pass triggers.
    pub fn warning_threshold(&self) -> u64 {
        (self.model_token_limit as f64 * self.warning_fraction) as u64
    }

    /// Token count considered critical.
    pub fn critical_threshold(&self) -> u64 {
        (self.model_token_limit as f64 * self.critical_fraction) as u64
    }
}

impl Default for CompactionConfig {
    /// 200k tokens, matching a typical large-context host model.
    fn default() -> Self {
        CompactionConfig::new(200_000)
    }
}

/// ContextBuilder relevance blend and default budget.
#[derive(Debug, Clone, Copy)]
pub struct ContextBuilderConfig {
    /// Weight given to a closed frame's importance score.
    pub score_weight: f64,
    /// Weight given to recency when ranking closed frames for inclusion.
    pub recency_weight: f64,
    /// Default token budget when the caller doesn't specify one.
    pub default_token_budget: u64,
}

impl Default for ContextBuilderConfig {
    fn default() -> Self {
        ContextBuilderConfig {
            score_weight: 0.7,
            recency_weight: 0.3,
            default_token_budget: 8_000,
        }
    }
}

/// Aggregate configuration for the whole engine.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Store config.
    pub store: StoreConfig,
    /// FrameManager config.
    pub frame_manager: FrameManagerConfig,
    /// RecoveryManager config.
    pub recovery: RecoveryConfig,
    /// Scorer weights.
    pub scorer_weights: ScorerWeights,
    /// GCWorker config.
    pub gc: GcConfig,
    /// TierStore config.
    pub tier: TierConfig,
    /// CompactionGuard config.
    pub compaction: CompactionConfig,
    /// ContextBuilder config.
    pub context_builder: ContextBuilderConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_scorer_weights_are_normalized() {
        assert!(ScorerWeights::default().is_normalized());
    }

    #[test]
    fn compaction_thresholds_scale_with_token_limit() {
        let cfg = CompactionConfig::new(100_000);
        assert_eq!(cfg.warning_threshold(), 90_000);
        assert_eq!(cfg.critical_threshold(), 95_000);
    }

    #[test]
    fn context_builder_blend_sums_to_one() {
        let cfg = ContextBuilderConfig::default();
        assert!((cfg.score_weight + cfg.recency_weight - 1.0).abs() < 1e-9);
    }
}
