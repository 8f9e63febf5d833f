//! `Engine`: the facade a host constructs once per project and holds for
//! the lifetime of its process.
//!
//! Owns the Store handle, every component built on top of it, the
//! lifecycle event bus, and the background scheduler — mirroring the
//! teacher's `Database`, which aggregates storage, WAL, and recovery
//! behind one struct callers open once and pass around.

use crate::events::{EventBus, LifecycleEvent};
use crate::scheduler::{BackgroundScheduler, PeriodicJob};
use crate::search::{self, SearchFilters, SearchHit};
use parking_lot::Mutex;
use stackmemory_compaction::CompactionGuard;
use stackmemory_context::{ContextBuilder, ContextBundle};
use stackmemory_core::{
    Anchor, AnchorId, AnchorType, ColdStorageProvider, DigestJson, EngineConfig, Error, Event,
    EventId, EventType, Frame, FrameId, FrameType, ProjectId, Result, RunId, Summarizer, Tier,
};
use stackmemory_frame::FrameManager;
use stackmemory_gc::{GcCycleReport, GcWorker, TierArchiver};
use stackmemory_recovery::{RecoveryManager, RecoveryReport};
use stackmemory_scorer::{ImportanceTable, Scorer};
use stackmemory_store::Store;
use stackmemory_tier::{MigrationCycleReport, OfflineDrainReport, TierStore};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Resident-tier counts and limit pressure, for `get_storage_stats`.
#[derive(Debug, Clone)]
pub struct StorageStats {
    /// Bytes of StorageItem payload currently resident on local disk.
    pub local_bytes_used: u64,
    /// Whether local usage has crossed the soft limit.
    pub over_soft_limit: bool,
    /// Whether local usage has crossed the hard limit.
    pub over_hard_limit: bool,
    /// Items currently in the young tier.
    pub young_items: u64,
    /// Items currently in the mature tier.
    pub mature_items: u64,
    /// Items currently in the old tier.
    pub old_items: u64,
    /// Items currently in the remote tier (pointers only, no payload read).
    pub remote_items: u64,
}

/// Owns every component and exposes the stable in-process API described by
/// the external interfaces list: frame ops, query ops, context ops,
/// lifecycle ops, maintenance ops.
pub struct Engine {
    project_id: ProjectId,
    store: Arc<Store>,
    frame_manager: Arc<FrameManager>,
    recovery: RecoveryManager,
    scorer: Scorer,
    gc: Arc<GcWorker>,
    tier: Arc<TierStore>,
    context_builder: ContextBuilder,
    events: Arc<EventBus>,
    config: EngineConfig,
    scheduler: Mutex<Option<BackgroundScheduler>>,
    compaction_guards: Mutex<HashMap<RunId, Arc<CompactionGuard>>>,
}

impl Engine {
    /// Open (or create) the project's store and wire every component over
    /// it. Does not start background workers or run recovery; call
    /// [`Self::startup`] for that once the caller knows its own `run_id`.
    pub fn new(
        project_id: ProjectId,
        config: EngineConfig,
        cold_storage: Arc<dyn ColdStorageProvider>,
        summarizer: Option<Arc<dyn Summarizer>>,
    ) -> Result<Self> {
        let store = Arc::new(Store::open(&config.store)?);
        let frame_manager = Arc::new(FrameManager::new(store.clone(), config.frame_manager.clone(), summarizer));
        let recovery = RecoveryManager::new(store.clone(), frame_manager.clone(), config.recovery.clone());
        let scorer = Scorer::new(config.scorer_weights, ImportanceTable::default_table());

        let offline_queue_path = offline_queue_path_for(&config.store.db_path);
        let tier = Arc::new(TierStore::new(store.clone(), cold_storage, config.tier.clone(), offline_queue_path));
        let archiver: Arc<dyn TierArchiver> = tier.clone();
        let gc = Arc::new(GcWorker::new(store.clone(), archiver, config.gc.clone(), config.tier.clone()));

        let context_builder = ContextBuilder::new(store.clone(), config.context_builder);

        Ok(Engine {
            project_id,
            store,
            frame_manager,
            recovery,
            scorer,
            gc,
            tier,
            context_builder,
            events: Arc::new(EventBus::new()),
            config,
            scheduler: Mutex::new(None),
            compaction_guards: Mutex::new(HashMap::new()),
        })
    }

    /// Register a subscriber on the lifecycle event bus. See
    /// [`EventBus::subscribe`].
    pub fn subscribe<F>(&self, handler: F)
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(handler);
    }

    // ---- lifecycle ops -------------------------------------------------

    /// Run startup recovery for `current_run_id`, then start the
    /// background scheduler (GC, migration, offline-queue drain).
    pub fn startup(&self, current_run_id: &RunId) -> Result<RecoveryReport> {
        let report = self.recovery.run(current_run_id, now_secs())?;
        if report.orphans_recovered > 0 {
            self.events.publish(LifecycleEvent::FrameRecovered { count: report.orphans_recovered });
        }
        self.start_background(current_run_id.clone());
        Ok(report)
    }

    fn start_background(&self, current_run_id: RunId) {
        let scheduler = BackgroundScheduler::new();

        {
            let gc = self.gc.clone();
            let project = self.project_id.clone();
            let run = current_run_id.clone();
            scheduler.spawn(PeriodicJob::new("gc", self.config.gc.cycle_interval, move |stop| {
                if let Err(e) = gc.run_cycle(&project, &run, now_secs(), stop) {
                    tracing::warn!(error = %e, "gc cycle failed");
                }
            }));
        }
        {
            let tier = self.tier.clone();
            scheduler.spawn(PeriodicJob::new("migration", self.config.tier.migration_cycle_interval, move |stop| {
                if let Err(e) = tier.run_migration_cycle(now_secs(), stop) {
                    tracing::warn!(error = %e, "migration cycle failed");
                }
            }));
        }
        {
            let tier = self.tier.clone();
            scheduler.spawn(PeriodicJob::new("offline-drain", self.config.tier.offline_drain_interval, move |_stop| {
                if let Err(e) = tier.drain_offline_queue(now_secs()) {
                    tracing::warn!(error = %e, "offline queue drain failed");
                }
            }));
        }

        *self.scheduler.lock() = Some(scheduler);
    }

    /// Stop background workers, flush, and checkpoint the WAL. Safe to
    /// call even if `startup` was never called (workers just weren't
    /// running).
    pub fn shutdown(&self) -> Result<()> {
        if let Some(scheduler) = self.scheduler.lock().take() {
            scheduler.shutdown();
        }
        self.store.flush()?;
        self.store.checkpoint()?;
        Ok(())
    }

    // ---- maintenance ops -------------------------------------------------

    /// Run one GC cycle synchronously, scoped to this engine's project.
    pub fn force_gc_cycle(&self, current_run_id: &RunId) -> Result<GcCycleReport> {
        let stop = AtomicBool::new(false);
        self.gc.run_cycle(&self.project_id, current_run_id, now_secs(), &stop)
    }

    /// Run one migration cycle synchronously.
    pub fn force_migration_cycle(&self) -> Result<MigrationCycleReport> {
        let stop = AtomicBool::new(false);
        self.tier.run_migration_cycle(now_secs(), &stop)
    }

    /// Drain the offline upload queue synchronously.
    pub fn force_offline_drain(&self) -> Result<OfflineDrainReport> {
        self.tier.drain_offline_queue(now_secs())
    }

    /// Resident tier counts and local disk pressure.
    pub fn get_storage_stats(&self) -> StorageStats {
        StorageStats {
            local_bytes_used: self.tier.local_bytes_used(),
            over_soft_limit: self.tier.over_soft_limit(),
            over_hard_limit: self.tier.over_hard_limit(),
            young_items: self.store.storage_items_in_tier(Tier::Young).len() as u64,
            mature_items: self.store.storage_items_in_tier(Tier::Mature).len() as u64,
            old_items: self.store.storage_items_in_tier(Tier::Old).len() as u64,
            remote_items: self.store.storage_items_in_tier(Tier::Remote).len() as u64,
        }
    }

    // ---- query ops -------------------------------------------------------

    /// Ranked, filtered scan over this project's frames.
    pub fn search_frames(&self, query: &str, filters: &SearchFilters) -> Vec<SearchHit> {
        search::search_frames(&self.store, &self.project_id, query, filters)
    }

    /// Events recorded on a frame, in append order.
    pub fn get_events(&self, frame_id: FrameId) -> Vec<Event> {
        self.frame_manager.get_events(frame_id)
    }

    // ---- context ops -------------------------------------------------------

    /// Assemble a context bundle for `run_id`, never exceeding
    /// `token_budget` (or the configured default if `None`).
    pub fn build_context_bundle(&self, run_id: &RunId, token_budget: Option<u64>) -> Result<ContextBundle> {
        self.context_builder.build_context_bundle(&self.project_id, run_id, token_budget)
    }

    // ---- compaction ops -------------------------------------------------------

    /// Track `text`'s contribution to `run_id`'s estimated token usage,
    /// preserving critical context once a threshold is crossed. Returns
    /// whether a preservation pass fired.
    pub fn track_context_usage(&self, run_id: &RunId, text: &str) -> Result<bool> {
        self.compaction_guard_for(run_id).track(text, now_secs())
    }

    /// Rebuild a frame from `run_id`'s most recently preserved context.
    pub fn rehydrate_context(&self, run_id: &RunId) -> Result<FrameId> {
        self.compaction_guard_for(run_id).rehydrate()
    }

    /// Re-arm `run_id`'s compaction thresholds after the host's own
    /// compaction (and any rehydration) has completed.
    pub fn reset_compaction_window(&self, run_id: &RunId) {
        self.compaction_guard_for(run_id).reset_window();
    }

    /// Whether `text` contains a phrase indicating the host already
    /// summarized away earlier turns, suggesting a call to
    /// [`Self::rehydrate_context`] is due.
    pub fn detect_compaction(text: &str) -> bool {
        CompactionGuard::detect_compaction(text)
    }

    fn compaction_guard_for(&self, run_id: &RunId) -> Arc<CompactionGuard> {
        let mut guards = self.compaction_guards.lock();
        guards
            .entry(run_id.clone())
            .or_insert_with(|| {
                Arc::new(CompactionGuard::new(
                    self.frame_manager.clone(),
                    run_id.clone(),
                    self.project_id.clone(),
                    self.config.compaction.clone(),
                ))
            })
            .clone()
    }

    // ---- frame ops -------------------------------------------------------

    /// Push a new frame onto `run_id`'s stack.
    pub fn create_frame(
        &self,
        run_id: RunId,
        frame_type: FrameType,
        name: impl Into<String>,
        inputs: Map<String, Value>,
        parent: Option<FrameId>,
    ) -> Result<FrameId> {
        let project_id = self.project_id.clone();
        let run_for_event = run_id.clone();
        let frame_id = self.frame_manager.create_frame(run_id, project_id.clone(), frame_type, name, inputs, parent)?;
        self.events.publish(LifecycleEvent::FrameCreated { frame_id, run_id: run_for_event, project_id, frame_type });
        Ok(frame_id)
    }

    /// Append an event to an active frame.
    pub fn record_event(&self, frame_id: FrameId, event_type: EventType, payload: Value) -> Result<EventId> {
        self.frame_manager.record_event(frame_id, event_type, payload)
    }

    /// Pin a fact to a frame.
    pub fn add_anchor(
        &self,
        frame_id: FrameId,
        anchor_type: AnchorType,
        text: impl Into<String>,
        priority: i32,
        metadata: Map<String, Value>,
    ) -> Result<AnchorId> {
        self.frame_manager.add_anchor(frame_id, anchor_type, text, priority, metadata)
    }

    /// Close a frame: writes outputs, scores it, persists the scored frame,
    /// hands its bundle to the TierStore, and publishes `FrameClosed`.
    pub fn close_frame(&self, frame_id: FrameId, outputs: Map<String, Value>, allow_out_of_order: bool) -> Result<DigestJson> {
        let digest = self.frame_manager.close_frame(frame_id, outputs, allow_out_of_order)?;

        let frame = self
            .frame_manager
            .get_frame(frame_id)
            .ok_or_else(|| Error::NotFound(format!("frame {frame_id}")))?;
        let events = self.frame_manager.get_events(frame_id);
        let anchors = self.frame_manager.get_anchors(frame_id);
        let now = now_secs();
        let score = self.scorer.score(&frame, &events, &anchors, now);

        let mut scored = frame.clone();
        scored.score = score;
        self.store.update_frame(scored.clone())?;
        self.tier.store_frame(scored, events, anchors, now)?;

        self.events.publish(LifecycleEvent::FrameClosed {
            frame_id,
            run_id: frame.run_id,
            project_id: frame.project_id,
        });
        Ok(digest)
    }

    /// The active stack for a run, root-first.
    pub fn get_active_path(&self, run_id: &RunId) -> Vec<Frame> {
        self.frame_manager.get_active_path(run_id)
    }

    /// Look up a single frame.
    pub fn get_frame(&self, frame_id: FrameId) -> Option<Frame> {
        self.frame_manager.get_frame(frame_id)
    }

    /// Anchors pinned to a frame.
    pub fn get_anchors(&self, frame_id: FrameId) -> Vec<Anchor> {
        self.frame_manager.get_anchors(frame_id)
    }
}

fn offline_queue_path_for(db_path: &str) -> PathBuf {
    PathBuf::from(format!("{db_path}.offline_queue.jsonl"))
}

fn now_secs() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}
