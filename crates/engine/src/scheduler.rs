//! Background scheduler: runs a fixed set of named jobs on their own
//! timers, each on its own worker thread, all sharing one cooperative stop
//! token.
//!
//! Adapted from the priority task queue pattern of a classic background
//! worker pool: instead of workers pulling one-off tasks off a shared
//! queue, each job here owns a thread and a fixed interval, because the
//! engine's maintenance work (GC, migration, offline-queue drain) is a
//! small, known set of recurring cycles rather than an open-ended stream
//! of caller-submitted tasks. The shutdown discipline is the same: an
//! `AtomicBool` stop flag, a `Condvar` so sleeping workers wake immediately
//! instead of waiting out their interval, and a join of every handle so
//! `shutdown()` does not return until all workers have actually stopped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

/// One periodic unit of work the scheduler drives.
pub struct PeriodicJob {
    name: &'static str,
    interval: Duration,
    task: Box<dyn Fn(&AtomicBool) + Send + Sync>,
}

impl PeriodicJob {
    /// Build a named job. `task` receives the scheduler's cooperative stop
    /// flag so long-running cycles can check it between chunks.
    pub fn new(
        name: &'static str,
        interval: Duration,
        task: impl Fn(&AtomicBool) + Send + Sync + 'static,
    ) -> Self {
        PeriodicJob { name, interval, task: Box::new(task) }
    }
}

/// Runs a fixed set of [`PeriodicJob`]s, each on its own thread, until
/// [`BackgroundScheduler::shutdown`] is called.
pub struct BackgroundScheduler {
    stop: Arc<AtomicBool>,
    wake: Arc<(Mutex<()>, Condvar)>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl BackgroundScheduler {
    /// Build an idle scheduler. Call [`Self::spawn`] for each job, then let
    /// it run until [`Self::shutdown`].
    pub fn new() -> Self {
        BackgroundScheduler {
            stop: Arc::new(AtomicBool::new(false)),
            wake: Arc::new((Mutex::new(()), Condvar::new())),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// The cooperative stop token shared by every spawned job, exposed so
    /// synchronous callers (`force_gc_cycle`, etc) can pass the same token
    /// into a cycle run outside the timer loop.
    pub fn stop_token(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    /// Start `job` on its own thread. Panics from the job's task are
    /// caught so one misbehaving job cannot take down the scheduler or
    /// leave other jobs unjoined.
    pub fn spawn(&self, job: PeriodicJob) {
        let stop = self.stop.clone();
        let wake = self.wake.clone();
        let PeriodicJob { name, interval, task } = job;

        let handle = std::thread::Builder::new()
            .name(format!("stackmemory-{name}"))
            .spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    if let Err(panic) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| task(&stop))) {
                        tracing::warn!(job = name, ?panic, "background job panicked, skipping this cycle");
                    }
                    let (lock, cvar) = &*wake;
                    let guard = lock.lock().unwrap();
                    let _ = cvar.wait_timeout(guard, interval);
                }
                tracing::debug!(job = name, "background job stopped");
            })
            .expect("failed to spawn background worker thread");

        self.handles.lock().unwrap().push(handle);
    }

    /// Signal every job to stop at its next wake, wake them immediately,
    /// and block until all worker threads have joined. Idempotent: calling
    /// this twice is a no-op the second time (the handle list is already
    /// drained).
    pub fn shutdown(&self) {
        self.stop.store(true, Ordering::Relaxed);
        self.wake.1.notify_all();
        let mut handles = self.handles.lock().unwrap();
        for handle in handles.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Default for BackgroundScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BackgroundScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
