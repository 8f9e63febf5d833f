//! In-process lifecycle event bus.
//!
//! The FrameManager itself stays ignorant of subscribers; the Engine wraps
//! every stack mutation and publishes to this bus afterward, so
//! CompactionGuard, TierStore, and a stats collector can react without the
//! FrameManager holding references to any of them.

use stackmemory_core::{FrameId, FrameType, ProjectId, RunId};
use std::sync::Arc;

/// One lifecycle notification.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    /// A frame was pushed onto a run's stack.
    FrameCreated {
        /// The new frame.
        frame_id: FrameId,
        /// Owning run.
        run_id: RunId,
        /// Owning project.
        project_id: ProjectId,
        /// Kind of frame.
        frame_type: FrameType,
    },
    /// A frame was closed (normally, not via recovery).
    FrameClosed {
        /// The closed frame.
        frame_id: FrameId,
        /// Owning run.
        run_id: RunId,
        /// Owning project.
        project_id: ProjectId,
    },
    /// Startup recovery closed one or more orphaned frames as `recovered`.
    FrameRecovered {
        /// Number of frames recovered in this pass.
        count: u64,
    },
}

type Subscriber = dyn Fn(&LifecycleEvent) + Send + Sync;

/// A narrow publish/subscribe channel. Subscribers run synchronously and
/// in registration order on the thread that publishes; a subscriber that
/// panics will unwind into the publisher, so handlers should be simple and
/// infallible (log-and-continue, not fail-the-operation).
#[derive(Default)]
pub struct EventBus {
    subscribers: parking_lot::RwLock<Vec<Arc<Subscriber>>>,
}

impl EventBus {
    /// Build an empty bus.
    pub fn new() -> Self {
        EventBus { subscribers: parking_lot::RwLock::new(Vec::new()) }
    }

    /// Register a subscriber. Returns nothing; subscribers live for the
    /// bus's lifetime (there is no unsubscribe — the engine's subscriber
    /// set is fixed at construction time).
    pub fn subscribe<F>(&self, handler: F)
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        self.subscribers.write().push(Arc::new(handler));
    }

    /// Publish an event to every subscriber, in registration order.
    pub fn publish(&self, event: LifecycleEvent) {
        for subscriber in self.subscribers.read().iter() {
            subscriber(&event);
        }
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn publish_reaches_every_subscriber() {
        let bus = EventBus::new();
        let a = Arc::new(AtomicU64::new(0));
        let b = Arc::new(AtomicU64::new(0));
        let (a1, b1) = (a.clone(), b.clone());
        bus.subscribe(move |_| {
            a1.fetch_add(1, Ordering::Relaxed);
        });
        bus.subscribe(move |_| {
            b1.fetch_add(1, Ordering::Relaxed);
        });

        bus.publish(LifecycleEvent::FrameRecovered { count: 1 });

        assert_eq!(a.load(Ordering::Relaxed), 1);
        assert_eq!(b.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn no_subscribers_is_a_silent_no_op() {
        let bus = EventBus::new();
        bus.publish(LifecycleEvent::FrameRecovered { count: 0 });
        assert_eq!(bus.subscriber_count(), 0);
    }
}
