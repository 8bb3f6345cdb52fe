//! Deferred reclamation of displaced snapshots.
//!
//! Readers may still hold a snapshot after a commit replaces it, so displaced
//! snapshots are parked on a multi-producer queue instead of being dropped
//! on the committing thread. [`Database::garbage_collect`](crate::Database::garbage_collect)
//! drains the queue. Call it at a point where no reader is expected to be
//! mid-read, such as between frames; snapshots still pinned through an
//! `Arc` simply outlive the drain.

use crate::instance::ResourceInstance;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::Arc;
use tracing::{debug, warn};

/// Retirement queue.
pub(crate) struct GarbageCollector {
    sender: Sender<Arc<ResourceInstance>>,
    receiver: Receiver<Arc<ResourceInstance>>,
}

impl GarbageCollector {
    pub(crate) fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    pub(crate) fn retire(&self, snapshot: Arc<ResourceInstance>) {
        if self.sender.send(snapshot).is_err() {
            warn!("retirement queue disconnected, dropping snapshot in place");
        }
    }

    /// Releases everything retired so far. Returns how many snapshots were
    /// released.
    pub(crate) fn collect(&self) -> usize {
        let released = self.receiver.try_iter().count();
        if released > 0 {
            debug!(released, "garbage collected");
        }
        released
    }

    pub(crate) fn pending(&self) -> usize {
        self.receiver.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ResourceType;
    use crate::types::ResourceTypeId;

    fn snapshot() -> Arc<ResourceInstance> {
        let ty = ResourceType::from_fields(ResourceTypeId::new(1), "Empty", vec![]);
        Arc::new(ResourceInstance::new(Arc::new(ty)))
    }

    #[test]
    fn collect_drains_queue() {
        let gc = GarbageCollector::new();
        gc.retire(snapshot());
        gc.retire(snapshot());
        assert_eq!(gc.pending(), 2);
        assert_eq!(gc.collect(), 2);
        assert_eq!(gc.pending(), 0);
        assert_eq!(gc.collect(), 0);
    }

    #[test]
    fn pinned_snapshots_survive_collection() {
        let gc = GarbageCollector::new();
        let pinned = snapshot();
        gc.retire(Arc::clone(&pinned));
        gc.collect();
        assert_eq!(Arc::strong_count(&pinned), 1);
    }

    #[test]
    fn producers_on_many_threads() {
        let gc = GarbageCollector::new();
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..25 {
                        gc.retire(snapshot());
                    }
                });
            }
        });
        assert_eq!(gc.collect(), 100);
    }
}
