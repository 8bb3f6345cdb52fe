//! Database statistics.
//!
//! Counters are atomic and may be read while other threads commit.
//!
//! ```rust,ignore
//! let db = Database::init();
//! // ... create, commit, undo ...
//! let stats = db.stats();
//! println!("commits: {} (lost races: {})", stats.commits, stats.commit_conflicts);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters for a database.
#[derive(Debug, Default)]
pub struct DatabaseStats {
    created: AtomicU64,
    destroyed: AtomicU64,
    commits: AtomicU64,
    commit_conflicts: AtomicU64,
    undo_applied: AtomicU64,
    redo_applied: AtomicU64,
    propagations: AtomicU64,
    retired: AtomicU64,
    collected: AtomicU64,
    pages_allocated: AtomicU64,
}

impl DatabaseStats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_created(&self) {
        self.created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_destroyed(&self) {
        self.destroyed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_commit(&self) {
        self.commits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_conflict(&self) {
        self.commit_conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_undo(&self) {
        self.undo_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_redo(&self) {
        self.redo_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_propagation(&self) {
        self.propagations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retired(&self) {
        self.retired.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_collected(&self, count: u64) {
        self.collected.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_page(&self) {
        self.pages_allocated.fetch_add(1, Ordering::Relaxed);
    }

    /// Takes a point-in-time copy of every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            created: self.created.load(Ordering::Relaxed),
            destroyed: self.destroyed.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            commit_conflicts: self.commit_conflicts.load(Ordering::Relaxed),
            undo_applied: self.undo_applied.load(Ordering::Relaxed),
            redo_applied: self.redo_applied.load(Ordering::Relaxed),
            propagations: self.propagations.load(Ordering::Relaxed),
            retired: self.retired.load(Ordering::Relaxed),
            collected: self.collected.load(Ordering::Relaxed),
            pages_allocated: self.pages_allocated.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`DatabaseStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Resources created (create, clone, prototype instantiation, deserialize).
    pub created: u64,
    /// Resources destroyed, cascades included.
    pub destroyed: u64,
    /// Successful commits.
    pub commits: u64,
    /// Commits that lost a race and were discarded.
    pub commit_conflicts: u64,
    /// Undo scope applications.
    pub undo_applied: u64,
    /// Redo scope applications.
    pub redo_applied: u64,
    /// Prototype edits cascaded to instances.
    pub propagations: u64,
    /// Snapshots handed to the retirement queue.
    pub retired: u64,
    /// Retired snapshots released by garbage collection.
    pub collected: u64,
    /// Storage pages allocated.
    pub pages_allocated: u64,
}

impl StatsSnapshot {
    /// Snapshots retired but not yet collected.
    #[must_use]
    pub fn pending_garbage(&self) -> u64 {
        self.retired.saturating_sub(self.collected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        assert_eq!(DatabaseStats::new().snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn record_and_snapshot() {
        let stats = DatabaseStats::new();
        stats.record_commit();
        stats.record_commit();
        stats.record_conflict();
        stats.record_retired();
        stats.record_retired();
        stats.record_collected(1);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.commits, 2);
        assert_eq!(snapshot.commit_conflicts, 1);
        assert_eq!(snapshot.pending_garbage(), 1);
    }
}
