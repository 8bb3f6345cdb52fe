//! Undo/redo scopes.

use crate::instance::ResourceInstance;
use crate::types::Rid;
use parking_lot::Mutex;
use std::sync::Arc;

/// One recorded commit.
///
/// Snapshots are immutable once committed, so the record shares them with
/// the storage instead of copying.
#[derive(Debug, Clone)]
pub struct ChangeRecord {
    /// The resource that changed.
    pub rid: Rid,
    /// Snapshot before the commit. `None` for resources created in the scope.
    pub before: Option<Arc<ResourceInstance>>,
    /// Snapshot the commit published.
    pub after: Option<Arc<ResourceInstance>>,
}

/// An ordered log of commits that can be undone and redone together.
///
/// ```rust,ignore
/// let scope = db.create_scope("move point");
/// let mut point = db.write(rid)?;
/// point.set_float(0, 5.0);
/// point.commit(Some(&scope))?;
///
/// db.undo(&scope)?;
/// db.redo(&scope)?;
/// ```
#[derive(Debug)]
pub struct UndoRedoScope {
    name: String,
    records: Mutex<Vec<ChangeRecord>>,
}

impl UndoRedoScope {
    /// Creates an empty scope.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            records: Mutex::new(Vec::new()),
        }
    }

    /// The scope's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of recorded commits.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// The recorded commits, oldest first.
    pub fn records(&self) -> Vec<ChangeRecord> {
        self.records.lock().clone()
    }

    pub(crate) fn record(
        &self,
        rid: Rid,
        before: Option<Arc<ResourceInstance>>,
        after: Option<Arc<ResourceInstance>>,
    ) {
        self.records.lock().push(ChangeRecord { rid, before, after });
    }
}
