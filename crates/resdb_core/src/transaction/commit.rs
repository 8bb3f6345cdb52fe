//! Commit protocol.

use crate::database::Database;
use crate::error::{CoreError, CoreResult};
use crate::events::notify;
use crate::instance::ResourceInstance;
use crate::storage::ResourceStorage;
use crate::transaction::UndoRedoScope;
use crate::types::{FieldIndex, Rid};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

impl Database {
    /// Publishes a writer's copy.
    pub(crate) fn commit_write(
        &self,
        rid: Rid,
        based_on: Option<Arc<ResourceInstance>>,
        mut instance: ResourceInstance,
        scope: Option<&UndoRedoScope>,
    ) -> CoreResult<u64> {
        self.ensure_open()?;
        let storage = self
            .table
            .storage(rid)
            .ok_or_else(|| CoreError::resource_not_found(rid))?;

        instance.mark_read_only();
        let new = Arc::new(instance);
        let old = match based_on {
            Some(base) => {
                if !storage.compare_and_swap(&base, Arc::clone(&new)) {
                    self.stats.record_conflict();
                    warn!(%rid, "commit lost race to a concurrent writer, discarding");
                    return Err(CoreError::CommitConflict { rid });
                }
                Some(base)
            }
            None => {
                self.table.add_to_type(new.resource_type().id(), rid);
                storage.swap(Some(Arc::clone(&new)))
            }
        };
        self.stats.record_commit();

        if let Some(old) = &old {
            self.retire(Arc::clone(old));
        }
        let version = self.after_publish(rid, storage, old.as_deref(), Some(new.as_ref()));
        debug!(%rid, version, "committed");

        if let Some(scope) = scope {
            scope.record(rid, old, Some(new));
        }
        Ok(version)
    }

    /// Runs everything that follows a snapshot becoming visible.
    ///
    /// Returns the resource's new version.
    pub(crate) fn after_publish(
        &self,
        rid: Rid,
        storage: &ResourceStorage,
        old: Option<&ResourceInstance>,
        new: Option<&ResourceInstance>,
    ) -> u64 {
        self.sync_ownership(rid, old, new);
        let version = self.bump_versions(rid, storage);
        self.dispatch_change(rid, storage, old, new);
        if let Some(new) = new {
            if self.config().propagate_prototypes {
                self.propagate(rid, storage, old, new);
            }
        }
        version
    }

    /// Hands a displaced snapshot to the garbage collector.
    pub(crate) fn retire(&self, snapshot: Arc<ResourceInstance>) {
        self.gc.retire(snapshot);
        self.stats.record_retired();
    }

    /// Points children that entered an owning field at their new parent and
    /// releases children that left one.
    fn sync_ownership(
        &self,
        parent: Rid,
        old: Option<&ResourceInstance>,
        new: Option<&ResourceInstance>,
    ) {
        let edges = |instance: Option<&ResourceInstance>| -> HashSet<(FieldIndex, Rid)> {
            instance
                .map(|i| i.owned_children().into_iter().collect())
                .unwrap_or_default()
        };
        let before = edges(old);
        let after = edges(new);

        for &(field, child) in before.difference(&after) {
            if let Some(storage) = self.table.storage(child) {
                let mut meta = storage.meta.write();
                if meta.parent == Some((parent, field)) {
                    meta.parent = None;
                }
            }
        }
        for &(field, child) in after.difference(&before) {
            if child == parent || self.is_parent_of(child, parent) {
                warn!(%parent, %child, "ignoring ownership edge that would form a cycle");
                continue;
            }
            match self.table.storage(child) {
                Some(storage) => storage.meta.write().parent = Some((parent, field)),
                None => warn!(%parent, %child, "owned child has no storage"),
            }
        }
    }

    /// Bumps the version of `rid` and every ancestor, firing version
    /// listeners along the way.
    fn bump_versions(&self, rid: Rid, storage: &ResourceStorage) -> u64 {
        let version = storage.bump_version();
        notify_version(storage, rid, version);

        let mut visited = HashSet::from([rid]);
        let mut next = storage.meta.read().parent.map(|(parent, _)| parent);
        while let Some(ancestor) = next {
            if !visited.insert(ancestor) {
                warn!(%rid, %ancestor, "parent chain loops");
                break;
            }
            let Some(ancestor_storage) = self.table.storage(ancestor) else {
                break;
            };
            let ancestor_version = ancestor_storage.bump_version();
            notify_version(ancestor_storage, ancestor, ancestor_version);
            next = ancestor_storage.meta.read().parent.map(|(parent, _)| parent);
        }
        version
    }

    fn dispatch_change(
        &self,
        rid: Rid,
        storage: &ResourceStorage,
        old: Option<&ResourceInstance>,
        new: Option<&ResourceInstance>,
    ) {
        let Some(ty) = new.or(old).map(|i| i.resource_type().id()) else {
            return;
        };
        let local = storage.listeners.read().changes.interested(old, new);
        notify(&local, rid, old, new);
        let typed = self.events.interested(ty, old, new);
        notify(&typed, rid, old, new);
    }
}

fn notify_version(storage: &ResourceStorage, rid: Rid, version: u64) {
    let listeners = storage.listeners.read().versions.clone();
    for listener in &listeners {
        listener(rid, version);
    }
}
