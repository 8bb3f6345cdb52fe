//! Storage slot for one RID.

use crate::events::StorageListeners;
use crate::instance::ResourceInstance;
use crate::schema::ResourceType;
use crate::types::{FieldIndex, Rid};
use arc_swap::{ArcSwapOption, Guard};
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Identity and relationship data of a resource.
#[derive(Debug, Default)]
pub(crate) struct StorageMeta {
    pub(crate) ty: Option<Arc<ResourceType>>,
    pub(crate) uuid: Option<Uuid>,
    pub(crate) path: Option<String>,
    /// Owning parent and the field that owns this resource.
    pub(crate) parent: Option<(Rid, FieldIndex)>,
    pub(crate) prototype: Option<Rid>,
    /// Resources created from this one as a prototype. Entries may be dead.
    pub(crate) prototype_instances: BTreeSet<Rid>,
}

/// The slot behind a RID.
///
/// `instance` is the only place a committed snapshot becomes visible, and it
/// is only ever replaced wholesale.
pub(crate) struct ResourceStorage {
    instance: ArcSwapOption<ResourceInstance>,
    version: AtomicU64,
    pub(crate) meta: RwLock<StorageMeta>,
    pub(crate) listeners: RwLock<StorageListeners>,
}

impl ResourceStorage {
    pub(crate) fn new() -> Self {
        Self {
            instance: ArcSwapOption::empty(),
            version: AtomicU64::new(0),
            meta: RwLock::new(StorageMeta::default()),
            listeners: RwLock::new(StorageListeners::default()),
        }
    }

    /// Borrows the current snapshot without touching its reference count.
    pub(crate) fn guard(&self) -> Guard<Option<Arc<ResourceInstance>>> {
        self.instance.load()
    }

    pub(crate) fn load(&self) -> Option<Arc<ResourceInstance>> {
        self.instance.load_full()
    }

    pub(crate) fn has_value(&self) -> bool {
        self.instance.load().is_some()
    }

    /// Publishes `next` only if `current` is still the visible snapshot.
    pub(crate) fn compare_and_swap(
        &self,
        current: &Arc<ResourceInstance>,
        next: Arc<ResourceInstance>,
    ) -> bool {
        let prev = self.instance.compare_and_swap(current, Some(next));
        matches!(&*prev, Some(prev) if Arc::ptr_eq(prev, current))
    }

    /// Publishes `next` unconditionally, returning what it displaced.
    pub(crate) fn swap(&self, next: Option<Arc<ResourceInstance>>) -> Option<Arc<ResourceInstance>> {
        self.instance.swap(next)
    }

    pub(crate) fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Increments the version and returns the new value.
    pub(crate) fn bump_version(&self) -> u64 {
        self.version.fetch_add(1, Ordering::AcqRel) + 1
    }
}
