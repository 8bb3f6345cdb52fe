//! Identity tables: RID allocation, UUID and path indices, type membership.

use crate::error::CoreResult;
use crate::stats::DatabaseStats;
use crate::storage::{PageTable, ResourceStorage};
use crate::types::{ResourceTypeId, Rid};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

pub(crate) struct ResourceTable {
    pages: PageTable,
    next_id: AtomicU64,
    uuids: Mutex<HashMap<Uuid, Rid>>,
    paths: Mutex<HashMap<String, Rid>>,
    by_type: RwLock<HashMap<ResourceTypeId, BTreeSet<Rid>>>,
}

impl ResourceTable {
    pub(crate) fn new(max_pages: usize) -> Self {
        Self {
            pages: PageTable::new(max_pages),
            // 0 is never handed out
            next_id: AtomicU64::new(1),
            uuids: Mutex::new(HashMap::new()),
            paths: Mutex::new(HashMap::new()),
            by_type: RwLock::new(HashMap::new()),
        }
    }

    pub(crate) fn allocate_id(&self) -> Rid {
        Rid::from_raw(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Whether `rid` was ever handed out by [`allocate_id`](Self::allocate_id).
    pub(crate) fn was_issued(&self, rid: Rid) -> bool {
        (1..self.next_id.load(Ordering::Relaxed)).contains(&rid.as_u64())
    }

    /// The RID mapped to `uuid`, or a fresh one.
    pub(crate) fn get_or_create_id(&self, uuid: Option<Uuid>) -> Rid {
        match uuid {
            Some(uuid) => *self
                .uuids
                .lock()
                .entry(uuid)
                .or_insert_with(|| self.allocate_id()),
            None => self.allocate_id(),
        }
    }

    /// The storage for `rid`, created on first use.
    ///
    /// `uuid` is recorded unless the storage already has one.
    pub(crate) fn get_or_allocate_storage(
        &self,
        rid: Rid,
        uuid: Option<Uuid>,
        stats: &DatabaseStats,
    ) -> CoreResult<&ResourceStorage> {
        let storage = self.pages.get_or_allocate(rid, stats)?;
        if let Some(uuid) = uuid {
            let mut meta = storage.meta.write();
            if meta.uuid.is_none() {
                meta.uuid = Some(uuid);
            }
        }
        Ok(storage)
    }

    pub(crate) fn storage(&self, rid: Rid) -> Option<&ResourceStorage> {
        self.pages.get(rid)
    }

    pub(crate) fn find_by_uuid(&self, uuid: &Uuid) -> Option<Rid> {
        self.uuids.lock().get(uuid).copied()
    }

    /// The resource's UUID, assigning a random one if it has none.
    pub(crate) fn ensure_uuid(&self, rid: Rid, storage: &ResourceStorage) -> Uuid {
        let mut meta = storage.meta.write();
        if let Some(uuid) = meta.uuid {
            return uuid;
        }
        let uuid = Uuid::new_v4();
        meta.uuid = Some(uuid);
        self.uuids.lock().insert(uuid, rid);
        uuid
    }

    /// Maps `path` to `rid`, returning the resource that held it before.
    pub(crate) fn bind_path(&self, path: &str, rid: Rid) -> Option<Rid> {
        self.paths
            .lock()
            .insert(path.to_string(), rid)
            .filter(|previous| *previous != rid)
    }

    pub(crate) fn unbind_path(&self, path: &str, rid: Rid) {
        let mut paths = self.paths.lock();
        if paths.get(path) == Some(&rid) {
            paths.remove(path);
        }
    }

    pub(crate) fn find_by_path(&self, path: &str) -> Option<Rid> {
        self.paths.lock().get(path).copied()
    }

    pub(crate) fn add_to_type(&self, ty: ResourceTypeId, rid: Rid) {
        self.by_type.write().entry(ty).or_default().insert(rid);
    }

    pub(crate) fn remove_from_type(&self, ty: ResourceTypeId, rid: Rid) {
        if let Some(members) = self.by_type.write().get_mut(&ty) {
            members.remove(&rid);
        }
    }

    pub(crate) fn members_of_type(&self, ty: ResourceTypeId) -> Vec<Rid> {
        self.by_type
            .read()
            .get(&ty)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }
}
