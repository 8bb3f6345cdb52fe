//! Database facade.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::events::{ChangeEvent, ChangeListener, EventRegistry};
use crate::gc::GarbageCollector;
use crate::instance::ResourceInstance;
use crate::object::{ResourceObject, WriteObject};
use crate::schema::{FieldDef, ResourceType, TypeBuilder, TypeRegistry};
use crate::stats::{DatabaseStats, StatsSnapshot};
use crate::storage::{ResourceStorage, ResourceTable};
use crate::transaction::UndoRedoScope;
use crate::types::{FieldIndex, ResourceTypeId, Rid};
use crate::value::FieldValue;
use parking_lot::RwLock;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// The resource database.
///
/// Owns every registry the resources depend on: the page table, the type
/// registry, the UUID and path indices and the retirement queue. Any number
/// of threads may read at once; writers to different resources never
/// contend, and writers racing on one resource are told when they lose.
///
/// # Example
///
/// ```rust,ignore
/// use resdb_core::{Database, FieldKind, FieldReader, ResourceTypeId};
///
/// let db = Database::init();
/// let point = db
///     .register_type(ResourceTypeId::new(1), "Point")
///     .field(0, "x", FieldKind::Float)
///     .field(1, "y", FieldKind::Float)
///     .build()?;
///
/// let rid = db.create(point.id(), None)?;
/// let mut writer = db.write(rid)?;
/// writer.set_float(0, 1.0).set_float(1, 2.0);
/// writer.commit(None)?;
///
/// assert_eq!(db.read(rid).get_float(0), Some(1.0));
/// ```
pub struct Database {
    /// Configuration.
    config: Config,
    /// RIDs, storage pages and the identity indices.
    pub(crate) table: ResourceTable,
    /// Registered schemas.
    pub(crate) types: TypeRegistry,
    /// Per-type change listeners.
    pub(crate) events: EventRegistry,
    /// Displaced snapshots awaiting collection.
    pub(crate) gc: GarbageCollector,
    /// Operation counters.
    pub(crate) stats: DatabaseStats,
    /// Whether the database is open.
    is_open: RwLock<bool>,
}

impl Database {
    /// Creates a database with the given configuration.
    pub fn new(config: Config) -> Self {
        debug!(max_pages = config.max_pages, "resource database initialized");
        Self {
            table: ResourceTable::new(config.max_pages),
            types: TypeRegistry::new(),
            events: EventRegistry::default(),
            gc: GarbageCollector::new(),
            stats: DatabaseStats::new(),
            is_open: RwLock::new(true),
            config,
        }
    }

    /// Creates a database with the default configuration.
    pub fn init() -> Self {
        Self::new(Config::default())
    }

    /// Shuts the database down.
    ///
    /// Drains the retirement queue when `gc_on_shutdown` is set. Later
    /// mutations fail with `DatabaseClosed`; reads keep working.
    pub fn shutdown(&self) -> CoreResult<()> {
        let mut is_open = self.is_open.write();
        if !*is_open {
            return Ok(());
        }
        if self.config.gc_on_shutdown {
            self.garbage_collect();
        }
        *is_open = false;
        debug!("resource database shut down");
        Ok(())
    }

    /// Checks if the database is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        *self.is_open.read()
    }

    pub(crate) fn ensure_open(&self) -> CoreResult<()> {
        if *self.is_open.read() {
            Ok(())
        } else {
            Err(CoreError::DatabaseClosed)
        }
    }

    /// Returns database configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns a copy of the operation counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    // ========================================================================
    // Schemas
    // ========================================================================

    /// Starts declaring a resource type.
    ///
    /// Registering an id or name that already exists makes the new schema
    /// the one found by lookups and used by `create`. Existing resources keep
    /// the schema they were created under.
    pub fn register_type(&self, id: ResourceTypeId, name: &str) -> TypeBuilder<'_> {
        TypeBuilder::new(self, id, name)
    }

    pub(crate) fn install_type(
        &self,
        id: ResourceTypeId,
        name: String,
        fields: Vec<FieldDef>,
        defaults: Vec<(FieldIndex, FieldValue)>,
    ) -> CoreResult<Arc<ResourceType>> {
        self.ensure_open()?;
        let default_rid = if defaults.is_empty() {
            None
        } else {
            Some(self.table.allocate_id())
        };
        let ty = self.types.make_type(id, name, fields, default_rid);

        if let Some(rid) = default_rid {
            let storage = self.table.get_or_allocate_storage(rid, None, &self.stats)?;
            let mut instance = ResourceInstance::new(Arc::clone(&ty));
            for (index, value) in defaults {
                instance.set(index, value);
            }
            instance.mark_read_only();
            storage.meta.write().ty = Some(Arc::clone(&ty));
            storage.swap(Some(Arc::new(instance)));
        }

        self.types.insert(Arc::clone(&ty));
        debug!(
            id = %ty.id(),
            name = ty.name(),
            fields = ty.fields().len(),
            registration = ty.registration(),
            "registered resource type"
        );
        Ok(ty)
    }

    /// The newest schema registered under `id`.
    pub fn find_type_by_id(&self, id: ResourceTypeId) -> Option<Arc<ResourceType>> {
        self.types.find_by_id(id)
    }

    /// The newest schema registered under `name`.
    pub fn find_type_by_name(&self, name: &str) -> Option<Arc<ResourceType>> {
        self.types.find_by_name(name)
    }

    /// Every schema registered under `id`, oldest first.
    pub fn type_registrations(&self, id: ResourceTypeId) -> Vec<Arc<ResourceType>> {
        self.types.registrations(id)
    }

    // ========================================================================
    // Identity
    // ========================================================================

    /// The RID for `uuid`, or a newly allocated one.
    ///
    /// Without a UUID a fresh RID is always allocated.
    pub fn get_or_create_id(&self, uuid: Option<Uuid>) -> Rid {
        self.table.get_or_create_id(uuid)
    }

    /// The RID for `uuid`, reserving a slot without a value if it is new.
    ///
    /// # Errors
    ///
    /// Returns `CapacityExceeded` if the page table is full.
    pub fn find_or_reserve_by_uuid(&self, uuid: Uuid) -> CoreResult<Rid> {
        let rid = self.table.get_or_create_id(Some(uuid));
        self.table.get_or_allocate_storage(rid, Some(uuid), &self.stats)?;
        Ok(rid)
    }

    /// The RID mapped to `uuid`.
    pub fn find_by_uuid(&self, uuid: &Uuid) -> Option<Rid> {
        self.table.find_by_uuid(uuid)
    }

    /// The resource's UUID, if it has one.
    pub fn uuid_of(&self, rid: Rid) -> Option<Uuid> {
        self.table.storage(rid)?.meta.read().uuid
    }

    /// Binds `path` to `rid`, replacing whatever the path pointed at and
    /// whatever path `rid` had.
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` if `rid` has no storage.
    pub fn set_path(&self, rid: Rid, path: &str) -> CoreResult<()> {
        let storage = self
            .table
            .storage(rid)
            .ok_or_else(|| CoreError::resource_not_found(rid))?;
        let previous = storage.meta.write().path.replace(path.to_string());
        if let Some(previous) = previous {
            self.table.unbind_path(&previous, rid);
        }
        if let Some(displaced) = self.table.bind_path(path, rid) {
            if let Some(other) = self.table.storage(displaced) {
                other.meta.write().path = None;
            }
        }
        Ok(())
    }

    /// The resource bound to `path`.
    pub fn find_by_path(&self, path: &str) -> Option<Rid> {
        self.table.find_by_path(path)
    }

    /// The path bound to `rid`.
    pub fn path_of(&self, rid: Rid) -> Option<String> {
        self.table.storage(rid)?.meta.read().path.clone()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Creates a resource of the newest schema registered under `ty`.
    ///
    /// When the type declares defaults the new resource starts as a copy of
    /// the type's default instance. A `uuid` that already names a live
    /// resource returns that resource unchanged.
    ///
    /// # Errors
    ///
    /// Returns `TypeNotFound`, `CapacityExceeded` or `DatabaseClosed`.
    pub fn create(&self, ty: ResourceTypeId, uuid: Option<Uuid>) -> CoreResult<Rid> {
        self.create_in_scope(ty, uuid, None)
    }

    /// Like [`create`](Self::create), recording the creation in `scope`.
    ///
    /// # Errors
    ///
    /// Returns `TypeNotFound`, `CapacityExceeded` or `DatabaseClosed`.
    pub fn create_in_scope(
        &self,
        ty: ResourceTypeId,
        uuid: Option<Uuid>,
        scope: Option<&UndoRedoScope>,
    ) -> CoreResult<Rid> {
        self.ensure_open()?;
        let ty = self
            .types
            .find_by_id(ty)
            .ok_or_else(|| CoreError::type_not_found(ty))?;
        let rid = self.table.get_or_create_id(uuid);
        let storage = self.table.get_or_allocate_storage(rid, uuid, &self.stats)?;
        if storage.has_value() {
            return Ok(rid);
        }

        let default = ty
            .default_value()
            .and_then(|default| self.table.storage(default))
            .and_then(ResourceStorage::load);
        let mut instance = match default {
            Some(default) => default.writable_copy(),
            None => ResourceInstance::new(Arc::clone(&ty)),
        };
        instance.mark_read_only();
        let snapshot = Arc::new(instance);

        storage.meta.write().ty = Some(Arc::clone(&ty));
        storage.swap(Some(Arc::clone(&snapshot)));
        self.table.add_to_type(ty.id(), rid);
        self.stats.record_created();
        if let Some(scope) = scope {
            scope.record(rid, None, Some(snapshot));
        }
        Ok(rid)
    }

    /// Destroys a resource and everything it owns.
    ///
    /// The resource is also removed from its owner's field. Its RID stays
    /// allocated and keeps its UUID. Destroying a resource without a value
    /// does nothing.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseClosed` after shutdown.
    pub fn destroy(&self, rid: Rid) -> CoreResult<()> {
        self.ensure_open()?;
        let Some(storage) = self.table.storage(rid) else {
            return Ok(());
        };
        let Some(old) = storage.swap(None) else {
            return Ok(());
        };
        self.stats.record_destroyed();
        let parent = storage.meta.read().parent;

        let mut doomed = VecDeque::from([(rid, old)]);
        while let Some((current, snapshot)) = doomed.pop_front() {
            let Some(current_storage) = self.table.storage(current) else {
                continue;
            };
            self.release(current, current_storage, &snapshot);
            for (_, child) in snapshot.owned_children() {
                let Some(child_storage) = self.table.storage(child) else {
                    continue;
                };
                if let Some(child_old) = child_storage.swap(None) {
                    self.stats.record_destroyed();
                    doomed.push_back((child, child_old));
                }
            }
            self.retire(snapshot);
        }

        if let Some((parent, field)) = parent {
            self.detach(parent, field, rid);
        }
        debug!(%rid, "destroyed");
        Ok(())
    }

    /// Unlinks a resource whose value was just swapped out.
    fn release(&self, rid: Rid, storage: &ResourceStorage, old: &ResourceInstance) {
        self.after_publish(rid, storage, Some(old), None);

        let (prototype, path) = {
            let mut meta = storage.meta.write();
            meta.parent = None;
            (meta.prototype, meta.path.take())
        };
        if let Some(prototype) = prototype.and_then(|p| self.table.storage(p)) {
            prototype.meta.write().prototype_instances.remove(&rid);
        }
        if let Some(path) = path {
            self.table.unbind_path(&path, rid);
        }
        self.table.remove_from_type(old.resource_type().id(), rid);
    }

    /// Removes `child` from `parent`'s owning field.
    fn detach(&self, parent: Rid, field: FieldIndex, child: Rid) {
        for _ in 0..self.config.internal_commit_retries.max(1) {
            let Ok(mut writer) = self.write(parent) else {
                return;
            };
            let single = match writer.instance.get(field) {
                Some(FieldValue::SubObject(owned)) if *owned == child => true,
                Some(FieldValue::SubObjectList(list)) if list.contains(child) => false,
                _ => return,
            };
            if single {
                writer.instance.clear(field);
            } else {
                writer.remove_from_sub_object_list(field, child);
            }
            match writer.commit(None) {
                Ok(_) => return,
                Err(CoreError::CommitConflict { .. }) => continue,
                Err(err) => {
                    warn!(%parent, %child, error = %err, "failed to detach destroyed child");
                    return;
                }
            }
        }
        warn!(%parent, %child, "gave up detaching destroyed child after repeated conflicts");
    }

    // ========================================================================
    // Access
    // ========================================================================

    /// A live read accessor for `rid`.
    ///
    /// Never fails; an unknown RID reads as empty.
    pub fn read(&self, rid: Rid) -> ResourceObject<'_> {
        ResourceObject::new(rid, self.table.storage(rid))
    }

    /// A write accessor over a private copy of `rid`.
    ///
    /// A resource without a value starts from an empty instance of its type.
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` if `rid` has no storage or no type, and
    /// `DatabaseClosed` after shutdown.
    pub fn write(&self, rid: Rid) -> CoreResult<WriteObject<'_>> {
        self.ensure_open()?;
        let storage = self
            .table
            .storage(rid)
            .ok_or_else(|| CoreError::resource_not_found(rid))?;
        let based_on = storage.load();
        let instance = match &based_on {
            Some(snapshot) => snapshot.writable_copy(),
            None => {
                let ty = storage
                    .meta
                    .read()
                    .ty
                    .clone()
                    .ok_or_else(|| CoreError::resource_not_found(rid))?;
                ResourceInstance::new(ty)
            }
        };
        Ok(WriteObject {
            db: self,
            rid,
            based_on,
            instance,
        })
    }

    /// Whether `rid` currently has a value.
    pub fn has_value(&self, rid: Rid) -> bool {
        self.table.storage(rid).is_some_and(ResourceStorage::has_value)
    }

    /// The resource's version; 0 until its first commit.
    pub fn version(&self, rid: Rid) -> u64 {
        self.table.storage(rid).map_or(0, ResourceStorage::version)
    }

    /// The schema the resource was created under.
    pub fn type_of(&self, rid: Rid) -> Option<Arc<ResourceType>> {
        self.table.storage(rid)?.meta.read().ty.clone()
    }

    /// Live resources of type `ty`, in RID order.
    pub fn resources_by_type(&self, ty: ResourceTypeId) -> Vec<Rid> {
        self.table
            .members_of_type(ty)
            .into_iter()
            .filter(|rid| self.has_value(*rid))
            .collect()
    }

    /// The resource's owner and the owning field.
    pub fn parent_of(&self, rid: Rid) -> Option<(Rid, FieldIndex)> {
        self.table.storage(rid)?.meta.read().parent
    }

    /// Whether `ancestor` appears on `descendant`'s parent chain.
    pub fn is_parent_of(&self, ancestor: Rid, descendant: Rid) -> bool {
        let mut visited = HashSet::new();
        let mut current = self.parent_of(descendant);
        while let Some((parent, _)) = current {
            if parent == ancestor {
                return true;
            }
            if !visited.insert(parent) {
                return false;
            }
            current = self.parent_of(parent);
        }
        false
    }

    /// The resource this one was cloned from as an instance.
    pub fn prototype_of(&self, rid: Rid) -> Option<Rid> {
        self.table.storage(rid)?.meta.read().prototype
    }

    /// Live resources created from `rid` as a prototype.
    pub fn prototype_instances(&self, rid: Rid) -> Vec<Rid> {
        let Some(storage) = self.table.storage(rid) else {
            return Vec::new();
        };
        let recorded: Vec<Rid> = storage.meta.read().prototype_instances.iter().copied().collect();
        recorded.into_iter().filter(|r| self.has_value(*r)).collect()
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Calls `listener` after every change to `rid`.
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` if `rid` has no storage.
    pub fn on_resource_changed<F>(&self, rid: Rid, listener: F) -> CoreResult<()>
    where
        F: Fn(&ChangeEvent<'_>) + Send + Sync + 'static,
    {
        self.subscribe_resource(rid, None, Arc::new(listener))
    }

    /// Calls `listener` after changes to `rid` that alter `field`.
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` if `rid` has no storage.
    pub fn on_resource_field_changed<F>(
        &self,
        rid: Rid,
        field: FieldIndex,
        listener: F,
    ) -> CoreResult<()>
    where
        F: Fn(&ChangeEvent<'_>) + Send + Sync + 'static,
    {
        self.subscribe_resource(rid, Some(field), Arc::new(listener))
    }

    fn subscribe_resource(
        &self,
        rid: Rid,
        field: Option<FieldIndex>,
        listener: ChangeListener,
    ) -> CoreResult<()> {
        let storage = self
            .table
            .storage(rid)
            .ok_or_else(|| CoreError::resource_not_found(rid))?;
        storage.listeners.write().changes.push(field, listener);
        Ok(())
    }

    /// Calls `listener` after every change to a resource of type `ty`.
    pub fn on_type_changed<F>(&self, ty: ResourceTypeId, listener: F)
    where
        F: Fn(&ChangeEvent<'_>) + Send + Sync + 'static,
    {
        self.events.subscribe(ty, None, Arc::new(listener));
    }

    /// Calls `listener` after changes to resources of type `ty` that alter
    /// `field`.
    pub fn on_type_field_changed<F>(&self, ty: ResourceTypeId, field: FieldIndex, listener: F)
    where
        F: Fn(&ChangeEvent<'_>) + Send + Sync + 'static,
    {
        self.events.subscribe(ty, Some(field), Arc::new(listener));
    }

    /// Calls `listener` with the new version whenever `rid`'s version is
    /// bumped, including by commits to resources it owns.
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` if `rid` has no storage.
    pub fn on_version_updated<F>(&self, rid: Rid, listener: F) -> CoreResult<()>
    where
        F: Fn(Rid, u64) + Send + Sync + 'static,
    {
        let storage = self
            .table
            .storage(rid)
            .ok_or_else(|| CoreError::resource_not_found(rid))?;
        storage.listeners.write().versions.push(Arc::new(listener));
        Ok(())
    }

    // ========================================================================
    // Garbage collection
    // ========================================================================

    /// Releases every snapshot displaced so far and returns how many.
    ///
    /// Snapshots are reference counted, so one still pinned by a reader or
    /// an undo scope stays alive until that holder lets go.
    pub fn garbage_collect(&self) -> usize {
        let released = self.gc.collect();
        self.stats.record_collected(released as u64);
        released
    }

    /// Snapshots waiting for [`garbage_collect`](Self::garbage_collect).
    pub fn pending_garbage(&self) -> usize {
        self.gc.pending()
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("is_open", &self.is_open())
            .field("pending_garbage", &self.pending_garbage())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::FieldReader;
    use crate::schema::FieldKind;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    const NODE: ResourceTypeId = ResourceTypeId::new(10);

    fn node_db() -> Database {
        let db = Database::init();
        db.register_type(NODE, "Node")
            .field(0, "name", FieldKind::String)
            .field(1, "child", FieldKind::SubObject)
            .field(2, "children", FieldKind::SubObjectList)
            .build()
            .unwrap();
        db
    }

    fn named(db: &Database, name: &str) -> Rid {
        let rid = db.create(NODE, None).unwrap();
        let mut writer = db.write(rid).unwrap();
        writer.set_string(0, name);
        writer.commit(None).unwrap();
        rid
    }

    #[test]
    fn open_and_shutdown() {
        let db = Database::init();
        assert!(db.is_open());
        db.shutdown().unwrap();
        assert!(!db.is_open());
        assert!(matches!(db.create(NODE, None), Err(CoreError::DatabaseClosed)));
        db.shutdown().unwrap();
    }

    #[test]
    fn create_requires_registered_type() {
        let db = Database::init();
        assert!(matches!(
            db.create(ResourceTypeId::new(99), None),
            Err(CoreError::TypeNotFound { .. })
        ));
    }

    #[test]
    fn create_with_known_uuid_returns_existing() {
        let db = node_db();
        let uuid = Uuid::new_v4();
        let first = db.create(NODE, Some(uuid)).unwrap();
        let second = db.create(NODE, Some(uuid)).unwrap();
        assert_eq!(first, second);
        assert_eq!(db.find_by_uuid(&uuid), Some(first));
        assert_eq!(db.uuid_of(first), Some(uuid));
        assert_eq!(db.stats().created, 1);
    }

    #[test]
    fn defaults_seed_new_instances() {
        let db = Database::init();
        let ty = db
            .register_type(ResourceTypeId::new(2), "Lamp")
            .field(0, "intensity", FieldKind::Float)
            .field(1, "on", FieldKind::Bool)
            .default_value(0, 0.75)
            .build()
            .unwrap();
        assert!(ty.default_value().is_some());

        let lamp = db.create(ty.id(), None).unwrap();
        assert_eq!(db.read(lamp).get_float(0), Some(0.75));
        assert!(!db.read(lamp).has(1));
        assert_eq!(db.resources_by_type(ty.id()), vec![lamp]);
    }

    #[test]
    fn invalid_schemas_are_rejected() {
        let db = Database::init();
        let gap = db
            .register_type(ResourceTypeId::new(3), "Gap")
            .field(0, "a", FieldKind::Int)
            .field(2, "c", FieldKind::Int)
            .build();
        assert!(matches!(gap, Err(CoreError::InvalidOperation { .. })));

        let duplicate = db
            .register_type(ResourceTypeId::new(3), "Dup")
            .field(0, "a", FieldKind::Int)
            .field(1, "a", FieldKind::Int)
            .build();
        assert!(duplicate.is_err());

        let bad_default = db
            .register_type(ResourceTypeId::new(3), "BadDefault")
            .field(0, "a", FieldKind::Int)
            .default_value(0, "text")
            .build();
        assert!(bad_default.is_err());
        assert!(db.find_type_by_id(ResourceTypeId::new(3)).is_none());
    }

    #[test]
    fn reregistration_keeps_old_instances_on_old_schema() {
        let db = node_db();
        let old = db.create(NODE, None).unwrap();
        db.register_type(NODE, "Node")
            .field(0, "label", FieldKind::String)
            .build()
            .unwrap();
        let new = db.create(NODE, None).unwrap();

        assert_eq!(db.type_of(old).unwrap().fields().len(), 3);
        assert_eq!(db.type_of(new).unwrap().fields().len(), 1);
        assert_eq!(db.find_type_by_name("Node").unwrap().field_index("label"), Some(0));
        assert_eq!(db.type_registrations(NODE).len(), 2);
    }

    #[test]
    fn ownership_tracks_commits() {
        let db = node_db();
        let root = named(&db, "root");
        let child = named(&db, "child");

        let mut writer = db.write(root).unwrap();
        writer.add_to_sub_object_list(2, child);
        writer.commit(None).unwrap();
        assert_eq!(db.parent_of(child), Some((root, 2)));
        assert!(db.is_parent_of(root, child));
        assert!(!db.is_parent_of(child, root));

        let mut writer = db.write(root).unwrap();
        writer.remove_from_sub_object_list(2, child);
        writer.commit(None).unwrap();
        assert_eq!(db.parent_of(child), None);
        assert!(db.has_value(child));
    }

    #[test]
    fn child_commit_bumps_ancestors() {
        let db = node_db();
        let root = named(&db, "root");
        let child = named(&db, "child");
        let mut writer = db.write(root).unwrap();
        writer.set_sub_object(1, child);
        writer.commit(None).unwrap();
        let before = db.version(root);

        let bumps = Arc::new(AtomicU64::new(0));
        let seen = Arc::clone(&bumps);
        db.on_version_updated(root, move |_, version| {
            seen.store(version, Ordering::SeqCst);
        })
        .unwrap();

        let mut writer = db.write(child).unwrap();
        writer.set_string(0, "renamed");
        writer.commit(None).unwrap();
        assert_eq!(db.version(root), before + 1);
        assert_eq!(bumps.load(Ordering::SeqCst), before + 1);
    }

    #[test]
    fn destroy_cascades_and_detaches() {
        let db = node_db();
        let root = named(&db, "root");
        let middle = named(&db, "middle");
        let leaf = named(&db, "leaf");

        let mut writer = db.write(middle).unwrap();
        writer.set_sub_object(1, leaf);
        writer.commit(None).unwrap();
        let mut writer = db.write(root).unwrap();
        writer.add_to_sub_object_list(2, middle);
        writer.commit(None).unwrap();

        db.destroy(middle).unwrap();
        assert!(!db.has_value(middle));
        assert!(!db.has_value(leaf));
        assert!(db.has_value(root));
        assert_eq!(db.read(root).get_sub_object_list(2), Some(vec![]));

        db.destroy(middle).unwrap();
        assert_eq!(db.stats().destroyed, 2);
    }

    #[test]
    fn paths_follow_resources() {
        let db = node_db();
        let a = named(&db, "a");
        let b = named(&db, "b");

        db.set_path(a, "levels/one").unwrap();
        assert_eq!(db.find_by_path("levels/one"), Some(a));
        db.set_path(b, "levels/one").unwrap();
        assert_eq!(db.find_by_path("levels/one"), Some(b));
        assert_eq!(db.path_of(a), None);

        db.destroy(b).unwrap();
        assert_eq!(db.find_by_path("levels/one"), None);
    }

    #[test]
    fn field_listeners_skip_unrelated_edits() {
        let db = node_db();
        let rid = named(&db, "first");
        let resource_hits = Arc::new(AtomicUsize::new(0));
        let field_hits = Arc::new(AtomicUsize::new(0));
        let type_hits = Arc::new(AtomicUsize::new(0));

        let hits = Arc::clone(&resource_hits);
        db.on_resource_changed(rid, move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        let hits = Arc::clone(&field_hits);
        db.on_resource_field_changed(rid, 0, move |event| {
            assert_eq!(event.new.and_then(|v| v.get_string(0)).as_deref(), Some("second"));
            hits.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        let hits = Arc::clone(&type_hits);
        db.on_type_changed(NODE, move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
        });

        let mut writer = db.write(rid).unwrap();
        writer.set_string(0, "second");
        writer.commit(None).unwrap();
        db.write(rid).unwrap().commit(None).unwrap();

        assert_eq!(resource_hits.load(Ordering::SeqCst), 2);
        assert_eq!(field_hits.load(Ordering::SeqCst), 1);
        assert_eq!(type_hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn read_of_unknown_rid_is_empty() {
        let db = Database::init();
        let object = db.read(Rid::from_raw(12345));
        assert!(!object.has_value());
        assert!(db.write(Rid::from_raw(12345)).is_err());
        assert!(db.destroy(Rid::from_raw(12345)).is_ok());
    }
}
