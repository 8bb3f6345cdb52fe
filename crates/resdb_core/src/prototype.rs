//! Prototype inheritance.
//!
//! [`Database::create_from_prototype`] deep-copies a resource's owned tree
//! and links every copy to the node it came from. Afterwards only structure
//! flows from prototype to instance: children added to or removed from a
//! prototype's owning fields are added to or removed from each live
//! instance. Scalar edits on the prototype never reach existing instances.
//!
//! An instance can opt out of an inherited list entry with
//! [`WriteObject::remove_from_prototype_sub_object_list`](crate::WriteObject::remove_from_prototype_sub_object_list).

use crate::database::Database;
use crate::error::{CoreError, CoreResult};
use crate::instance::ResourceInstance;
use crate::object::WriteObject;
use crate::schema::FieldKind;
use crate::storage::ResourceStorage;
use crate::transaction::UndoRedoScope;
use crate::types::{FieldIndex, Rid};
use crate::value::FieldValue;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// One membership change in a sub-object list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffEntry {
    /// The child joined the list.
    Added(Rid),
    /// The child left the list.
    Removed(Rid),
}

/// Membership difference between two versions of a sub-object list.
///
/// Order is not part of the diff; moving an entry within the list yields
/// nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubObjectListDiff {
    entries: Vec<DiffEntry>,
}

impl SubObjectListDiff {
    /// Diffs `old` against `new`. Removals come first, then additions in
    /// the order they appear in `new`.
    pub fn between(old: &[Rid], new: &[Rid]) -> Self {
        let before: HashSet<Rid> = old.iter().copied().collect();
        let after: HashSet<Rid> = new.iter().copied().collect();
        let removed = old
            .iter()
            .filter(|rid| !after.contains(rid))
            .map(|rid| DiffEntry::Removed(*rid));
        let added = new
            .iter()
            .filter(|rid| !before.contains(rid))
            .map(|rid| DiffEntry::Added(*rid));
        Self {
            entries: removed.chain(added).collect(),
        }
    }

    /// Whether the lists hold the same members.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries.
    pub fn iter(&self) -> std::slice::Iter<'_, DiffEntry> {
        self.entries.iter()
    }

    /// Children that joined.
    pub fn added(&self) -> impl Iterator<Item = Rid> + '_ {
        self.entries.iter().filter_map(|entry| match entry {
            DiffEntry::Added(rid) => Some(*rid),
            DiffEntry::Removed(_) => None,
        })
    }

    /// Children that left.
    pub fn removed(&self) -> impl Iterator<Item = Rid> + '_ {
        self.entries.iter().filter_map(|entry| match entry {
            DiffEntry::Removed(rid) => Some(*rid),
            DiffEntry::Added(_) => None,
        })
    }
}

impl<'a> IntoIterator for &'a SubObjectListDiff {
    type Item = &'a DiffEntry;
    type IntoIter = std::slice::Iter<'a, DiffEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// A structural edit on a prototype, replayed on its instances.
enum StructuralChange {
    List {
        field: FieldIndex,
        diff: SubObjectListDiff,
    },
    Single {
        field: FieldIndex,
        old: Option<Rid>,
        new: Option<Rid>,
    },
}

fn structural_changes(
    old: Option<&ResourceInstance>,
    new: &ResourceInstance,
) -> Vec<StructuralChange> {
    let mut changes = Vec::new();
    for def in new.resource_type().owning_fields() {
        let field = def.index;
        if def.kind == FieldKind::SubObject {
            let before = old.and_then(|i| i.sub_object(field));
            let after = new.sub_object(field);
            if before != after {
                changes.push(StructuralChange::Single {
                    field,
                    old: before,
                    new: after,
                });
            }
        } else {
            let before = old
                .and_then(|i| i.sub_object_list(field))
                .map_or(&[][..], |list| list.items.as_slice());
            let after = new
                .sub_object_list(field)
                .map_or(&[][..], |list| list.items.as_slice());
            let diff = SubObjectListDiff::between(before, after);
            if !diff.is_empty() {
                changes.push(StructuralChange::List { field, diff });
            }
        }
    }
    changes
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloneMode {
    /// Copies link to the node they came from.
    Prototype,
    /// Copies share the source's prototype, if any.
    Detached,
}

/// Copies made by one clone operation, parents before children.
#[derive(Default)]
struct CloneBatch {
    mapping: HashMap<Rid, Rid>,
    pending: Vec<(Rid, ResourceInstance)>,
}

impl Database {
    /// Creates an instance of `prototype` by cloning its owned tree.
    ///
    /// Every copy gets a fresh UUID unless its source had none; the root
    /// takes `uuid` when given, and if that UUID already names a live
    /// resource, that resource is returned unchanged. References between
    /// nodes of the tree are
    /// pointed at the corresponding copies. Field values start out equal to
    /// the prototype's and do not follow later scalar edits.
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` if `prototype` has no value, or
    /// `CapacityExceeded` if the page table is full.
    pub fn create_from_prototype(
        &self,
        prototype: Rid,
        uuid: Option<Uuid>,
        scope: Option<&UndoRedoScope>,
    ) -> CoreResult<Rid> {
        self.ensure_open()?;
        let rid =
            self.clone_tree(prototype, uuid, CloneMode::Prototype, &HashMap::new(), scope)?;
        debug!(%prototype, instance = %rid, "created from prototype");
        Ok(rid)
    }

    /// Creates an independent copy of `source` and its owned tree.
    ///
    /// The copy inherits `source`'s own prototype link rather than pointing
    /// at `source`.
    /// As with [`create_from_prototype`](Self::create_from_prototype), a
    /// `uuid` that already names a live resource returns that resource.
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` if `source` has no value, or
    /// `CapacityExceeded` if the page table is full.
    pub fn clone_resource(
        &self,
        source: Rid,
        uuid: Option<Uuid>,
        scope: Option<&UndoRedoScope>,
    ) -> CoreResult<Rid> {
        self.ensure_open()?;
        self.clone_tree(source, uuid, CloneMode::Detached, &HashMap::new(), scope)
    }

    /// Copies `root`'s owned tree and publishes the copies.
    ///
    /// `seed` maps nodes outside the tree to the copies that references to
    /// them should follow. A `uuid` that already names a live resource
    /// yields that resource untouched.
    fn clone_tree(
        &self,
        root: Rid,
        uuid: Option<Uuid>,
        mode: CloneMode,
        seed: &HashMap<Rid, Rid>,
        scope: Option<&UndoRedoScope>,
    ) -> CoreResult<Rid> {
        if let Some(existing) = uuid.and_then(|uuid| self.find_by_uuid(&uuid)) {
            if self.has_value(existing) {
                debug!(rid = %existing, "clone target UUID is already live");
                return Ok(existing);
            }
        }

        let mut batch = CloneBatch {
            mapping: seed.clone(),
            pending: Vec::new(),
        };
        let mut queue = VecDeque::from([(root, uuid, None)]);
        let mut visited = HashSet::new();
        while let Some((source, uuid, parent)) = queue.pop_front() {
            if !visited.insert(source) {
                warn!(%source, "owned tree reaches a node twice, copying it once");
                continue;
            }
            let (rid, instance) = self.clone_node(source, uuid, parent, mode)?;
            batch.mapping.insert(source, rid);
            for (field, child) in instance.owned_children() {
                queue.push_back((child, None, Some((rid, field))));
            }
            batch.pending.push((rid, instance));
        }
        let copy = batch
            .mapping
            .get(&root)
            .copied()
            .ok_or_else(|| CoreError::resource_not_found(root))?;

        let CloneBatch { mapping, pending } = batch;
        // Leaves first, so no copy is visible before the children it owns.
        for (rid, mut instance) in pending.into_iter().rev() {
            instance.map_owned(|_, child| {
                Ok::<_, CoreError>(mapping.get(&child).copied().unwrap_or(child))
            })?;
            instance.remap_references(&mapping);
            instance.mark_read_only();
            let snapshot = Arc::new(instance);
            let Some(storage) = self.table.storage(rid) else {
                continue;
            };
            self.table.add_to_type(snapshot.resource_type().id(), rid);
            if let Some(displaced) = storage.swap(Some(Arc::clone(&snapshot))) {
                self.retire(displaced);
            }
            self.stats.record_created();
            if let Some(scope) = scope {
                scope.record(rid, None, Some(snapshot));
            }
        }
        Ok(copy)
    }

    /// Allocates the copy of `source` and links its metadata. Owned
    /// children of the returned instance still name the source's children.
    fn clone_node(
        &self,
        source: Rid,
        uuid: Option<Uuid>,
        parent: Option<(Rid, FieldIndex)>,
        mode: CloneMode,
    ) -> CoreResult<(Rid, ResourceInstance)> {
        let source_storage = self
            .table
            .storage(source)
            .ok_or_else(|| CoreError::resource_not_found(source))?;
        let snapshot = source_storage
            .load()
            .ok_or_else(|| CoreError::resource_not_found(source))?;
        let (source_uuid, source_prototype) = {
            let meta = source_storage.meta.read();
            (meta.uuid, meta.prototype)
        };

        let uuid = uuid.or_else(|| source_uuid.map(|_| Uuid::new_v4()));
        let rid = self.table.get_or_create_id(uuid);
        let storage = self.table.get_or_allocate_storage(rid, uuid, &self.stats)?;
        let prototype = match mode {
            CloneMode::Prototype => Some(source),
            CloneMode::Detached => source_prototype,
        };
        {
            let mut meta = storage.meta.write();
            meta.ty = Some(Arc::clone(snapshot.resource_type()));
            meta.parent = parent;
            meta.prototype = prototype;
        }
        if let Some(prototype) = prototype {
            self.register_instance(prototype, rid);
        }

        let mut instance = snapshot.writable_copy();
        if mode == CloneMode::Prototype {
            instance.reset_prototype_removed();
        }
        Ok((rid, instance))
    }

    /// Prototype node to instance node, across the inherited tree that
    /// contains `instance`.
    fn inherited_mapping(&self, instance: Rid) -> HashMap<Rid, Rid> {
        let mut top = instance;
        let mut climbed = HashSet::from([instance]);
        while let Some((parent, _)) = self.parent_of(top) {
            if self.prototype_of(parent).is_none() || !climbed.insert(parent) {
                break;
            }
            top = parent;
        }

        let mut mapping = HashMap::new();
        let mut queue = VecDeque::from([top]);
        let mut seen = HashSet::new();
        while let Some(rid) = queue.pop_front() {
            if !seen.insert(rid) {
                continue;
            }
            if let Some(prototype) = self.prototype_of(rid) {
                mapping.insert(prototype, rid);
            }
            if let Some(snapshot) = self.table.storage(rid).and_then(|s| s.load()) {
                queue.extend(snapshot.owned_children().into_iter().map(|(_, child)| child));
            }
        }
        mapping
    }

    fn register_instance(&self, prototype: Rid, instance: Rid) {
        if let Some(storage) = self.table.storage(prototype) {
            storage.meta.write().prototype_instances.insert(instance);
        }
    }

    /// Replays structural edits on `prototype` onto its live instances.
    pub(crate) fn propagate(
        &self,
        prototype: Rid,
        storage: &ResourceStorage,
        old: Option<&ResourceInstance>,
        new: &ResourceInstance,
    ) {
        let instances: Vec<Rid> = storage
            .meta
            .read()
            .prototype_instances
            .iter()
            .copied()
            .collect();
        if instances.is_empty() {
            return;
        }
        let changes = structural_changes(old, new);
        if changes.is_empty() {
            return;
        }

        self.stats.record_propagation();
        debug!(%prototype, instances = instances.len(), changes = changes.len(), "propagating");
        for instance in instances {
            if self.has_value(instance) {
                self.propagate_into(instance, &changes);
            }
        }
    }

    fn propagate_into(&self, instance: Rid, changes: &[StructuralChange]) {
        let seed = self.inherited_mapping(instance);
        for _ in 0..self.config().internal_commit_retries.max(1) {
            let Ok(mut writer) = self.write(instance) else {
                return;
            };
            let mut created = Vec::new();
            let mut doomed = Vec::new();
            let mut failed = None;
            for change in changes {
                if let Err(err) =
                    self.apply_change(&mut writer, change, &seed, &mut created, &mut doomed)
                {
                    failed = Some(err);
                    break;
                }
            }

            let result = match failed {
                Some(err) => Err(err),
                None => writer.commit(None),
            };
            match result {
                Ok(_) => {
                    for child in doomed {
                        self.destroy_quietly(child);
                    }
                    return;
                }
                Err(CoreError::CommitConflict { .. }) => {
                    for child in created {
                        self.destroy_quietly(child);
                    }
                }
                Err(err) => {
                    warn!(%instance, error = %err, "prototype propagation failed");
                    for child in created {
                        self.destroy_quietly(child);
                    }
                    return;
                }
            }
        }
        warn!(%instance, "prototype propagation gave up after repeated conflicts");
    }

    fn apply_change(
        &self,
        writer: &mut WriteObject<'_>,
        change: &StructuralChange,
        seed: &HashMap<Rid, Rid>,
        created: &mut Vec<Rid>,
        doomed: &mut Vec<Rid>,
    ) -> CoreResult<()> {
        match change {
            StructuralChange::List { field, diff } => {
                for entry in diff {
                    match *entry {
                        DiffEntry::Removed(from) => {
                            let inherited = self.inherited_child(writer, *field, from);
                            if let Some(list) = writer.instance.sub_object_list_mut(*field) {
                                if let Some(child) = inherited {
                                    list.items.retain(|item| *item != child);
                                    doomed.push(child);
                                }
                                list.prototype_removed.retain(|rid| *rid != from);
                            }
                        }
                        DiffEntry::Added(from) => {
                            let skip = writer
                                .instance
                                .sub_object_list(*field)
                                .is_some_and(|list| list.prototype_removed.contains(&from))
                                || self.inherited_child(writer, *field, from).is_some();
                            if skip {
                                continue;
                            }
                            let child =
                                self.clone_tree(from, None, CloneMode::Prototype, seed, None)?;
                            created.push(child);
                            if let Some(list) = writer.instance.sub_object_list_mut(*field) {
                                list.items.push(child);
                            }
                        }
                    }
                }
            }
            StructuralChange::Single { field, old, new } => {
                let current = writer.instance.sub_object(*field);
                let inherited = current.and_then(|child| self.prototype_of(child));
                // Only a child still derived from the old prototype child is replaced.
                if inherited != *old {
                    return Ok(());
                }
                if let Some(child) = current {
                    doomed.push(child);
                }
                match new {
                    Some(from) => {
                        let child =
                            self.clone_tree(*from, None, CloneMode::Prototype, seed, None)?;
                        created.push(child);
                        writer.instance.set(*field, FieldValue::SubObject(child));
                    }
                    None => writer.instance.clear(*field),
                }
            }
        }
        Ok(())
    }

    /// The child in `field` of the writer's copy that was cloned from `from`.
    fn inherited_child(&self, writer: &WriteObject<'_>, field: FieldIndex, from: Rid) -> Option<Rid> {
        writer
            .instance
            .sub_object_list(field)?
            .items
            .iter()
            .copied()
            .find(|child| self.prototype_of(*child) == Some(from))
    }

    fn destroy_quietly(&self, rid: Rid) {
        if let Err(err) = self.destroy(rid) {
            warn!(%rid, error = %err, "failed to destroy propagated child");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rids(raw: &[u64]) -> Vec<Rid> {
        raw.iter().copied().map(Rid::from_raw).collect()
    }

    #[test]
    fn diff_reports_membership_changes() {
        let diff = SubObjectListDiff::between(&rids(&[1, 2, 3]), &rids(&[3, 1, 4]));
        assert_eq!(
            diff.iter().copied().collect::<Vec<_>>(),
            vec![DiffEntry::Removed(Rid::from_raw(2)), DiffEntry::Added(Rid::from_raw(4))]
        );
        assert_eq!(diff.added().collect::<Vec<_>>(), rids(&[4]));
        assert_eq!(diff.removed().collect::<Vec<_>>(), rids(&[2]));
    }

    #[test]
    fn reordering_is_not_a_change() {
        assert!(SubObjectListDiff::between(&rids(&[1, 2]), &rids(&[2, 1])).is_empty());
        assert!(SubObjectListDiff::between(&[], &[]).is_empty());
    }

    proptest::proptest! {
        #[test]
        fn applying_diff_yields_new_membership(
            old in proptest::collection::btree_set(1u64..64, 0..16),
            new in proptest::collection::btree_set(1u64..64, 0..16),
        ) {
            let old: Vec<Rid> = old.into_iter().map(Rid::from_raw).collect();
            let new: Vec<Rid> = new.into_iter().map(Rid::from_raw).collect();
            let diff = SubObjectListDiff::between(&old, &new);

            let mut members: HashSet<Rid> = old.iter().copied().collect();
            for entry in &diff {
                match *entry {
                    DiffEntry::Added(rid) => {
                        proptest::prop_assert!(members.insert(rid));
                    }
                    DiffEntry::Removed(rid) => {
                        proptest::prop_assert!(members.remove(&rid));
                    }
                }
            }
            proptest::prop_assert_eq!(members, new.iter().copied().collect::<HashSet<_>>());
        }
    }

    #[test]
    fn diff_from_empty_adds_everything() {
        let diff = SubObjectListDiff::between(&[], &rids(&[5, 6]));
        assert_eq!(diff.added().count(), 2);
        assert_eq!(diff.removed().count(), 0);
        assert_eq!((&diff).into_iter().count(), 2);
    }
}
