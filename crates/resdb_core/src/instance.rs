//! Versioned field snapshots.

use crate::error::contract_violation;
use crate::schema::{FieldKind, ResourceType};
use crate::types::{FieldIndex, Rid};
use crate::value::{FieldValue, SubObjectList};
use std::collections::HashMap;
use std::sync::Arc;

/// A snapshot of a resource's field values.
///
/// Each slot is `None` until the field is set, so the slot vector doubles as
/// the presence bitmap. Once committed a snapshot is shared behind an `Arc`
/// and never changes; writers work on a private copy.
#[derive(Debug, Clone)]
pub struct ResourceInstance {
    ty: Arc<ResourceType>,
    read_only: bool,
    values: Vec<Option<FieldValue>>,
}

impl ResourceInstance {
    /// Creates an instance with no fields present.
    pub fn new(ty: Arc<ResourceType>) -> Self {
        let values = vec![None; ty.fields().len()];
        Self {
            ty,
            read_only: false,
            values,
        }
    }

    /// The schema this instance was created under.
    pub fn resource_type(&self) -> &Arc<ResourceType> {
        &self.ty
    }

    /// Whether this snapshot has been committed.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Whether the field has a value.
    pub fn has(&self, index: FieldIndex) -> bool {
        matches!(self.values.get(index as usize), Some(Some(_)))
    }

    /// The field's value, if present.
    pub fn get(&self, index: FieldIndex) -> Option<&FieldValue> {
        self.values.get(index as usize)?.as_ref()
    }

    /// Present fields in schema order.
    #[allow(clippy::cast_possible_truncation)]
    pub fn present_fields(&self) -> impl Iterator<Item = (FieldIndex, &FieldValue)> {
        self.values
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.as_ref().map(|v| (i as FieldIndex, v)))
    }

    /// The owned child of a sub-object field.
    pub fn sub_object(&self, index: FieldIndex) -> Option<Rid> {
        match self.get(index) {
            Some(FieldValue::SubObject(rid)) => Some(*rid),
            _ => None,
        }
    }

    /// The list behind a sub-object-list field.
    pub fn sub_object_list(&self, index: FieldIndex) -> Option<&SubObjectList> {
        match self.get(index) {
            Some(FieldValue::SubObjectList(list)) => Some(list),
            _ => None,
        }
    }

    /// Every `(field, child)` ownership edge leaving this instance.
    pub fn owned_children(&self) -> Vec<(FieldIndex, Rid)> {
        self.present_fields()
            .flat_map(|(index, value)| value.owned_rids().iter().map(move |rid| (index, *rid)))
            .collect()
    }

    /// A writable copy of this snapshot.
    pub(crate) fn writable_copy(&self) -> Self {
        Self {
            read_only: false,
            ..self.clone()
        }
    }

    pub(crate) fn mark_read_only(&mut self) {
        self.read_only = true;
    }

    /// Stores a value after checking it against the schema.
    ///
    /// Returns `false` (after reporting a contract violation) when the field
    /// does not exist or has another kind.
    pub(crate) fn set(&mut self, index: FieldIndex, value: FieldValue) -> bool {
        match self.slot_mut(index, value.kind()) {
            Some(slot) => {
                *slot = Some(value);
                true
            }
            None => false,
        }
    }

    /// Removes a field's value.
    pub(crate) fn clear(&mut self, index: FieldIndex) {
        match self.values.get_mut(index as usize) {
            Some(slot) => *slot = None,
            None => contract_violation(format_args!(
                "type {} has no field {index}",
                self.ty.name()
            )),
        }
    }

    /// The slot of a field, provided it has the expected kind.
    pub(crate) fn slot_mut(
        &mut self,
        index: FieldIndex,
        kind: FieldKind,
    ) -> Option<&mut Option<FieldValue>> {
        debug_assert!(!self.read_only, "committed snapshots are immutable");
        match self.ty.field(index) {
            Some(def) if def.kind == kind => self.values.get_mut(index as usize),
            Some(def) => {
                contract_violation(format_args!(
                    "field {}.{} is {:?}, not {kind:?}",
                    self.ty.name(),
                    def.name,
                    def.kind
                ));
                None
            }
            None => {
                contract_violation(format_args!(
                    "type {} has no field {index}",
                    self.ty.name()
                ));
                None
            }
        }
    }

    /// The list behind a sub-object-list field, created empty if absent.
    pub(crate) fn sub_object_list_mut(&mut self, index: FieldIndex) -> Option<&mut SubObjectList> {
        let slot = self.slot_mut(index, FieldKind::SubObjectList)?;
        let value =
            slot.get_or_insert_with(|| FieldValue::SubObjectList(SubObjectList::default()));
        match value {
            FieldValue::SubObjectList(list) => Some(list),
            _ => None,
        }
    }

    /// Rewrites owned children through `map_child`, field by field.
    pub(crate) fn map_owned<E>(
        &mut self,
        mut map_child: impl FnMut(FieldIndex, Rid) -> Result<Rid, E>,
    ) -> Result<(), E> {
        for (index, slot) in self.values.iter_mut().enumerate() {
            #[allow(clippy::cast_possible_truncation)]
            let index = index as FieldIndex;
            match slot {
                Some(FieldValue::SubObject(rid)) => *rid = map_child(index, *rid)?,
                Some(FieldValue::SubObjectList(list)) => {
                    for rid in &mut list.items {
                        *rid = map_child(index, *rid)?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Forgets every list's opted-out prototype entries.
    pub(crate) fn reset_prototype_removed(&mut self) {
        for slot in self.values.iter_mut().flatten() {
            if let FieldValue::SubObjectList(list) = slot {
                list.prototype_removed.clear();
            }
        }
    }

    /// Points references at cloned targets where `mapping` has one.
    pub(crate) fn remap_references(&mut self, mapping: &HashMap<Rid, Rid>) {
        let remap = |rid: &mut Rid| {
            if let Some(target) = mapping.get(rid) {
                *rid = *target;
            }
        };
        for slot in self.values.iter_mut().flatten() {
            match slot {
                FieldValue::Reference(rid) => remap(rid),
                FieldValue::ReferenceArray(rids) => rids.iter_mut().for_each(remap),
                _ => {}
            }
        }
    }
}
