//! Typed accessors over resource snapshots.
//!
//! [`ResourceObject`] reads through the storage's current pointer on every
//! call, so a long-lived reader always sees the latest commit.
//! [`WriteObject`] owns a private copy of the snapshot it was opened on and
//! publishes it with [`WriteObject::commit`].
//!
//! Asking for a field that the schema does not declare, or declares with
//! another kind, is a contract violation: a panic in debug builds, an ignored
//! call (and `None` from getters) in release builds.

use crate::database::Database;
use crate::error::{contract_violation, CoreResult};
use crate::instance::ResourceInstance;
use crate::schema::{FieldKind, ResourceType};
use crate::storage::ResourceStorage;
use crate::transaction::UndoRedoScope;
use crate::types::{FieldIndex, Rid};
use crate::value::{Color, FieldValue, Quat, SubObjectList, Vec2, Vec3, Vec4};
use std::sync::Arc;

macro_rules! typed_getter {
    ($(#[$doc:meta])* $name:ident, $kind:ident, $ty:ty) => {
        $(#[$doc])*
        fn $name(&self, index: FieldIndex) -> Option<$ty> {
            self.read_field(index, FieldKind::$kind, |value| match value {
                FieldValue::$kind(v) => Some(v.clone()),
                _ => None,
            })
        }
    };
}

/// Read access to a resource's fields.
pub trait FieldReader {
    /// Runs `f` against the snapshot this reader observes.
    ///
    /// Returns `None` when there is no snapshot.
    fn with_instance<R>(&self, f: impl FnOnce(&ResourceInstance) -> R) -> Option<R>;

    /// Whether there is a snapshot to read.
    fn has_value(&self) -> bool {
        self.with_instance(|_| ()).is_some()
    }

    /// The schema of the observed snapshot.
    fn resource_type(&self) -> Option<Arc<ResourceType>> {
        self.with_instance(|i| Arc::clone(i.resource_type()))
    }

    /// Index of the field called `name`.
    fn field_index(&self, name: &str) -> Option<FieldIndex> {
        self.with_instance(|i| i.resource_type().field_index(name))
            .flatten()
    }

    /// Whether the field is set.
    fn has(&self, index: FieldIndex) -> bool {
        self.with_instance(|i| i.has(index)).unwrap_or(false)
    }

    /// The field's value, whatever its kind.
    fn get(&self, index: FieldIndex) -> Option<FieldValue> {
        self.with_instance(|i| i.get(index).cloned()).flatten()
    }

    /// Reads a field after checking its declared kind.
    fn read_field<R>(
        &self,
        index: FieldIndex,
        kind: FieldKind,
        extract: impl FnOnce(&FieldValue) -> Option<R>,
    ) -> Option<R> {
        self.with_instance(|instance| {
            let ty = instance.resource_type();
            match ty.field(index) {
                Some(def) if def.kind == kind => instance.get(index).and_then(extract),
                Some(def) => {
                    contract_violation(format_args!(
                        "field {}.{} is {:?}, read as {kind:?}",
                        ty.name(),
                        def.name,
                        def.kind
                    ));
                    None
                }
                None => {
                    contract_violation(format_args!("type {} has no field {index}", ty.name()));
                    None
                }
            }
        })
        .flatten()
    }

    typed_getter!(
        /// Reads a `Bool` field.
        get_bool, Bool, bool
    );
    typed_getter!(
        /// Reads an `Int` field.
        get_int, Int, i64
    );
    typed_getter!(
        /// Reads a `UInt` field.
        get_uint, UInt, u64
    );
    typed_getter!(
        /// Reads a `Float` field.
        get_float, Float, f64
    );
    typed_getter!(
        /// Reads a `String` field.
        get_string, String, String
    );
    typed_getter!(
        /// Reads a `Vec2` field.
        get_vec2, Vec2, Vec2
    );
    typed_getter!(
        /// Reads a `Vec3` field.
        get_vec3, Vec3, Vec3
    );
    typed_getter!(
        /// Reads a `Vec4` field.
        get_vec4, Vec4, Vec4
    );
    typed_getter!(
        /// Reads a `Quat` field.
        get_quat, Quat, Quat
    );
    typed_getter!(
        /// Reads a `Color` field.
        get_color, Color, Color
    );
    typed_getter!(
        /// Reads an `Enum` field's raw value.
        get_enum, Enum, i64
    );
    typed_getter!(
        /// Reads a `Blob` field.
        get_blob, Blob, Vec<u8>
    );
    typed_getter!(
        /// Reads a `Reference` field. The target may no longer exist.
        get_reference, Reference, Rid
    );
    typed_getter!(
        /// Reads a `ReferenceArray` field.
        get_reference_array, ReferenceArray, Vec<Rid>
    );
    typed_getter!(
        /// Reads a `SubObject` field.
        get_sub_object, SubObject, Rid
    );

    /// Reads a `SubObjectList` field's owned children.
    fn get_sub_object_list(&self, index: FieldIndex) -> Option<Vec<Rid>> {
        self.read_field(index, FieldKind::SubObjectList, |value| match value {
            FieldValue::SubObjectList(list) => Some(list.items.clone()),
            _ => None,
        })
    }

    /// Reads an `Enum` field as its symbolic name.
    fn get_enum_name(&self, index: FieldIndex) -> Option<String> {
        let value = self.get_enum(index)?;
        self.with_instance(|i| {
            i.resource_type()
                .field(index)?
                .enum_def()?
                .name_of(value)
                .map(str::to_string)
        })
        .flatten()
    }
}

/// Live read accessor for one resource.
///
/// Holds no snapshot of its own; every call is one atomic load of the
/// storage's current pointer. An accessor for a RID that was never allocated
/// reads as empty.
#[derive(Clone, Copy)]
pub struct ResourceObject<'db> {
    rid: Rid,
    storage: Option<&'db ResourceStorage>,
}

impl<'db> ResourceObject<'db> {
    pub(crate) fn new(rid: Rid, storage: Option<&'db ResourceStorage>) -> Self {
        Self { rid, storage }
    }

    /// The resource being read.
    pub fn rid(&self) -> Rid {
        self.rid
    }

    /// The resource's current version.
    pub fn version(&self) -> u64 {
        self.storage.map_or(0, ResourceStorage::version)
    }

    /// Pins the current snapshot.
    pub fn snapshot(&self) -> Option<Arc<ResourceInstance>> {
        self.storage?.load()
    }
}

impl FieldReader for ResourceObject<'_> {
    fn with_instance<R>(&self, f: impl FnOnce(&ResourceInstance) -> R) -> Option<R> {
        let guard = self.storage?.guard();
        guard.as_deref().map(f)
    }
}

/// Read-only view over one fixed snapshot, as handed to listeners.
#[derive(Clone, Copy)]
pub struct InstanceView<'a> {
    instance: &'a ResourceInstance,
}

impl<'a> InstanceView<'a> {
    pub(crate) fn new(instance: &'a ResourceInstance) -> Self {
        Self { instance }
    }

    /// The underlying snapshot.
    pub fn instance(&self) -> &'a ResourceInstance {
        self.instance
    }
}

impl<'a> From<&'a ResourceInstance> for InstanceView<'a> {
    fn from(instance: &'a ResourceInstance) -> Self {
        Self::new(instance)
    }
}

impl FieldReader for InstanceView<'_> {
    fn with_instance<R>(&self, f: impl FnOnce(&ResourceInstance) -> R) -> Option<R> {
        Some(f(self.instance))
    }
}

/// Write accessor over a private copy of a resource.
///
/// Setters only touch the copy. Nothing is visible to other threads until
/// [`commit`](Self::commit); dropping the accessor discards the edits.
///
/// ```rust,ignore
/// let mut point = db.write(rid)?;
/// point.set_float(0, 1.0).set_float(1, 2.0);
/// point.commit(None)?;
/// ```
pub struct WriteObject<'db> {
    pub(crate) db: &'db Database,
    pub(crate) rid: Rid,
    pub(crate) based_on: Option<Arc<ResourceInstance>>,
    pub(crate) instance: ResourceInstance,
}

impl<'db> WriteObject<'db> {
    /// The resource being written.
    pub fn rid(&self) -> Rid {
        self.rid
    }

    /// Sets a non-owning field.
    ///
    /// Owned children go through [`set_sub_object`](Self::set_sub_object)
    /// and the list helpers, which keep the ownership tree valid.
    pub fn set(&mut self, index: FieldIndex, value: impl Into<FieldValue>) -> &mut Self {
        let value = value.into();
        if value.kind().is_owning() {
            contract_violation(format_args!(
                "{}: owned children must be set through the sub-object helpers",
                self.rid
            ));
            return self;
        }
        self.instance.set(index, value);
        self
    }

    /// Sets a `Bool` field.
    pub fn set_bool(&mut self, index: FieldIndex, value: bool) -> &mut Self {
        self.set(index, FieldValue::Bool(value))
    }

    /// Sets an `Int` field.
    pub fn set_int(&mut self, index: FieldIndex, value: i64) -> &mut Self {
        self.set(index, FieldValue::Int(value))
    }

    /// Sets a `UInt` field.
    pub fn set_uint(&mut self, index: FieldIndex, value: u64) -> &mut Self {
        self.set(index, FieldValue::UInt(value))
    }

    /// Sets a `Float` field.
    pub fn set_float(&mut self, index: FieldIndex, value: f64) -> &mut Self {
        self.set(index, FieldValue::Float(value))
    }

    /// Sets a `String` field.
    pub fn set_string(&mut self, index: FieldIndex, value: impl Into<String>) -> &mut Self {
        self.set(index, FieldValue::String(value.into()))
    }

    /// Sets a `Vec2` field.
    pub fn set_vec2(&mut self, index: FieldIndex, value: Vec2) -> &mut Self {
        self.set(index, FieldValue::Vec2(value))
    }

    /// Sets a `Vec3` field.
    pub fn set_vec3(&mut self, index: FieldIndex, value: Vec3) -> &mut Self {
        self.set(index, FieldValue::Vec3(value))
    }

    /// Sets a `Vec4` field.
    pub fn set_vec4(&mut self, index: FieldIndex, value: Vec4) -> &mut Self {
        self.set(index, FieldValue::Vec4(value))
    }

    /// Sets a `Quat` field.
    pub fn set_quat(&mut self, index: FieldIndex, value: Quat) -> &mut Self {
        self.set(index, FieldValue::Quat(value))
    }

    /// Sets a `Color` field.
    pub fn set_color(&mut self, index: FieldIndex, value: Color) -> &mut Self {
        self.set(index, FieldValue::Color(value))
    }

    /// Sets an `Enum` field's raw value.
    pub fn set_enum(&mut self, index: FieldIndex, value: i64) -> &mut Self {
        self.set(index, FieldValue::Enum(value))
    }

    /// Sets an `Enum` field by symbolic name.
    pub fn set_enum_name(&mut self, index: FieldIndex, name: &str) -> &mut Self {
        let value = self
            .instance
            .resource_type()
            .field(index)
            .and_then(|def| def.enum_def())
            .and_then(|def| def.value_of(name));
        match value {
            Some(value) => self.set_enum(index, value),
            None => {
                contract_violation(format_args!(
                    "{}: field {index} has no enum variant {name}",
                    self.rid
                ));
                self
            }
        }
    }

    /// Sets a `Blob` field.
    pub fn set_blob(&mut self, index: FieldIndex, value: Vec<u8>) -> &mut Self {
        self.set(index, FieldValue::Blob(value))
    }

    /// Points a `Reference` field at `target`.
    pub fn set_reference(&mut self, index: FieldIndex, target: Rid) -> &mut Self {
        self.set(index, FieldValue::Reference(target))
    }

    /// Replaces a `ReferenceArray` field.
    pub fn set_reference_array(&mut self, index: FieldIndex, targets: Vec<Rid>) -> &mut Self {
        self.set(index, FieldValue::ReferenceArray(targets))
    }

    /// Makes `child` the owned sub-object in `index`.
    ///
    /// The previous child, if any, is detached on commit but not destroyed.
    pub fn set_sub_object(&mut self, index: FieldIndex, child: Rid) -> &mut Self {
        if self.can_adopt(child) {
            self.instance.set(index, FieldValue::SubObject(child));
        }
        self
    }

    /// Appends `child` to a `SubObjectList` field.
    pub fn add_to_sub_object_list(&mut self, index: FieldIndex, child: Rid) -> &mut Self {
        if !self.can_adopt(child) {
            return self;
        }
        if let Some(list) = self.instance.sub_object_list_mut(index) {
            if !list.contains(child) {
                list.items.push(child);
            }
        }
        self
    }

    /// Takes `child` out of a `SubObjectList` field.
    ///
    /// The child is detached on commit but not destroyed.
    pub fn remove_from_sub_object_list(&mut self, index: FieldIndex, child: Rid) -> &mut Self {
        if let Some(list) = self.instance.sub_object_list_mut(index) {
            list.items.retain(|item| *item != child);
        }
        self
    }

    /// Takes an inherited `child` out of a `SubObjectList` field and keeps it
    /// out.
    ///
    /// The child's prototype is recorded in the list so later edits to the
    /// prototype's list do not bring it back.
    pub fn remove_from_prototype_sub_object_list(
        &mut self,
        index: FieldIndex,
        child: Rid,
    ) -> &mut Self {
        let prototype = self.db.prototype_of(child);
        if let Some(list) = self.instance.sub_object_list_mut(index) {
            list.items.retain(|item| *item != child);
            if let Some(prototype) = prototype {
                if !list.prototype_removed.contains(&prototype) {
                    list.prototype_removed.push(prototype);
                }
            }
        }
        self
    }

    /// The list behind a `SubObjectList` field, as currently edited.
    pub fn sub_object_list(&self, index: FieldIndex) -> Option<&SubObjectList> {
        self.instance.sub_object_list(index)
    }

    /// Unsets a field.
    pub fn clear_field(&mut self, index: FieldIndex) -> &mut Self {
        self.instance.clear(index);
        self
    }

    /// Publishes the edited copy.
    ///
    /// Returns the resource's new version.
    ///
    /// # Errors
    ///
    /// Returns `CommitConflict` if another writer committed this resource
    /// after this accessor was opened; the edits are discarded. Returns
    /// `DatabaseClosed` after shutdown.
    pub fn commit(self, scope: Option<&UndoRedoScope>) -> CoreResult<u64> {
        self.db
            .commit_write(self.rid, self.based_on, self.instance, scope)
    }

    fn can_adopt(&self, child: Rid) -> bool {
        if child == self.rid || self.db.is_parent_of(child, self.rid) {
            contract_violation(format_args!(
                "{}: adopting {child} would create an ownership cycle",
                self.rid
            ));
            return false;
        }
        match self.db.parent_of(child) {
            Some((parent, _)) if parent != self.rid => {
                contract_violation(format_args!(
                    "{child} is already owned by {parent}"
                ));
                false
            }
            _ => true,
        }
    }
}

impl FieldReader for WriteObject<'_> {
    fn with_instance<R>(&self, f: impl FnOnce(&ResourceInstance) -> R) -> Option<R> {
        Some(f(&self.instance))
    }
}
