//! Type registry and builder.

use crate::database::Database;
use crate::error::{CoreError, CoreResult};
use crate::schema::field::{EnumDef, FieldDef, FieldKind, SubKind};
use crate::types::{FieldIndex, ResourceTypeId, Rid};
use crate::value::FieldValue;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A registered resource schema.
#[derive(Debug)]
pub struct ResourceType {
    id: ResourceTypeId,
    name: String,
    fields: Vec<FieldDef>,
    default_value: Option<Rid>,
    registration: u64,
}

impl ResourceType {
    pub(crate) fn from_fields(id: ResourceTypeId, name: &str, fields: Vec<FieldDef>) -> Self {
        Self {
            id,
            name: name.to_string(),
            fields,
            default_value: None,
            registration: 0,
        }
    }

    /// The type id.
    pub fn id(&self) -> ResourceTypeId {
        self.id
    }

    /// The type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All fields, ordered by index.
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// The field at `index`.
    pub fn field(&self, index: FieldIndex) -> Option<&FieldDef> {
        self.fields.get(index as usize)
    }

    /// The field called `name`.
    pub fn field_by_name(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Index of the field called `name`.
    pub fn field_index(&self, name: &str) -> Option<FieldIndex> {
        self.field_by_name(name).map(|f| f.index)
    }

    /// Resource whose snapshot seeds every new instance of this type.
    pub fn default_value(&self) -> Option<Rid> {
        self.default_value
    }

    /// Registration sequence number; higher means newer.
    pub fn registration(&self) -> u64 {
        self.registration
    }

    /// Indices of owning fields.
    pub fn owning_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| f.kind.is_owning())
    }
}

/// Declares a resource type field by field.
///
/// ```rust,ignore
/// let point = db
///     .register_type(ResourceTypeId::new(1), "Point")
///     .field(0, "x", FieldKind::Float)
///     .field(1, "y", FieldKind::Float)
///     .build()?;
/// ```
#[must_use = "a type is only registered once `build` is called"]
pub struct TypeBuilder<'db> {
    db: &'db Database,
    id: ResourceTypeId,
    name: String,
    fields: Vec<FieldDef>,
    defaults: Vec<(FieldIndex, FieldValue)>,
}

impl<'db> TypeBuilder<'db> {
    pub(crate) fn new(db: &'db Database, id: ResourceTypeId, name: &str) -> Self {
        Self {
            db,
            id,
            name: name.to_string(),
            fields: Vec::new(),
            defaults: Vec::new(),
        }
    }

    /// Declares a field.
    pub fn field(self, index: FieldIndex, name: &str, kind: FieldKind) -> Self {
        self.field_with(index, name, kind, SubKind::None)
    }

    /// Declares a field with extra typing information.
    pub fn field_with(mut self, index: FieldIndex, name: &str, kind: FieldKind, sub_kind: SubKind) -> Self {
        self.fields.push(FieldDef {
            index,
            name: name.to_string(),
            kind,
            sub_kind,
        });
        self
    }

    /// Declares an enum field with symbolic names.
    pub fn enum_field(self, index: FieldIndex, name: &str, def: EnumDef) -> Self {
        self.field_with(index, name, FieldKind::Enum, SubKind::Enum(Arc::new(def)))
    }

    /// Declares a relational field expecting resources of `target`.
    pub fn relation(self, index: FieldIndex, name: &str, kind: FieldKind, target: ResourceTypeId) -> Self {
        debug_assert!(kind.is_relational(), "{kind:?} is not relational");
        self.field_with(index, name, kind, SubKind::Resource(target))
    }

    /// Gives a field a default value.
    ///
    /// A type with defaults gets a template resource that every `create`
    /// clones.
    pub fn default_value(mut self, index: FieldIndex, value: impl Into<FieldValue>) -> Self {
        self.defaults.push((index, value.into()));
        self
    }

    /// Validates the schema and registers it.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` when field indices are not dense from zero,
    /// names repeat, or a default does not match its field.
    pub fn build(mut self) -> CoreResult<Arc<ResourceType>> {
        self.fields.sort_by_key(|f| f.index);
        for (position, field) in self.fields.iter().enumerate() {
            if field.index as usize != position {
                return Err(CoreError::invalid_operation(format!(
                    "type {}: field indices must be dense from 0, found {} at position {position}",
                    self.name, field.index
                )));
            }
        }
        let mut names = HashSet::new();
        if let Some(dup) = self.fields.iter().find(|f| !names.insert(f.name.as_str())) {
            return Err(CoreError::invalid_operation(format!(
                "type {}: duplicate field name {}",
                self.name, dup.name
            )));
        }
        for (index, value) in &self.defaults {
            let kind = self.fields.get(*index as usize).map(|f| f.kind);
            if kind != Some(value.kind()) || value.kind().is_owning() {
                return Err(CoreError::invalid_operation(format!(
                    "type {}: default for field {index} does not fit its schema",
                    self.name
                )));
            }
        }

        let Self {
            db,
            id,
            name,
            fields,
            defaults,
        } = self;
        db.install_type(id, name, fields, defaults)
    }
}

/// All registered schemas, newest last.
pub(crate) struct TypeRegistry {
    by_id: RwLock<HashMap<ResourceTypeId, Vec<Arc<ResourceType>>>>,
    by_name: RwLock<HashMap<String, Vec<Arc<ResourceType>>>>,
    sequence: AtomicU64,
}

impl TypeRegistry {
    pub(crate) fn new() -> Self {
        Self {
            by_id: RwLock::new(HashMap::new()),
            by_name: RwLock::new(HashMap::new()),
            sequence: AtomicU64::new(0),
        }
    }

    /// Builds the final schema object, stamping its registration number.
    pub(crate) fn make_type(
        &self,
        id: ResourceTypeId,
        name: String,
        fields: Vec<FieldDef>,
        default_value: Option<Rid>,
    ) -> Arc<ResourceType> {
        Arc::new(ResourceType {
            id,
            name,
            fields,
            default_value,
            registration: self.sequence.fetch_add(1, Ordering::SeqCst) + 1,
        })
    }

    pub(crate) fn insert(&self, ty: Arc<ResourceType>) {
        self.by_id
            .write()
            .entry(ty.id)
            .or_default()
            .push(Arc::clone(&ty));
        self.by_name
            .write()
            .entry(ty.name.clone())
            .or_default()
            .push(ty);
    }

    pub(crate) fn find_by_id(&self, id: ResourceTypeId) -> Option<Arc<ResourceType>> {
        self.by_id.read().get(&id)?.last().cloned()
    }

    pub(crate) fn find_by_name(&self, name: &str) -> Option<Arc<ResourceType>> {
        self.by_name.read().get(name)?.last().cloned()
    }

    pub(crate) fn registrations(&self, id: ResourceTypeId) -> Vec<Arc<ResourceType>> {
        self.by_id.read().get(&id).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make(registry: &TypeRegistry, id: u64, name: &str, field: &str) -> Arc<ResourceType> {
        let ty = registry.make_type(
            ResourceTypeId::new(id),
            name.to_string(),
            vec![FieldDef {
                index: 0,
                name: field.to_string(),
                kind: FieldKind::Int,
                sub_kind: SubKind::None,
            }],
            None,
        );
        registry.insert(Arc::clone(&ty));
        ty
    }

    #[test]
    fn latest_registration_wins() {
        let registry = TypeRegistry::new();
        let first = make(&registry, 1, "Counter", "count");
        let second = make(&registry, 1, "Counter", "value");

        let found = registry.find_by_id(ResourceTypeId::new(1)).unwrap();
        assert!(Arc::ptr_eq(&found, &second));
        assert!(second.registration() > first.registration());
        assert_eq!(registry.find_by_name("Counter").unwrap().field_index("value"), Some(0));
        assert_eq!(registry.registrations(ResourceTypeId::new(1)).len(), 2);
    }

    #[test]
    fn unknown_type_is_none() {
        let registry = TypeRegistry::new();
        assert!(registry.find_by_id(ResourceTypeId::new(9)).is_none());
        assert!(registry.find_by_name("Missing").is_none());
    }

    #[test]
    fn field_lookup() {
        let registry = TypeRegistry::new();
        let ty = make(&registry, 2, "Tag", "weight");
        assert_eq!(ty.field(0).map(|f| f.kind), Some(FieldKind::Int));
        assert!(ty.field(1).is_none());
        assert!(ty.field_by_name("missing").is_none());
        assert_eq!(ty.owning_fields().count(), 0);
    }
}
