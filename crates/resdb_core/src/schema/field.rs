//! Field declarations.

use crate::types::{FieldIndex, ResourceTypeId};
use std::sync::Arc;

/// The kind of value a field holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// `bool`.
    Bool,
    /// `i64`.
    Int,
    /// `u64`.
    UInt,
    /// `f64`.
    Float,
    /// UTF-8 string.
    String,
    /// Two `f32` components.
    Vec2,
    /// Three `f32` components.
    Vec3,
    /// Four `f32` components.
    Vec4,
    /// Rotation quaternion.
    Quat,
    /// RGBA color.
    Color,
    /// Enumeration value, named through the field's [`EnumDef`].
    Enum,
    /// Opaque bytes.
    Blob,
    /// Non-owning link to one resource. May dangle.
    Reference,
    /// Ordered non-owning links. May dangle.
    ReferenceArray,
    /// Owned child resource.
    SubObject,
    /// Ordered owned child resources.
    SubObjectList,
}

impl FieldKind {
    /// Whether this field owns the resources it points at.
    #[must_use]
    pub const fn is_owning(self) -> bool {
        matches!(self, Self::SubObject | Self::SubObjectList)
    }

    /// Whether this field holds RIDs.
    #[must_use]
    pub const fn is_relational(self) -> bool {
        matches!(
            self,
            Self::Reference | Self::ReferenceArray | Self::SubObject | Self::SubObjectList
        )
    }

    /// Inline size of a value of this kind, in bytes.
    ///
    /// Variable-length kinds report the size of their handle.
    #[must_use]
    pub const fn byte_size(self) -> usize {
        match self {
            Self::Bool => 1,
            Self::Int | Self::UInt | Self::Float | Self::Enum => 8,
            Self::Vec2 => 8,
            Self::Vec3 => 12,
            Self::Vec4 | Self::Quat | Self::Color => 16,
            Self::Reference | Self::SubObject => 8,
            Self::String | Self::Blob | Self::ReferenceArray | Self::SubObjectList => 24,
        }
    }
}

/// Symbolic names for the values of an enum field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDef {
    name: String,
    variants: Vec<(String, i64)>,
}

impl EnumDef {
    /// Creates an enum definition from `(name, value)` pairs.
    pub fn new<S: Into<String>>(name: impl Into<String>, variants: impl IntoIterator<Item = (S, i64)>) -> Self {
        Self {
            name: name.into(),
            variants: variants.into_iter().map(|(n, v)| (n.into(), v)).collect(),
        }
    }

    /// The enum's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Symbolic name of a value.
    pub fn name_of(&self, value: i64) -> Option<&str> {
        self.variants
            .iter()
            .find(|(_, v)| *v == value)
            .map(|(n, _)| n.as_str())
    }

    /// Value for a symbolic name.
    pub fn value_of(&self, name: &str) -> Option<i64> {
        self.variants.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }
}

/// Extra typing information attached to a field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SubKind {
    /// Nothing beyond the kind.
    #[default]
    None,
    /// Relational field expecting resources of this type.
    Resource(ResourceTypeId),
    /// Enum field with these symbolic names.
    Enum(Arc<EnumDef>),
}

/// One declared field of a resource type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    /// Position in the schema. Indices are dense from zero.
    pub index: FieldIndex,
    /// Field name, unique within the type.
    pub name: String,
    /// Value kind.
    pub kind: FieldKind,
    /// Extra typing information.
    pub sub_kind: SubKind,
}

impl FieldDef {
    /// The enum definition, for enum fields that declared one.
    pub fn enum_def(&self) -> Option<&EnumDef> {
        match &self.sub_kind {
            SubKind::Enum(def) => Some(def),
            _ => None,
        }
    }

    /// The expected target type, for relational fields that declared one.
    pub fn target_type(&self) -> Option<ResourceTypeId> {
        match self.sub_kind {
            SubKind::Resource(id) => Some(id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owning_kinds() {
        assert!(FieldKind::SubObject.is_owning());
        assert!(FieldKind::SubObjectList.is_owning());
        assert!(!FieldKind::Reference.is_owning());
        assert!(FieldKind::Reference.is_relational());
        assert!(!FieldKind::Float.is_relational());
    }

    #[test]
    fn enum_lookup_both_ways() {
        let def = EnumDef::new("Blend", [("Opaque", 0), ("Additive", 2)]);
        assert_eq!(def.name_of(2), Some("Additive"));
        assert_eq!(def.value_of("Opaque"), Some(0));
        assert_eq!(def.name_of(1), None);
        assert_eq!(def.value_of("Masked"), None);
    }
}
