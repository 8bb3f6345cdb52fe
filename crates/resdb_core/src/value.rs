//! Field values.

use crate::schema::FieldKind;
use crate::types::Rid;

/// Two-component vector.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec2 {
    /// X component.
    pub x: f32,
    /// Y component.
    pub y: f32,
}

/// Three-component vector.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    /// X component.
    pub x: f32,
    /// Y component.
    pub y: f32,
    /// Z component.
    pub z: f32,
}

/// Four-component vector.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec4 {
    /// X component.
    pub x: f32,
    /// Y component.
    pub y: f32,
    /// Z component.
    pub z: f32,
    /// W component.
    pub w: f32,
}

/// Rotation quaternion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quat {
    /// X component.
    pub x: f32,
    /// Y component.
    pub y: f32,
    /// Z component.
    pub z: f32,
    /// W component.
    pub w: f32,
}

impl Default for Quat {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            w: 1.0,
        }
    }
}

/// RGBA color.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    /// Red channel.
    pub red: f32,
    /// Green channel.
    pub green: f32,
    /// Blue channel.
    pub blue: f32,
    /// Alpha channel.
    pub alpha: f32,
}

impl Default for Color {
    fn default() -> Self {
        Self {
            red: 1.0,
            green: 1.0,
            blue: 1.0,
            alpha: 1.0,
        }
    }
}

/// Ordered owned children plus the inherited entries an instance opted out of.
///
/// `prototype_removed` holds RIDs of *prototype* children whose inherited copy
/// was removed from this list. Propagation never re-adds those.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubObjectList {
    /// Owned children, in order.
    pub items: Vec<Rid>,
    /// Prototype children excluded from this list.
    pub prototype_removed: Vec<Rid>,
}

impl SubObjectList {
    /// Creates a list holding `items`.
    pub fn from_items(items: Vec<Rid>) -> Self {
        Self {
            items,
            prototype_removed: Vec::new(),
        }
    }

    /// Whether `rid` is one of the owned children.
    pub fn contains(&self, rid: Rid) -> bool {
        self.items.contains(&rid)
    }
}

/// A single field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Unsigned integer.
    UInt(u64),
    /// Float.
    Float(f64),
    /// String.
    String(String),
    /// 2D vector.
    Vec2(Vec2),
    /// 3D vector.
    Vec3(Vec3),
    /// 4D vector.
    Vec4(Vec4),
    /// Quaternion.
    Quat(Quat),
    /// Color.
    Color(Color),
    /// Enum value.
    Enum(i64),
    /// Binary blob.
    Blob(Vec<u8>),
    /// Weak link.
    Reference(Rid),
    /// Ordered weak links.
    ReferenceArray(Vec<Rid>),
    /// Owned child.
    SubObject(Rid),
    /// Ordered owned children.
    SubObjectList(SubObjectList),
}

impl FieldValue {
    /// The schema kind this value satisfies.
    pub fn kind(&self) -> FieldKind {
        match self {
            Self::Bool(_) => FieldKind::Bool,
            Self::Int(_) => FieldKind::Int,
            Self::UInt(_) => FieldKind::UInt,
            Self::Float(_) => FieldKind::Float,
            Self::String(_) => FieldKind::String,
            Self::Vec2(_) => FieldKind::Vec2,
            Self::Vec3(_) => FieldKind::Vec3,
            Self::Vec4(_) => FieldKind::Vec4,
            Self::Quat(_) => FieldKind::Quat,
            Self::Color(_) => FieldKind::Color,
            Self::Enum(_) => FieldKind::Enum,
            Self::Blob(_) => FieldKind::Blob,
            Self::Reference(_) => FieldKind::Reference,
            Self::ReferenceArray(_) => FieldKind::ReferenceArray,
            Self::SubObject(_) => FieldKind::SubObject,
            Self::SubObjectList(_) => FieldKind::SubObjectList,
        }
    }

    /// RIDs owned through this value.
    pub fn owned_rids(&self) -> &[Rid] {
        match self {
            Self::SubObject(rid) => std::slice::from_ref(rid),
            Self::SubObjectList(list) => &list.items,
            _ => &[],
        }
    }
}

macro_rules! impl_from_for_field_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for FieldValue {
                fn from(value: $ty) -> Self {
                    Self::$variant(value)
                }
            }
        )*
    };
}

impl_from_for_field_value! {
    bool => Bool,
    i64 => Int,
    u64 => UInt,
    f64 => Float,
    String => String,
    Vec2 => Vec2,
    Vec3 => Vec3,
    Vec4 => Vec4,
    Quat => Quat,
    Color => Color,
    Vec<u8> => Blob,
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_match_variants() {
        assert_eq!(FieldValue::from(1.5).kind(), FieldKind::Float);
        assert_eq!(FieldValue::from("name").kind(), FieldKind::String);
        assert_eq!(FieldValue::from(vec![1u8]).kind(), FieldKind::Blob);
        assert_eq!(
            FieldValue::SubObjectList(SubObjectList::default()).kind(),
            FieldKind::SubObjectList
        );
    }

    #[test]
    fn owned_rids_only_for_owning_values() {
        let a = Rid::from_raw(1);
        let b = Rid::from_raw(2);
        assert_eq!(FieldValue::SubObject(a).owned_rids(), &[a]);
        assert_eq!(
            FieldValue::SubObjectList(SubObjectList::from_items(vec![a, b])).owned_rids(),
            &[a, b]
        );
        assert!(FieldValue::Reference(a).owned_rids().is_empty());
    }

    #[test]
    fn identity_defaults() {
        assert_eq!(Quat::default().w, 1.0);
        assert_eq!(Color::default().alpha, 1.0);
    }
}
