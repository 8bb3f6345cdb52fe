//! Property-based test generators using proptest.
//!
//! Provides strategies for field values and edit sequences that stay
//! within the test schemas registered by [`crate::fixtures`].

use proptest::prelude::*;
use resdb_core::{Color, Quat, Vec2, Vec3, Vec4};

/// Strategy for finite floats. NaN never round-trips through equality.
pub fn finite_f64() -> impl Strategy<Value = f64> {
    -1.0e9f64..1.0e9f64
}

/// Strategy for finite single-precision components.
pub fn finite_f32() -> impl Strategy<Value = f32> {
    -1.0e6f32..1.0e6f32
}

/// Strategy for `Point` coordinates.
pub fn point_strategy() -> impl Strategy<Value = (f64, f64)> {
    (finite_f64(), finite_f64())
}

/// Strategy for node names.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z][a-zA-Z0-9_ ]{0,23}").expect("Invalid regex")
}

/// Strategy for blob payloads.
pub fn blob_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..256)
}

/// Strategy for `Vec2` values.
pub fn vec2_strategy() -> impl Strategy<Value = Vec2> {
    (finite_f32(), finite_f32()).prop_map(|(x, y)| Vec2 { x, y })
}

/// Strategy for `Vec3` values.
pub fn vec3_strategy() -> impl Strategy<Value = Vec3> {
    (finite_f32(), finite_f32(), finite_f32()).prop_map(|(x, y, z)| Vec3 { x, y, z })
}

/// Strategy for `Vec4` values.
pub fn vec4_strategy() -> impl Strategy<Value = Vec4> {
    (finite_f32(), finite_f32(), finite_f32(), finite_f32())
        .prop_map(|(x, y, z, w)| Vec4 { x, y, z, w })
}

/// Strategy for `Quat` values. Not normalized.
pub fn quat_strategy() -> impl Strategy<Value = Quat> {
    (finite_f32(), finite_f32(), finite_f32(), finite_f32())
        .prop_map(|(x, y, z, w)| Quat { x, y, z, w })
}

/// Strategy for `Color` values in `[0, 1]`.
pub fn color_strategy() -> impl Strategy<Value = Color> {
    (0.0f32..=1.0, 0.0f32..=1.0, 0.0f32..=1.0, 0.0f32..=1.0).prop_map(
        |(red, green, blue, alpha)| Color {
            red,
            green,
            blue,
            alpha,
        },
    )
}

/// An edit applied to a `SceneNode` tree in model-based tests.
#[derive(Debug, Clone)]
pub enum NodeEdit {
    /// Rename the node at `slot`.
    Rename {
        /// Index into the live node list, taken modulo its length.
        slot: usize,
        /// New name.
        name: String,
    },
    /// Replace the payload of the node at `slot`.
    SetPayload {
        /// Index into the live node list, taken modulo its length.
        slot: usize,
        /// New payload.
        payload: Vec<u8>,
    },
    /// Create a node and append it to the children of the node at `slot`.
    AddChild {
        /// Index into the live node list, taken modulo its length.
        slot: usize,
        /// Name of the new child.
        name: String,
    },
    /// Destroy the node at `slot`, unless it is the root.
    Destroy {
        /// Index into the live node list, taken modulo its length.
        slot: usize,
    },
}

/// Strategy for a single node edit.
pub fn node_edit_strategy() -> impl Strategy<Value = NodeEdit> {
    prop_oneof![
        3 => (any::<usize>(), name_strategy())
            .prop_map(|(slot, name)| NodeEdit::Rename { slot, name }),
        1 => (any::<usize>(), blob_strategy())
            .prop_map(|(slot, payload)| NodeEdit::SetPayload { slot, payload }),
        2 => (any::<usize>(), name_strategy())
            .prop_map(|(slot, name)| NodeEdit::AddChild { slot, name }),
        1 => any::<usize>().prop_map(|slot| NodeEdit::Destroy { slot }),
    ]
}

/// Strategy for a sequence of node edits.
pub fn node_edit_sequence(min: usize, max: usize) -> impl Strategy<Value = Vec<NodeEdit>> {
    prop::collection::vec(node_edit_strategy(), min..max)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn floats_are_finite(value in finite_f64()) {
            prop_assert!(value.is_finite());
        }

        #[test]
        fn names_are_not_empty(name in name_strategy()) {
            prop_assert!(!name.is_empty());
            prop_assert!(name.len() <= 24);
        }

        #[test]
        fn colors_are_normalized(color in color_strategy()) {
            prop_assert!((0.0..=1.0).contains(&color.alpha));
        }
    }
}
