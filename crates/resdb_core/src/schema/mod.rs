//! Resource type schemas.
//!
//! A [`ResourceType`] is an ordered list of [`FieldDef`]s. Types enter the
//! database only through [`TypeBuilder`]; registering the same id or name again
//! makes the newest schema authoritative while instances created under older
//! registrations keep theirs.

mod field;
mod registry;

pub use field::{EnumDef, FieldDef, FieldKind, SubKind};
pub use registry::{ResourceType, TypeBuilder};
pub(crate) use registry::TypeRegistry;
