//! # ResDB Core
//!
//! In-memory, multi-version resource database for editor-style tools.
//!
//! Resources are typed records addressed by a stable [`Rid`]. Every resource
//! holds an immutable snapshot that readers see without locking; writers edit
//! a private copy and publish it with a compare-and-swap, so a writer that
//! raced another on the same resource is told it lost instead of silently
//! overwriting.
//!
//! On top of that the database provides:
//!
//! - Schemas with ordered, typed fields and optional defaults
//! - Ownership through `SubObject` and `SubObjectList` fields, with
//!   cascading destroy and version bumps up the owner chain
//! - Prototypes: instances inherit their prototype's edits until they
//!   override them
//! - Undo/redo scopes that record before and after snapshots
//! - Change listeners per resource, per type and per field
//! - Serialization of a resource tree to CBOR through `resdb_codec`
//! - Deferred reclamation of displaced snapshots
//!
//! ## Example
//!
//! ```rust
//! use resdb_core::{Database, FieldKind, FieldReader, ResourceTypeId};
//!
//! let db = Database::init();
//! let point = db
//!     .register_type(ResourceTypeId::new(1), "Point")
//!     .field(0, "x", FieldKind::Float)
//!     .field(1, "y", FieldKind::Float)
//!     .build()
//!     .unwrap();
//!
//! let rid = db.create(point.id(), None).unwrap();
//! let mut writer = db.write(rid).unwrap();
//! writer.set_float(0, 1.0).set_float(1, 2.0);
//! let version = writer.commit(None).unwrap();
//!
//! assert_eq!(version, 1);
//! assert_eq!(db.read(rid).get_float(1), Some(2.0));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod database;
mod error;
mod events;
mod gc;
mod instance;
mod object;
mod prototype;
mod schema;
mod serialize;
mod stats;
mod storage;
mod transaction;
mod types;
mod value;

pub use config::Config;
pub use database::Database;
pub use error::{CoreError, CoreResult};
pub use events::{ChangeEvent, ChangeListener, VersionListener};
pub use instance::ResourceInstance;
pub use object::{FieldReader, InstanceView, ResourceObject, WriteObject};
pub use prototype::{DiffEntry, SubObjectListDiff};
pub use schema::{EnumDef, FieldDef, FieldKind, ResourceType, SubKind, TypeBuilder};
pub use stats::{DatabaseStats, StatsSnapshot};
pub use transaction::{ChangeRecord, UndoRedoScope};
pub use types::{FieldIndex, ResourceTypeId, Rid};
pub use value::{Color, FieldValue, Quat, SubObjectList, Vec2, Vec3, Vec4};

pub use uuid::Uuid;
