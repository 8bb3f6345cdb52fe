//! Test fixtures and database helpers.
//!
//! Provides registered test schemas and convenience functions for setting
//! up databases and common resource trees.

use resdb_core::{
    Config, Database, EnumDef, FieldKind, ResourceType, ResourceTypeId, Rid,
};
use std::sync::{Arc, Once};
use tracing_subscriber::EnvFilter;

/// Id of the `Point { x: Float, y: Float }` type.
pub const POINT: ResourceTypeId = ResourceTypeId::new(1);
/// Id of the `Transform` type owned by scene nodes.
pub const TRANSFORM: ResourceTypeId = ResourceTypeId::new(2);
/// Id of the `SceneNode` type.
pub const SCENE_NODE: ResourceTypeId = ResourceTypeId::new(3);

/// Field indices of `Point`.
pub mod point {
    use resdb_core::FieldIndex;

    /// `x: Float`
    pub const X: FieldIndex = 0;
    /// `y: Float`
    pub const Y: FieldIndex = 1;
}

/// Field indices of `Transform`.
pub mod transform {
    use resdb_core::FieldIndex;

    /// `position: Vec3`
    pub const POSITION: FieldIndex = 0;
    /// `scale: Float`, defaults to 1.0
    pub const SCALE: FieldIndex = 1;
}

/// Field indices of `SceneNode`.
pub mod node {
    use resdb_core::FieldIndex;

    /// `name: String`
    pub const NAME: FieldIndex = 0;
    /// `transform: SubObject<Transform>`
    pub const TRANSFORM: FieldIndex = 1;
    /// `children: SubObjectList<SceneNode>`
    pub const CHILDREN: FieldIndex = 2;
    /// `target: Reference<SceneNode>`
    pub const TARGET: FieldIndex = 3;
    /// `layer: Enum`
    pub const LAYER: FieldIndex = 4;
    /// `payload: Blob`
    pub const PAYLOAD: FieldIndex = 5;
}

/// Schemas registered by [`register_schemas`].
#[derive(Debug, Clone)]
pub struct TestSchemas {
    /// `Point`
    pub point: Arc<ResourceType>,
    /// `Transform`
    pub transform: Arc<ResourceType>,
    /// `SceneNode`
    pub scene_node: Arc<ResourceType>,
}

/// Registers the test schemas on `db`.
pub fn register_schemas(db: &Database) -> TestSchemas {
    let point = db
        .register_type(POINT, "Point")
        .field(point::X, "x", FieldKind::Float)
        .field(point::Y, "y", FieldKind::Float)
        .build()
        .expect("Failed to register Point");

    let transform = db
        .register_type(TRANSFORM, "Transform")
        .field(transform::POSITION, "position", FieldKind::Vec3)
        .field(transform::SCALE, "scale", FieldKind::Float)
        .default_value(transform::SCALE, 1.0)
        .build()
        .expect("Failed to register Transform");

    let scene_node = db
        .register_type(SCENE_NODE, "SceneNode")
        .field(node::NAME, "name", FieldKind::String)
        .relation(node::TRANSFORM, "transform", FieldKind::SubObject, TRANSFORM)
        .relation(node::CHILDREN, "children", FieldKind::SubObjectList, SCENE_NODE)
        .relation(node::TARGET, "target", FieldKind::Reference, SCENE_NODE)
        .enum_field(
            node::LAYER,
            "layer",
            EnumDef::new("Layer", [("Default", 0), ("Ui", 1), ("Effects", 2)]),
        )
        .field(node::PAYLOAD, "payload", FieldKind::Blob)
        .build()
        .expect("Failed to register SceneNode");

    TestSchemas {
        point,
        transform,
        scene_node,
    }
}

/// A test database with the test schemas registered.
pub struct TestDatabase {
    /// The database instance.
    pub db: Database,
    /// The registered schemas.
    pub schemas: TestSchemas,
}

impl TestDatabase {
    /// Creates a database with the default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates a database with the given configuration.
    pub fn with_config(config: Config) -> Self {
        let db = Database::new(config);
        let schemas = register_schemas(&db);
        Self { db, schemas }
    }
}

impl Default for TestDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// Runs a test with a fresh database that has the test schemas registered.
///
/// # Example
///
/// ```rust
/// use resdb_testkit::{with_temp_db, POINT};
///
/// with_temp_db(|db| {
///     let rid = db.create(POINT, None).unwrap();
///     assert!(db.has_value(rid));
/// });
/// ```
pub fn with_temp_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database) -> R,
{
    let test_db = TestDatabase::new();
    f(&test_db.db)
}

/// Installs a `tracing` subscriber for test output.
///
/// Honors `RUST_LOG`, defaulting to `warn`. Safe to call from every test.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Creates a `Point` and commits its coordinates.
pub fn make_point(db: &Database, x: f64, y: f64) -> Rid {
    let rid = db.create(POINT, None).expect("Failed to create Point");
    let mut writer = db.write(rid).expect("Failed to write Point");
    writer.set_float(point::X, x).set_float(point::Y, y);
    writer.commit(None).expect("Failed to commit Point");
    rid
}

/// Creates a named `SceneNode` with a `Transform` sub-object.
pub fn make_node(db: &Database, name: &str) -> Rid {
    let rid = db
        .create(SCENE_NODE, Some(resdb_core::Uuid::new_v4()))
        .expect("Failed to create SceneNode");
    let transform = db
        .create(TRANSFORM, Some(resdb_core::Uuid::new_v4()))
        .expect("Failed to create Transform");

    let mut writer = db.write(rid).expect("Failed to write SceneNode");
    writer
        .set_string(node::NAME, name)
        .set_sub_object(node::TRANSFORM, transform);
    writer.commit(None).expect("Failed to commit SceneNode");
    rid
}

/// Appends `child` to `parent`'s children.
pub fn add_child(db: &Database, parent: Rid, child: Rid) {
    let mut writer = db.write(parent).expect("Failed to write parent");
    writer.add_to_sub_object_list(node::CHILDREN, child);
    writer.commit(None).expect("Failed to commit parent");
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Builds a chain `root -> ... -> leaf` of `depth` nodes below the root,
    /// each owning the next through its children list.
    ///
    /// Returns every node, root first.
    pub fn node_chain(db: &Database, depth: usize) -> Vec<Rid> {
        let mut chain = vec![make_node(db, "root")];
        for level in 0..depth {
            let child = make_node(db, &format!("level{level}"));
            let parent = *chain.last().expect("chain is never empty");
            add_child(db, parent, child);
            chain.push(child);
        }
        chain
    }

    /// Builds a scene root with `count` children, the last of which
    /// references the first.
    pub fn scene(db: &Database, count: usize) -> (Rid, Vec<Rid>) {
        let root = make_node(db, "scene");
        let children: Vec<Rid> = (0..count)
            .map(|i| {
                let child = make_node(db, &format!("child{i}"));
                add_child(db, root, child);
                child
            })
            .collect();

        if let (Some(first), Some(last)) = (children.first(), children.last()) {
            let mut writer = db.write(*last).expect("Failed to write child");
            writer.set_reference(node::TARGET, *first);
            writer.commit(None).expect("Failed to commit child");
        }
        (root, children)
    }
}
