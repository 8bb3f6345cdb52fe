//! Serialization of resource trees.

use resdb_codec::Value;
use resdb_core::{CoreError, Database, FieldReader, Rid};
use resdb_testkit::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn decorate(db: &Database, rid: Rid) {
    let mut writer = db.write(rid).unwrap();
    writer
        .set_enum_name(node::LAYER, "Effects")
        .set_blob(node::PAYLOAD, vec![1, 2, 3]);
    writer.commit(None).unwrap();
}

#[test]
fn nodes_are_written_breadth_first() {
    with_temp_db(|db| {
        let (root, _) = scenarios::scene(db, 2);
        let value = db.serialize(root).unwrap();
        let nodes = value.as_array().unwrap();

        // root, its transform, two children, then their transforms
        assert_eq!(nodes.len(), 6);
        let root_uuid = db.uuid_of(root).unwrap().to_string();
        assert_eq!(nodes[0].get("_uuid").and_then(Value::as_text), Some(root_uuid.as_str()));
        assert_eq!(nodes[0].get("_type").and_then(Value::as_text), Some("SceneNode"));
        assert!(nodes[0].get("_parent").is_none());

        assert_eq!(nodes[1].get("_type").and_then(Value::as_text), Some("Transform"));
        assert_eq!(nodes[1].get("_parent").and_then(Value::as_text), Some(root_uuid.as_str()));
        assert_eq!(nodes[1].get("_parentField").and_then(Value::as_text), Some("transform"));
        assert_eq!(nodes[2].get("_parentField").and_then(Value::as_text), Some("children"));
        assert_eq!(nodes[2].get("name").and_then(Value::as_text), Some("child0"));
    });
}

#[test]
fn tree_survives_a_trip_to_another_database() {
    init_tracing();
    let source = TestDatabase::new();
    let (root, children) = scenarios::scene(&source, 3);
    decorate(&source, children[1]);
    let bytes = source.serialize_to_bytes(root).unwrap();

    let target = TestDatabase::new();
    let loaded = target.deserialize_from_bytes(&bytes).unwrap();
    assert_eq!(target.uuid_of(loaded), source.uuid_of(root));
    assert_eq!(target.read(loaded).get_string(node::NAME).as_deref(), Some("scene"));

    let loaded_children = target.read(loaded).get_sub_object_list(node::CHILDREN).unwrap();
    assert_eq!(loaded_children.len(), 3);
    for (original, copy) in children.iter().zip(&loaded_children) {
        assert_eq!(target.uuid_of(*copy), source.uuid_of(*original));
        assert_eq!(target.parent_of(*copy), Some((loaded, node::CHILDREN)));
        assert_eq!(
            target.read(*copy).get_string(node::NAME),
            source.read(*original).get_string(node::NAME)
        );
    }

    let decorated = target.read(loaded_children[1]);
    assert_eq!(decorated.get_enum_name(node::LAYER).as_deref(), Some("Effects"));
    assert_eq!(decorated.get_blob(node::PAYLOAD), Some(vec![1, 2, 3]));
    assert_eq!(
        target.read(loaded_children[2]).get_reference(node::TARGET),
        Some(loaded_children[0])
    );

    let transform = target.read(loaded).get_sub_object(node::TRANSFORM).unwrap();
    assert_eq!(target.read(transform).get_float(transform::SCALE), Some(1.0));
    assert_eq!(target.parent_of(transform), Some((loaded, node::TRANSFORM)));
    assert_eq!(target.resources_by_type(SCENE_NODE).len(), 4);
}

#[test]
fn encoding_is_deterministic() {
    with_temp_db(|db| {
        let (root, _) = scenarios::scene(db, 2);
        let first = db.serialize_to_bytes(root).unwrap();
        let second = db.serialize_to_bytes(root).unwrap();
        assert_eq!(first, second);
    });
}

#[test]
fn serializing_assigns_missing_uuids() {
    with_temp_db(|db| {
        let rid = make_point(db, 3.0, 4.0);
        assert_eq!(db.uuid_of(rid), None);
        db.serialize(rid).unwrap();
        let uuid = db.uuid_of(rid).unwrap();
        assert_eq!(db.find_by_uuid(&uuid), Some(rid));
    });
}

#[test]
fn known_uuids_are_overwritten_in_place() {
    with_temp_db(|db| {
        let rid = make_node(db, "before");
        let saved = db.serialize(rid).unwrap();

        let mut writer = db.write(rid).unwrap();
        writer.set_string(node::NAME, "after");
        writer.commit(None).unwrap();
        let dropped = make_node(db, "dropped");
        add_child(db, rid, dropped);
        assert!(db.is_parent_of(rid, dropped));

        let changes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&changes);
        db.on_resource_changed(rid, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        let version = db.version(rid);

        assert_eq!(db.deserialize(&saved).unwrap(), rid);
        assert_eq!(db.read(rid).get_string(node::NAME).as_deref(), Some("before"));
        assert_eq!(db.read(rid).get_sub_object_list(node::CHILDREN).unwrap_or_default(), vec![]);
        assert_eq!(changes.load(Ordering::SeqCst), 1);
        assert!(db.version(rid) > version);

        // the child left behind no longer reports to its old owner
        assert_eq!(db.parent_of(dropped), None);
        assert!(!db.is_parent_of(rid, dropped));
        let version = db.version(rid);
        let mut writer = db.write(dropped).unwrap();
        writer.set_string(node::NAME, "orphan");
        writer.commit(None).unwrap();
        assert_eq!(db.version(rid), version);
    });
}

#[test]
fn dangling_references_survive_a_round_trip() {
    let source = TestDatabase::new();
    let issued = source.get_or_create_id(None);
    let pointing = make_node(&source, "pointing");
    let mut writer = source.write(pointing).unwrap();
    writer.set_reference(node::TARGET, issued);
    writer.commit(None).unwrap();
    let lost = make_node(&source, "lost");
    let mut writer = source.write(lost).unwrap();
    writer.set_reference(node::TARGET, Rid::from_raw(1_000_000));
    writer.commit(None).unwrap();

    let target = TestDatabase::new();
    let bytes = source.serialize_to_bytes(pointing).unwrap();
    let loaded = target.deserialize_from_bytes(&bytes).unwrap();
    let reserved = target.read(loaded).get_reference(node::TARGET).unwrap();
    assert!(!target.has_value(reserved));
    assert_eq!(target.uuid_of(reserved), source.uuid_of(issued));

    let bytes = source.serialize_to_bytes(lost).unwrap();
    let loaded = target.deserialize_from_bytes(&bytes).unwrap();
    assert_eq!(target.read(loaded).get_string(node::NAME).as_deref(), Some("lost"));
    assert_eq!(target.read(loaded).get_reference(node::TARGET), None);
}

#[test]
fn prototype_links_are_reserved_until_loaded() {
    let source = TestDatabase::new();
    let prototype = make_node(&source, "prototype");
    let instance = source.create_from_prototype(prototype, None, None).unwrap();
    let saved = source.serialize(instance).unwrap();

    let target = TestDatabase::new();
    let loaded = target.deserialize(&saved).unwrap();
    let reserved = target.prototype_of(loaded).unwrap();
    assert_eq!(target.uuid_of(reserved), source.uuid_of(prototype));
    assert!(!target.has_value(reserved));

    let prototype_saved = source.serialize(prototype).unwrap();
    assert_eq!(target.deserialize(&prototype_saved).unwrap(), reserved);
    assert!(target.has_value(reserved));
    assert_eq!(target.prototype_instances(reserved), vec![loaded]);
}

#[test]
fn unknown_type_names_are_rejected() {
    with_temp_db(|db| {
        let node = Value::map(vec![
            (Value::from("_uuid"), Value::from(resdb_core::Uuid::new_v4().to_string())),
            (Value::from("_type"), Value::from("Spaceship")),
        ]);
        let result = db.deserialize(&Value::Array(vec![node]));
        assert!(matches!(result, Err(CoreError::TypeNotFound { .. })));
    });
}

#[test]
fn malformed_input_is_rejected() {
    with_temp_db(|db| {
        assert!(matches!(
            db.deserialize(&Value::from("not a graph")),
            Err(CoreError::InvalidFormat { .. })
        ));
        let missing_uuid = Value::map(vec![(Value::from("_type"), Value::from("Point"))]);
        assert!(db.deserialize(&Value::Array(vec![missing_uuid])).is_err());
        assert!(matches!(
            db.deserialize(&Value::Array(vec![])),
            Err(CoreError::InvalidFormat { .. })
        ));
        assert!(matches!(
            db.deserialize_from_bytes(&[0xff, 0x00]),
            Err(CoreError::Codec(_))
        ));
    });
}
