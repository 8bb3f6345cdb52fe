//! Resource graph serialization.
//!
//! A resource and its owned tree serialize to an array of node maps in
//! breadth-first order, root first. Each node carries:
//!
//! | key | value |
//! |---|---|
//! | `_uuid` | the node's UUID, assigned on demand |
//! | `_type` | type name |
//! | `_parent`, `_parentField` | owner UUID and owning field name (non-root nodes) |
//! | `_prototype` | prototype UUID, if the node has one |
//! | field name | the field's value, for every present field |
//!
//! Relational fields hold UUID strings. A reference to a RID that was never
//! handed out has no UUID to give and is written as null, which reads back
//! as an absent field or a skipped array entry. Enum fields hold their
//! symbolic name when the schema declares one. Opted-out prototype list
//! entries are not written.

use crate::database::Database;
use crate::error::{CoreError, CoreResult};
use crate::instance::ResourceInstance;
use crate::schema::{FieldDef, FieldKind, ResourceType};
use crate::types::{FieldIndex, Rid};
use crate::value::{Color, FieldValue, Quat, SubObjectList, Vec2, Vec3, Vec4};
use resdb_codec::{Decode, Encode, Value};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

const UUID_KEY: &str = "_uuid";
const TYPE_KEY: &str = "_type";
const PARENT_KEY: &str = "_parent";
const PARENT_FIELD_KEY: &str = "_parentField";
const PROTOTYPE_KEY: &str = "_prototype";

impl Database {
    /// Serializes `rid` and everything it owns.
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` if `rid` has no value.
    pub fn serialize(&self, rid: Rid) -> CoreResult<Value> {
        if !self.has_value(rid) {
            return Err(CoreError::resource_not_found(rid));
        }

        let mut nodes = Vec::new();
        let mut queue = VecDeque::from([(rid, None::<(Rid, FieldIndex)>)]);
        let mut visited = HashSet::new();
        while let Some((current, parent)) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            let Some(storage) = self.table.storage(current) else {
                continue;
            };
            let Some(snapshot) = storage.load() else {
                warn!(rid = %current, "skipping owned child without a value");
                continue;
            };

            let mut pairs = vec![
                (
                    Value::from(UUID_KEY),
                    Value::from(self.table.ensure_uuid(current, storage).to_string()),
                ),
                (
                    Value::from(TYPE_KEY),
                    Value::from(snapshot.resource_type().name()),
                ),
            ];
            if let Some((owner, field)) = parent {
                pairs.push((Value::from(PARENT_KEY), self.uuid_value(owner)));
                let name = owning_field_name(self, owner, field);
                pairs.push((Value::from(PARENT_FIELD_KEY), Value::from(name)));
            }
            let prototype = storage.meta.read().prototype;
            if let Some(prototype) = prototype {
                pairs.push((Value::from(PROTOTYPE_KEY), self.uuid_value(prototype)));
            }

            for (index, value) in snapshot.present_fields() {
                let Some(def) = snapshot.resource_type().field(index) else {
                    continue;
                };
                for child in value.owned_rids() {
                    queue.push_back((*child, Some((current, index))));
                }
                pairs.push((Value::from(def.name.as_str()), self.encode_field(def, value)));
            }
            nodes.push(Value::map(pairs));
        }

        debug!(%rid, nodes = nodes.len(), "serialized");
        Ok(Value::Array(nodes))
    }

    /// Serializes `rid` to canonical CBOR.
    ///
    /// # Errors
    ///
    /// Fails like [`serialize`](Self::serialize), or with `Codec` if a float
    /// field holds NaN.
    pub fn serialize_to_bytes(&self, rid: Rid) -> CoreResult<Vec<u8>> {
        Ok(self.serialize(rid)?.encode()?)
    }

    /// Rebuilds resources from [`serialize`](Self::serialize) output.
    ///
    /// Nodes whose UUID is already known overwrite that resource; an
    /// overwrite is published like a commit, so ownership, versions and
    /// listeners follow it. UUIDs that are referenced but not part of the
    /// input are reserved so they resolve once the target is loaded. Returns
    /// the first node's RID.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` for malformed nodes or values,
    /// `TypeNotFound` for unregistered type names, and `DatabaseClosed`
    /// after shutdown.
    pub fn deserialize(&self, value: &Value) -> CoreResult<Rid> {
        self.ensure_open()?;
        let nodes = value
            .as_array()
            .ok_or_else(|| CoreError::invalid_format("expected an array of nodes"))?;

        // Pass 1: identities and schemas, so forward references resolve.
        let mut resolved = Vec::with_capacity(nodes.len());
        for node in nodes {
            let uuid = parse_uuid(node.get(UUID_KEY), UUID_KEY)?;
            let type_name = node
                .get(TYPE_KEY)
                .and_then(Value::as_text)
                .ok_or_else(|| CoreError::invalid_format("node without _type"))?;
            let ty = self
                .types
                .find_by_name(type_name)
                .ok_or_else(|| CoreError::type_name_not_found(type_name))?;
            let rid = self.find_or_reserve_by_uuid(uuid)?;
            resolved.push((node, uuid, rid, ty));
        }

        // Pass 2: field values and prototype links.
        let mut built = Vec::with_capacity(resolved.len());
        for (node, uuid, rid, ty) in &resolved {
            let instance = self.decode_node(node, ty)?;
            let prototype = match node.get(PROTOTYPE_KEY) {
                Some(value) => {
                    let uuid = parse_uuid(Some(value), PROTOTYPE_KEY)?;
                    Some(self.find_or_reserve_by_uuid(uuid)?)
                }
                None => None,
            };
            built.push((*rid, *uuid, prototype, instance));
        }

        // Pass 3: publish, then attach children to their owners.
        let mut overwritten = Vec::new();
        for (rid, uuid, prototype, mut instance) in built {
            let storage = self.table.get_or_allocate_storage(rid, Some(uuid), &self.stats)?;
            {
                let mut meta = storage.meta.write();
                meta.ty = Some(Arc::clone(instance.resource_type()));
                meta.prototype = prototype;
            }
            if let Some(prototype) = prototype {
                self.table
                    .get_or_allocate_storage(prototype, None, &self.stats)?
                    .meta
                    .write()
                    .prototype_instances
                    .insert(rid);
            }

            instance.mark_read_only();
            let snapshot = Arc::new(instance);
            self.table.add_to_type(snapshot.resource_type().id(), rid);
            match storage.swap(Some(Arc::clone(&snapshot))) {
                Some(old) => {
                    self.stats.record_commit();
                    overwritten.push((rid, old, snapshot));
                }
                None => self.stats.record_created(),
            }
        }
        for (_, _, rid, _) in &resolved {
            let Some(snapshot) = self.table.storage(*rid).and_then(|s| s.load()) else {
                continue;
            };
            for (field, child) in snapshot.owned_children() {
                if let Some(storage) = self.table.storage(child) {
                    storage.meta.write().parent = Some((*rid, field));
                }
            }
        }
        for (rid, old, new) in overwritten {
            if let Some(storage) = self.table.storage(rid) {
                self.after_publish(rid, storage, Some(old.as_ref()), Some(new.as_ref()));
            }
            self.retire(old);
        }

        let (_, _, root, _) = resolved
            .first()
            .ok_or_else(|| CoreError::invalid_format("no nodes"))?;
        debug!(root = %root, nodes = resolved.len(), "deserialized");
        Ok(*root)
    }

    /// Rebuilds resources from [`serialize_to_bytes`](Self::serialize_to_bytes) output.
    ///
    /// # Errors
    ///
    /// Returns `Codec` for malformed CBOR, otherwise fails like
    /// [`deserialize`](Self::deserialize).
    pub fn deserialize_from_bytes(&self, bytes: &[u8]) -> CoreResult<Rid> {
        self.deserialize(&Value::decode(bytes)?)
    }

    fn uuid_value(&self, rid: Rid) -> Value {
        // An issued RID may not have storage yet; give it a slot so it can
        // carry a UUID.
        let storage = if self.table.was_issued(rid) {
            self.table
                .get_or_allocate_storage(rid, None, &self.stats)
                .inspect_err(|err| warn!(%rid, error = %err, "no storage for referenced resource"))
                .ok()
        } else {
            None
        };
        match storage {
            Some(storage) => Value::from(self.table.ensure_uuid(rid, storage).to_string()),
            None => {
                warn!(%rid, "reference to a resource that was never allocated");
                Value::Null
            }
        }
    }

    #[allow(clippy::cast_possible_wrap)]
    fn encode_field(&self, def: &FieldDef, value: &FieldValue) -> Value {
        let float = |v: f32| Value::Float(f64::from(v));
        let components = |names: &[&str], values: &[f32]| {
            Value::map(
                names
                    .iter()
                    .zip(values)
                    .map(|(name, v)| (Value::from(*name), float(*v)))
                    .collect(),
            )
        };
        match value {
            FieldValue::Bool(v) => Value::Bool(*v),
            FieldValue::Int(v) => Value::Integer(*v),
            FieldValue::UInt(v) => Value::Integer(*v as i64),
            FieldValue::Float(v) => Value::Float(*v),
            FieldValue::String(v) => Value::from(v.as_str()),
            FieldValue::Vec2(v) => components(&["x", "y"], &[v.x, v.y]),
            FieldValue::Vec3(v) => components(&["x", "y", "z"], &[v.x, v.y, v.z]),
            FieldValue::Vec4(v) => components(&["x", "y", "z", "w"], &[v.x, v.y, v.z, v.w]),
            FieldValue::Quat(v) => components(&["x", "y", "z", "w"], &[v.x, v.y, v.z, v.w]),
            FieldValue::Color(v) => components(
                &["red", "green", "blue", "alpha"],
                &[v.red, v.green, v.blue, v.alpha],
            ),
            FieldValue::Enum(v) => def
                .enum_def()
                .and_then(|e| e.name_of(*v))
                .map_or(Value::Integer(*v), Value::from),
            FieldValue::Blob(v) => Value::Bytes(v.clone()),
            FieldValue::Reference(rid) | FieldValue::SubObject(rid) => self.uuid_value(*rid),
            FieldValue::ReferenceArray(rids) => {
                Value::Array(rids.iter().map(|rid| self.uuid_value(*rid)).collect())
            }
            FieldValue::SubObjectList(list) => {
                Value::Array(list.items.iter().map(|rid| self.uuid_value(*rid)).collect())
            }
        }
    }

    fn decode_node(&self, node: &Value, ty: &Arc<ResourceType>) -> CoreResult<ResourceInstance> {
        let pairs = node
            .as_map()
            .ok_or_else(|| CoreError::invalid_format("node is not a map"))?;
        let mut instance = ResourceInstance::new(Arc::clone(ty));
        for (key, value) in pairs {
            let Some(name) = key.as_text() else {
                return Err(CoreError::invalid_format("node key is not a string"));
            };
            if name.starts_with('_') {
                continue;
            }
            let Some(def) = ty.field_by_name(name) else {
                warn!(ty = ty.name(), field = name, "dropping field unknown to the current schema");
                continue;
            };
            if value.is_null() && def.kind.is_relational() {
                continue;
            }
            let decoded = self.decode_field(def, value)?;
            instance.set(def.index, decoded);
        }
        Ok(instance)
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn decode_field(&self, def: &FieldDef, value: &Value) -> CoreResult<FieldValue> {
        let bad = || {
            CoreError::invalid_format(format!(
                "field {} does not hold a {:?} value",
                def.name, def.kind
            ))
        };
        let component = |name: &str| -> CoreResult<f32> {
            value
                .get(name)
                .and_then(Value::as_float)
                .map(|v| v as f32)
                .ok_or_else(bad)
        };
        let rid = |value: &Value| -> CoreResult<Rid> {
            self.find_or_reserve_by_uuid(parse_uuid(Some(value), &def.name)?)
        };
        let rids = |value: &Value| -> CoreResult<Vec<Rid>> {
            value
                .as_array()
                .ok_or_else(bad)?
                .iter()
                .filter(|entry| !entry.is_null())
                .map(rid)
                .collect()
        };

        Ok(match def.kind {
            FieldKind::Bool => FieldValue::Bool(value.as_bool().ok_or_else(bad)?),
            FieldKind::Int => FieldValue::Int(value.as_integer().ok_or_else(bad)?),
            FieldKind::UInt => FieldValue::UInt(value.as_integer().ok_or_else(bad)? as u64),
            FieldKind::Float => FieldValue::Float(value.as_float().ok_or_else(bad)?),
            FieldKind::String => FieldValue::String(value.as_text().ok_or_else(bad)?.to_string()),
            FieldKind::Vec2 => FieldValue::Vec2(Vec2 {
                x: component("x")?,
                y: component("y")?,
            }),
            FieldKind::Vec3 => FieldValue::Vec3(Vec3 {
                x: component("x")?,
                y: component("y")?,
                z: component("z")?,
            }),
            FieldKind::Vec4 => FieldValue::Vec4(Vec4 {
                x: component("x")?,
                y: component("y")?,
                z: component("z")?,
                w: component("w")?,
            }),
            FieldKind::Quat => FieldValue::Quat(Quat {
                x: component("x")?,
                y: component("y")?,
                z: component("z")?,
                w: component("w")?,
            }),
            FieldKind::Color => FieldValue::Color(Color {
                red: component("red")?,
                green: component("green")?,
                blue: component("blue")?,
                alpha: component("alpha")?,
            }),
            FieldKind::Enum => match value {
                Value::Integer(v) => FieldValue::Enum(*v),
                Value::Text(name) => FieldValue::Enum(
                    def.enum_def()
                        .and_then(|e| e.value_of(name))
                        .ok_or_else(bad)?,
                ),
                _ => return Err(bad()),
            },
            FieldKind::Blob => FieldValue::Blob(value.as_bytes().ok_or_else(bad)?.to_vec()),
            FieldKind::Reference => FieldValue::Reference(rid(value)?),
            FieldKind::ReferenceArray => FieldValue::ReferenceArray(rids(value)?),
            FieldKind::SubObject => FieldValue::SubObject(rid(value)?),
            FieldKind::SubObjectList => {
                FieldValue::SubObjectList(SubObjectList::from_items(rids(value)?))
            }
        })
    }
}

fn owning_field_name(db: &Database, owner: Rid, field: FieldIndex) -> String {
    db.table
        .storage(owner)
        .and_then(|s| s.load())
        .and_then(|i| i.resource_type().field(field).map(|def| def.name.clone()))
        .unwrap_or_else(|| field.to_string())
}

fn parse_uuid(value: Option<&Value>, what: &str) -> CoreResult<Uuid> {
    let text = value
        .and_then(Value::as_text)
        .ok_or_else(|| CoreError::invalid_format(format!("{what}: expected a UUID string")))?;
    Uuid::parse_str(text).map_err(|e| CoreError::invalid_format(format!("{what}: {e}")))
}

#[cfg(test)]
mod tests {
    use crate::object::FieldReader;
    use crate::schema::{EnumDef, FieldKind};
    use crate::types::ResourceTypeId;
    use crate::value::Vec3;
    use crate::{CoreError, Database};
    use resdb_codec::Value;

    fn light_db() -> Database {
        let db = Database::init();
        db.register_type(ResourceTypeId::new(1), "Light")
            .field(0, "position", FieldKind::Vec3)
            .enum_field(1, "kind", EnumDef::new("LightKind", [("Point", 0), ("Spot", 1)]))
            .field(2, "target", FieldKind::Reference)
            .build()
            .unwrap();
        db
    }

    #[test]
    fn node_shape() {
        let db = light_db();
        let rid = db.create(ResourceTypeId::new(1), None).unwrap();
        let mut writer = db.write(rid).unwrap();
        writer
            .set_vec3(0, Vec3 { x: 1.0, y: 2.0, z: 3.0 })
            .set_enum(1, 1);
        writer.commit(None).unwrap();

        let value = db.serialize(rid).unwrap();
        let nodes = value.as_array().unwrap();
        assert_eq!(nodes.len(), 1);
        let node = &nodes[0];
        assert_eq!(node.get("_type").and_then(Value::as_text), Some("Light"));
        assert_eq!(node.get("kind").and_then(Value::as_text), Some("Spot"));
        assert_eq!(
            node.get("position").and_then(|p| p.get("z")).and_then(Value::as_float),
            Some(3.0)
        );
        assert!(node.get("_parent").is_none());
        assert!(node.get("target").is_none());
        assert!(db.uuid_of(rid).is_some());
    }

    #[test]
    fn forward_reference_is_reserved() {
        let db = light_db();
        let target = uuid::Uuid::new_v4();
        let node = Value::map(vec![
            (Value::from("_uuid"), Value::from(uuid::Uuid::new_v4().to_string())),
            (Value::from("_type"), Value::from("Light")),
            (Value::from("target"), Value::from(target.to_string())),
        ]);

        let rid = db.deserialize(&Value::Array(vec![node])).unwrap();
        let reserved = db.find_by_uuid(&target).unwrap();
        assert_eq!(db.read(rid).get_reference(2), Some(reserved));
        assert!(!db.has_value(reserved));
    }

    #[test]
    fn unknown_type_and_bad_uuid_are_rejected() {
        let db = light_db();
        let unknown = Value::Array(vec![Value::map(vec![
            (Value::from("_uuid"), Value::from(uuid::Uuid::new_v4().to_string())),
            (Value::from("_type"), Value::from("Camera")),
        ])]);
        assert!(matches!(db.deserialize(&unknown), Err(CoreError::TypeNotFound { .. })));

        let bad_uuid = Value::Array(vec![Value::map(vec![
            (Value::from("_uuid"), Value::from("not-a-uuid")),
            (Value::from("_type"), Value::from("Light")),
        ])]);
        assert!(matches!(db.deserialize(&bad_uuid), Err(CoreError::InvalidFormat { .. })));
        assert!(matches!(
            db.deserialize(&Value::Array(vec![])),
            Err(CoreError::InvalidFormat { .. })
        ));
    }
}
