//! Undo and redo.

use crate::database::Database;
use crate::error::CoreResult;
use crate::instance::ResourceInstance;
use crate::transaction::UndoRedoScope;
use crate::types::Rid;
use std::sync::Arc;
use tracing::debug;

impl Database {
    /// Opens an empty undo/redo scope.
    pub fn create_scope(&self, name: impl Into<String>) -> UndoRedoScope {
        UndoRedoScope::new(name)
    }

    /// Restores every resource in `scope` to its state before the scope's
    /// first commit.
    ///
    /// Records are replayed newest first. Replays are published
    /// unconditionally and are not recorded anywhere.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseClosed` after shutdown.
    pub fn undo(&self, scope: &UndoRedoScope) -> CoreResult<()> {
        self.ensure_open()?;
        let records = scope.records();
        for record in records.iter().rev() {
            self.reapply(record.rid, record.before.clone());
        }
        self.stats.record_undo();
        debug!(scope = scope.name(), records = records.len(), "undo applied");
        Ok(())
    }

    /// Reapplies every commit in `scope`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseClosed` after shutdown.
    pub fn redo(&self, scope: &UndoRedoScope) -> CoreResult<()> {
        self.ensure_open()?;
        let records = scope.records();
        for record in &records {
            self.reapply(record.rid, record.after.clone());
        }
        self.stats.record_redo();
        debug!(scope = scope.name(), records = records.len(), "redo applied");
        Ok(())
    }

    fn reapply(&self, rid: Rid, snapshot: Option<Arc<ResourceInstance>>) {
        let Some(storage) = self.table.storage(rid) else {
            return;
        };
        match &snapshot {
            Some(instance) => self.table.add_to_type(instance.resource_type().id(), rid),
            None => {
                if let Some(ty) = storage.meta.read().ty.as_ref() {
                    self.table.remove_from_type(ty.id(), rid);
                }
            }
        }

        let old = storage.swap(snapshot.clone());
        if let Some(old) = &old {
            self.retire(Arc::clone(old));
        }
        self.after_publish(rid, storage, old.as_deref(), snapshot.as_deref());
    }
}

#[cfg(test)]
mod tests {
    use crate::object::FieldReader;
    use crate::schema::FieldKind;
    use crate::types::ResourceTypeId;
    use crate::Database;

    #[test]
    fn undo_then_redo() {
        let db = Database::init();
        let ty = db
            .register_type(ResourceTypeId::new(1), "Label")
            .field(0, "text", FieldKind::String)
            .build()
            .unwrap();
        let rid = db.create(ty.id(), None).unwrap();
        let mut writer = db.write(rid).unwrap();
        writer.set_string(0, "before");
        writer.commit(None).unwrap();

        let scope = db.create_scope("rename");
        for text in ["first", "second"] {
            let mut writer = db.write(rid).unwrap();
            writer.set_string(0, text);
            writer.commit(Some(&scope)).unwrap();
        }
        assert_eq!(scope.len(), 2);

        db.undo(&scope).unwrap();
        assert_eq!(db.read(rid).get_string(0).as_deref(), Some("before"));
        db.redo(&scope).unwrap();
        assert_eq!(db.read(rid).get_string(0).as_deref(), Some("second"));

        let stats = db.stats();
        assert_eq!(stats.undo_applied, 1);
        assert_eq!(stats.redo_applied, 1);
    }

    #[test]
    fn undoing_a_creation_clears_the_value() {
        let db = Database::init();
        let ty = db
            .register_type(ResourceTypeId::new(1), "Marker")
            .field(0, "on", FieldKind::Bool)
            .build()
            .unwrap();
        let scope = db.create_scope("add marker");
        let rid = db.create_in_scope(ty.id(), None, Some(&scope)).unwrap();

        db.undo(&scope).unwrap();
        assert!(!db.has_value(rid));
        assert!(db.resources_by_type(ty.id()).is_empty());

        db.redo(&scope).unwrap();
        assert!(db.has_value(rid));
        assert_eq!(db.resources_by_type(ty.id()), vec![rid]);
    }
}
