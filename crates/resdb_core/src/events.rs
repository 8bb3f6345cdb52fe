//! Change notification.
//!
//! Listeners run synchronously on the committing thread, after the new
//! snapshot is visible and versions are bumped. They see read-only views of
//! the snapshot that was replaced and the one that replaced it.
//!
//! ```rust,ignore
//! db.on_type_field_changed(point.id(), 0, |event| {
//!     let x = event.new.and_then(|view| view.get_float(0));
//!     println!("{} moved to x={x:?}", event.rid);
//! });
//! ```

use crate::instance::ResourceInstance;
use crate::object::InstanceView;
use crate::types::{FieldIndex, ResourceTypeId, Rid};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

/// A committed change to one resource.
#[derive(Clone, Copy)]
pub struct ChangeEvent<'a> {
    /// The resource that changed.
    pub rid: Rid,
    /// The snapshot that was replaced. `None` if the resource had no value.
    pub old: Option<InstanceView<'a>>,
    /// The snapshot now visible. `None` if the resource was destroyed or
    /// undone back to nothing.
    pub new: Option<InstanceView<'a>>,
}

/// Callback for [`ChangeEvent`]s.
pub type ChangeListener = Arc<dyn Fn(&ChangeEvent<'_>) + Send + Sync>;

/// Callback for version bumps, called with the resource and its new version.
pub type VersionListener = Arc<dyn Fn(Rid, u64) + Send + Sync>;

/// Change listeners, each optionally restricted to one field.
#[derive(Default)]
pub(crate) struct ListenerSet {
    entries: Vec<(Option<FieldIndex>, ChangeListener)>,
}

impl ListenerSet {
    pub(crate) fn push(&mut self, field: Option<FieldIndex>, listener: ChangeListener) {
        self.entries.push((field, listener));
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Listeners that want to hear about this change.
    ///
    /// A field listener is skipped when its field holds the same value on
    /// both sides.
    pub(crate) fn interested(
        &self,
        old: Option<&ResourceInstance>,
        new: Option<&ResourceInstance>,
    ) -> Vec<ChangeListener> {
        self.entries
            .iter()
            .filter(|(field, _)| field.map_or(true, |index| field_changed(index, old, new)))
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }
}

fn field_changed(
    index: FieldIndex,
    old: Option<&ResourceInstance>,
    new: Option<&ResourceInstance>,
) -> bool {
    old.and_then(|i| i.get(index)) != new.and_then(|i| i.get(index))
}

/// Listeners attached to a single storage slot.
#[derive(Default)]
pub(crate) struct StorageListeners {
    pub(crate) changes: ListenerSet,
    pub(crate) versions: Vec<VersionListener>,
}

/// Listeners attached to resource types.
#[derive(Default)]
pub(crate) struct EventRegistry {
    by_type: RwLock<HashMap<ResourceTypeId, ListenerSet>>,
}

impl EventRegistry {
    pub(crate) fn subscribe(
        &self,
        ty: ResourceTypeId,
        field: Option<FieldIndex>,
        listener: ChangeListener,
    ) {
        self.by_type.write().entry(ty).or_default().push(field, listener);
    }

    pub(crate) fn interested(
        &self,
        ty: ResourceTypeId,
        old: Option<&ResourceInstance>,
        new: Option<&ResourceInstance>,
    ) -> Vec<ChangeListener> {
        self.by_type
            .read()
            .get(&ty)
            .map(|set| set.interested(old, new))
            .unwrap_or_default()
    }
}

/// Calls each listener with one shared event.
pub(crate) fn notify(
    listeners: &[ChangeListener],
    rid: Rid,
    old: Option<&ResourceInstance>,
    new: Option<&ResourceInstance>,
) {
    if listeners.is_empty() {
        return;
    }
    trace!(%rid, listeners = listeners.len(), "dispatching change event");
    let event = ChangeEvent {
        rid,
        old: old.map(InstanceView::new),
        new: new.map(InstanceView::new),
    };
    for listener in listeners {
        listener(&event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDef, FieldKind, ResourceType, SubKind};
    use crate::value::FieldValue;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn pair() -> (ResourceInstance, ResourceInstance) {
        let fields = ["a", "b"]
            .iter()
            .zip(0..)
            .map(|(name, index)| FieldDef {
                index,
                name: (*name).to_string(),
                kind: FieldKind::Int,
                sub_kind: SubKind::None,
            })
            .collect();
        let ty = Arc::new(ResourceType::from_fields(ResourceTypeId::new(1), "Pair", fields));
        let mut old = ResourceInstance::new(Arc::clone(&ty));
        old.set(0, FieldValue::Int(1));
        old.set(1, FieldValue::Int(1));
        let mut new = old.clone();
        new.set(1, FieldValue::Int(2));
        (old, new)
    }

    #[test]
    fn field_listeners_only_hear_their_field() {
        let (old, new) = pair();
        let mut set = ListenerSet::default();
        set.push(None, Arc::new(|_: &ChangeEvent<'_>| {}));
        set.push(Some(0), Arc::new(|_: &ChangeEvent<'_>| {}));
        set.push(Some(1), Arc::new(|_: &ChangeEvent<'_>| {}));

        assert_eq!(set.len(), 3);
        assert_eq!(set.interested(Some(&old), Some(&new)).len(), 2);
        assert_eq!(set.interested(None, Some(&new)).len(), 3);
    }

    #[test]
    fn notify_passes_both_views() {
        let (old, new) = pair();
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        let listener: ChangeListener = Arc::new(move |event: &ChangeEvent<'_>| {
            assert!(event.old.is_some());
            assert!(event.new.is_some());
            seen.fetch_add(1, Ordering::SeqCst);
        });

        notify(&[listener], Rid::from_raw(1), Some(&old), Some(&new));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn type_registry_routes_by_type() {
        let (old, new) = pair();
        let registry = EventRegistry::default();
        registry.subscribe(ResourceTypeId::new(1), Some(1), Arc::new(|_: &ChangeEvent<'_>| {}));

        assert_eq!(registry.interested(ResourceTypeId::new(1), Some(&old), Some(&new)).len(), 1);
        assert!(registry.interested(ResourceTypeId::new(2), Some(&old), Some(&new)).is_empty());
    }
}
