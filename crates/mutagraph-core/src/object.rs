use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::batch::BatchGuard;
use crate::containers::{link_invariant_err, unlink_child};
use crate::error::Result;
use crate::node::NodeMeta;
use crate::propagate::{self, ChangeNotifier};
use crate::snapshot::{export_fields, PlainValue};
use crate::types::{Key, NodeId, TokenId};
use crate::value::Value;
use crate::wrap::{wrap_value, Seen};

/// When nested structure gets converted to tracked form.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum WrapMode {
    /// Wrap the whole subtree when a field is assigned.
    #[default]
    Eager,
    /// Store assigned structure raw and wrap it on first access. Mutations
    /// through a not-yet-accessed subtree are not observed.
    Lazy,
}

/// Root owner of a tracked field map. Changes anywhere in the reachable graph
/// surface here through the boundary hook, labeled with the field they came
/// through.
pub struct TrackedObject {
    meta: Arc<NodeMeta>,
    fields: RwLock<BTreeMap<String, Value>>,
    mode: WrapMode,
}

impl TrackedObject {
    pub fn new(hook: Arc<dyn ChangeNotifier>) -> Self {
        Self::with_mode(hook, WrapMode::Eager)
    }

    pub fn with_mode(hook: Arc<dyn ChangeNotifier>, mode: WrapMode) -> Self {
        let meta = NodeMeta::new();
        meta.set_hook(hook);
        Self {
            meta,
            fields: RwLock::new(BTreeMap::new()),
            mode,
        }
    }

    /// Rebuild an object from a decoded snapshot without emitting any
    /// notification. Eager mode re-tracks every field up front; lazy mode
    /// leaves fields raw until first access.
    pub fn restore(
        hook: Arc<dyn ChangeNotifier>,
        snapshot: &BTreeMap<String, PlainValue>,
        mode: WrapMode,
    ) -> Result<Self> {
        let object = Self::with_mode(hook, mode);
        for (name, plain) in snapshot {
            object.inject(name.clone(), plain.to_raw());
        }
        if mode == WrapMode::Eager {
            object.restore_tracking()?;
        }
        Ok(object)
    }

    pub fn id(&self) -> NodeId {
        self.meta.id()
    }

    pub fn token_id(&self) -> TokenId {
        self.meta.token().id()
    }

    pub fn mode(&self) -> WrapMode {
        self.mode
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields.read().keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.read().contains_key(name)
    }

    /// Open a suppression window over this object's notifications.
    pub fn batch(&self) -> BatchGuard {
        BatchGuard::enter(self.meta.clone())
    }

    /// Assign a field. Assigning a value identical to the current one is a
    /// complete no-op. In eager mode the whole subtree is wrapped here; in
    /// lazy mode composites are stored raw and wrapped on first `get`.
    pub fn set(&self, name: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        let name = name.into();
        let incoming = value.into();
        let key = Key::Name(name.clone());
        let old;
        {
            let mut fields = self.fields.write();
            if let Some(existing) = fields.get(&name) {
                if existing.same_identity(&incoming) {
                    return Ok(());
                }
            }
            let stored = match self.mode {
                WrapMode::Eager => wrap_value(
                    Some(&self.meta),
                    incoming,
                    key.clone(),
                    &mut Seen::default(),
                    0,
                )?,
                WrapMode::Lazy => incoming,
            };
            old = fields.insert(name, stored);
        }
        let unlinked = match &old {
            Some(displaced) => unlink_child(&self.meta, displaced, &key),
            None => true,
        };
        propagate::emit_at(&self.meta, &key);
        if !unlinked {
            return Err(link_invariant_err(&key));
        }
        Ok(())
    }

    /// Read a field. Tracked children re-establish their link if it went
    /// missing; in lazy mode raw composites are wrapped here, on first access.
    pub fn get(&self, name: &str) -> Option<Value> {
        let key = Key::Name(name.to_string());
        let value = self.fields.read().get(name).cloned()?;
        if let Some(meta) = value.node() {
            if !meta.has_link(self.meta.token().id(), &key) {
                debug!(field = %name, "re-establishing missing owner link on access");
                meta.link(self.meta.token(), key);
            }
            return Some(value);
        }
        if !value.is_raw_composite() {
            return Some(value);
        }

        let mut fields = self.fields.write();
        // Another thread may have wrapped this field since the read above.
        let current = fields.get(name)?.clone();
        if !current.is_raw_composite() {
            return Some(current);
        }
        match wrap_value(Some(&self.meta), current.clone(), key, &mut Seen::default(), 0) {
            Ok(wrapped) => {
                fields.insert(name.to_string(), wrapped.clone());
                Some(wrapped)
            }
            Err(err) => {
                warn!(field = %name, %err, "cannot track field; serving it untracked");
                Some(current)
            }
        }
    }

    /// Remove a field. Absent fields are a quiet no-op.
    pub fn remove(&self, name: &str) -> Result<Option<Value>> {
        let Some(old) = self.fields.write().remove(name) else {
            return Ok(None);
        };
        let key = Key::Name(name.to_string());
        let unlinked = unlink_child(&self.meta, &old, &key);
        propagate::emit_at(&self.meta, &key);
        if !unlinked {
            return Err(link_invariant_err(&key));
        }
        Ok(Some(old))
    }

    /// Store a field without wrapping or notifying. Restoration path only;
    /// callers follow up with `restore_tracking`.
    pub fn inject(&self, name: String, value: Value) {
        self.fields.write().insert(name, value);
    }

    /// Wrap every raw composite field in place, silently. One memo spans all
    /// fields so structure shared between fields stays shared.
    pub fn restore_tracking(&self) -> Result<()> {
        let mut fields = self.fields.write();
        let mut seen = Seen::default();
        for (name, value) in fields.iter_mut() {
            if value.is_atomic() || value.is_tracked() {
                continue;
            }
            let wrapped = wrap_value(
                Some(&self.meta),
                value.clone(),
                Key::Name(name.clone()),
                &mut seen,
                0,
            )?;
            *value = wrapped;
        }
        Ok(())
    }

    /// Detached snapshot of every field, ready for a persistence binding.
    pub fn export(&self) -> Result<BTreeMap<String, PlainValue>> {
        let fields = self.fields.read().clone();
        export_fields(&fields)
    }

}

impl std::fmt::Debug for TrackedObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackedObject")
            .field("id", &self.meta.id())
            .field("mode", &self.mode)
            .field("fields", &self.field_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<Vec<Key>>>,
    }

    impl ChangeNotifier for Recorder {
        fn notify(&self, keys: &[Key]) {
            self.calls.lock().push(keys.to_vec());
        }
    }

    impl Recorder {
        fn take(&self) -> Vec<Vec<Key>> {
            std::mem::take(&mut self.calls.lock())
        }
    }

    fn eager() -> (TrackedObject, Arc<Recorder>) {
        let hook = Arc::new(Recorder::default());
        (TrackedObject::new(hook.clone()), hook)
    }

    fn lazy() -> (TrackedObject, Arc<Recorder>) {
        let hook = Arc::new(Recorder::default());
        (TrackedObject::with_mode(hook.clone(), WrapMode::Lazy), hook)
    }

    #[test]
    fn field_assignment_notifies_with_the_field_key() {
        let (obj, hook) = eager();
        obj.set("count", 1).unwrap();
        assert_eq!(hook.take(), vec![vec![Key::name("count")]]);
    }

    #[test]
    fn identical_reassignment_is_silent() {
        let (obj, hook) = eager();
        obj.set("count", 1).unwrap();
        hook.take();

        obj.set("count", 1).unwrap();
        assert!(hook.take().is_empty());
    }

    #[test]
    fn nested_mutation_surfaces_through_the_field() {
        let (obj, hook) = eager();
        obj.set("items", Value::list(vec![])).unwrap();
        hook.take();

        let items = obj.get("items").unwrap().as_list().unwrap();
        items.push(1).unwrap();
        assert_eq!(hook.take(), vec![vec![Key::name("items")]]);
    }

    #[test]
    fn replaced_subtree_goes_silent() {
        let (obj, hook) = eager();
        obj.set("items", Value::list(vec![])).unwrap();
        let orphan = obj.get("items").unwrap().as_list().unwrap();
        obj.set("items", Value::list(vec![])).unwrap();
        hook.take();

        orphan.push(1).unwrap();
        assert!(hook.take().is_empty());
    }

    #[test]
    fn lazy_fields_stay_raw_until_accessed() {
        let (obj, _hook) = lazy();
        obj.set("items", Value::list(vec![Value::from(1)])).unwrap();
        {
            let fields = obj.fields.read();
            assert!(fields.get("items").unwrap().is_raw_composite());
        }

        let items = obj.get("items").unwrap().as_list().unwrap();
        assert_eq!(items.len(), 1);
        {
            let fields = obj.fields.read();
            assert!(fields.get("items").unwrap().is_tracked());
        }
    }

    #[test]
    fn lazy_access_heals_a_missing_link() {
        let (obj, hook) = lazy();
        obj.set("items", Value::list(vec![])).unwrap();
        let items = obj.get("items").unwrap().as_list().unwrap();
        items
            .meta()
            .unlink(obj.token_id(), &Key::name("items"));

        let again = obj.get("items").unwrap().as_list().unwrap();
        assert!(again.same(&items));
        hook.take();
        again.push(1).unwrap();
        assert_eq!(hook.take(), vec![vec![Key::name("items")]]);
    }

    #[test]
    fn remove_detaches_the_subtree() {
        let (obj, hook) = eager();
        obj.set("items", Value::list(vec![])).unwrap();
        let items = obj.get("items").unwrap().as_list().unwrap();
        obj.remove("items").unwrap();
        assert!(!obj.contains("items"));
        hook.take();

        items.push(1).unwrap();
        assert!(hook.take().is_empty());
    }

    #[test]
    fn batch_coalesces_field_writes() {
        let (obj, hook) = eager();
        {
            let _scope = obj.batch();
            obj.set("a", 1).unwrap();
            obj.set("b", 2).unwrap();
            obj.set("a", 3).unwrap();
            assert!(hook.calls.lock().is_empty());
        }
        assert_eq!(hook.take(), vec![vec![Key::name("a"), Key::name("b")]]);
    }

    #[test]
    fn empty_batch_is_silent() {
        let (obj, hook) = eager();
        {
            let _scope = obj.batch();
        }
        assert!(hook.take().is_empty());
    }

    #[test]
    fn restore_round_trip_keeps_tracking_alive() {
        let (obj, _hook) = eager();
        obj.set("name", "graph").unwrap();
        obj.set("items", Value::list(vec![Value::from(1)])).unwrap();
        let snapshot = obj.export().unwrap();

        let hook = Arc::new(Recorder::default());
        let restored =
            TrackedObject::restore(hook.clone(), &snapshot, WrapMode::Eager).unwrap();
        assert!(hook.take().is_empty());
        assert_eq!(restored.get("name").unwrap().as_str(), Some("graph"));

        let items = restored.get("items").unwrap().as_list().unwrap();
        items.push(2).unwrap();
        assert_eq!(hook.take(), vec![vec![Key::name("items")]]);
    }

    #[test]
    fn lazy_restore_defers_wrapping_to_first_access() {
        let (obj, _hook) = eager();
        obj.set("items", Value::list(vec![Value::from(1)])).unwrap();
        let snapshot = obj.export().unwrap();

        let hook = Arc::new(Recorder::default());
        let restored =
            TrackedObject::restore(hook.clone(), &snapshot, WrapMode::Lazy).unwrap();
        {
            let fields = restored.fields.read();
            assert!(fields.get("items").unwrap().is_raw_composite());
        }

        let items = restored.get("items").unwrap().as_list().unwrap();
        items.push(2).unwrap();
        assert_eq!(hook.take(), vec![vec![Key::name("items")]]);
    }

    #[test]
    fn shared_structure_survives_restore_tracking() {
        let (obj, _hook) = eager();
        let shared = Value::list(vec![Value::from(1)]);
        obj.inject("a".to_string(), shared.clone());
        obj.inject("b".to_string(), shared);
        obj.restore_tracking().unwrap();

        let a = obj.get("a").unwrap().as_list().unwrap();
        let b = obj.get("b").unwrap().as_list().unwrap();
        assert!(a.same(&b));
    }
}
