use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::batch::BatchGuard;
use crate::containers::{link_invariant_err, unlink_child};
use crate::error::Result;
use crate::node::NodeMeta;
use crate::propagate;
use crate::types::{Key, ParentLink};
use crate::value::{RawId, Value};
use crate::wrap::{wrap_value, Seen};

/// String-keyed map proxy. Entries are kept ordered so snapshots and
/// notifications are deterministic.
#[derive(Clone, Debug)]
pub struct TrackedMap {
    node: Arc<MapNode>,
}

#[derive(Debug)]
struct MapNode {
    meta: Arc<NodeMeta>,
    entries: RwLock<BTreeMap<String, Value>>,
}

impl TrackedMap {
    pub(crate) fn new_empty() -> Self {
        Self {
            node: Arc::new(MapNode {
                meta: NodeMeta::new(),
                entries: RwLock::new(BTreeMap::new()),
            }),
        }
    }

    pub fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }

    pub(crate) fn meta(&self) -> &Arc<NodeMeta> {
        &self.node.meta
    }

    pub(crate) fn raw_id(&self) -> RawId {
        Arc::as_ptr(&self.node) as RawId
    }

    pub fn parent_links(&self) -> Vec<ParentLink> {
        self.node.meta.parent_links()
    }

    /// Open a suppression window on this container.
    pub fn batch(&self) -> BatchGuard {
        BatchGuard::enter(self.node.meta.clone())
    }

    pub fn len(&self) -> usize {
        self.node.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.node.entries.read().is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.node.entries.read().contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.node.entries.read().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.node.entries.read().keys().cloned().collect()
    }

    /// Snapshot of the current entries.
    pub fn to_map(&self) -> BTreeMap<String, Value> {
        self.node.entries.read().clone()
    }

    /// Insert without wrapping or notifying; used by the wrapper while the
    /// container is still under construction.
    pub(crate) fn raw_insert(&self, key: String, value: Value) {
        self.node.entries.write().insert(key, value);
    }

    /// Insert or replace an entry. Replacing an entry with an identical value
    /// is a complete no-op, including notification.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) -> Result<Option<Value>> {
        let key = key.into();
        let incoming = value.into();
        let link_key = Key::Name(key.clone());
        let old;
        {
            let mut entries = self.node.entries.write();
            if let Some(existing) = entries.get(&key) {
                if existing.same_identity(&incoming) {
                    return Ok(Some(existing.clone()));
                }
            }
            let wrapped = wrap_value(
                Some(&self.node.meta),
                incoming,
                link_key.clone(),
                &mut Seen::default(),
                0,
            )?;
            old = entries.insert(key, wrapped);
        }
        let unlinked = match &old {
            Some(displaced) => unlink_child(&self.node.meta, displaced, &link_key),
            None => true,
        };
        propagate::emit(&self.node.meta);
        if !unlinked {
            return Err(link_invariant_err(&link_key));
        }
        Ok(old)
    }

    /// Remove an entry. Absent keys are a quiet no-op.
    pub fn remove(&self, key: &str) -> Result<Option<Value>> {
        let old = self.node.entries.write().remove(key);
        let Some(displaced) = old else {
            return Ok(None);
        };
        let link_key = Key::Name(key.to_string());
        let unlinked = unlink_child(&self.node.meta, &displaced, &link_key);
        propagate::emit(&self.node.meta);
        if !unlinked {
            return Err(link_invariant_err(&link_key));
        }
        Ok(Some(displaced))
    }

    pub fn clear(&self) -> Result<()> {
        let old = {
            let mut entries = self.node.entries.write();
            std::mem::take(&mut *entries)
        };
        if old.is_empty() {
            return Ok(());
        }
        let mut failed = None;
        for (name, value) in &old {
            let link_key = Key::Name(name.clone());
            if !unlink_child(&self.node.meta, value, &link_key) {
                failed.get_or_insert(link_key);
            }
        }
        propagate::emit(&self.node.meta);
        match failed {
            Some(key) => Err(link_invariant_err(&key)),
            None => Ok(()),
        }
    }

    pub fn extend<I, K, V>(&self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let scope = self.batch();
        for (key, value) in entries {
            self.insert(key, value)?;
        }
        drop(scope);
        Ok(())
    }
}
