use std::sync::Arc;

use parking_lot::RwLock;

use crate::batch::BatchGuard;
use crate::containers::{link_invariant_err, unlink_child};
use crate::error::{MutagraphError, Result};
use crate::node::NodeMeta;
use crate::propagate;
use crate::types::{Key, ParentLink};
use crate::value::{RawId, Value};
use crate::wrap::{wrap_value, Seen};

/// List proxy: reads mirror a plain `Vec`; every mutation re-wraps inserted
/// children, unlinks displaced ones and notifies parents.
///
/// Clones share the same underlying node, so identity is preserved across
/// the graph (`same` is pointer equality).
#[derive(Clone, Debug)]
pub struct TrackedList {
    node: Arc<ListNode>,
}

#[derive(Debug)]
struct ListNode {
    meta: Arc<NodeMeta>,
    items: RwLock<Vec<Value>>,
}

impl TrackedList {
    pub(crate) fn new_empty() -> Self {
        Self {
            node: Arc::new(ListNode {
                meta: NodeMeta::new(),
                items: RwLock::new(Vec::new()),
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

    /// Live (owner token, key) links of this container.
    pub fn parent_links(&self) -> Vec<ParentLink> {
        self.node.meta.parent_links()
    }

    /// Open a suppression window on this container.
    pub fn batch(&self) -> BatchGuard {
        BatchGuard::enter(self.node.meta.clone())
    }

    pub fn len(&self) -> usize {
        self.node.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.node.items.read().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.node.items.read().get(index).cloned()
    }

    /// Snapshot of the current items.
    pub fn to_vec(&self) -> Vec<Value> {
        self.node.items.read().clone()
    }

    /// Append without wrapping or notifying; used by the wrapper while the
    /// container is still under construction.
    pub(crate) fn raw_push(&self, value: Value) {
        self.node.items.write().push(value);
    }

    pub fn push(&self, value: impl Into<Value>) -> Result<()> {
        {
            let mut items = self.node.items.write();
            let key = Key::Index(items.len());
            let wrapped =
                wrap_value(Some(&self.node.meta), value.into(), key, &mut Seen::default(), 0)?;
            items.push(wrapped);
        }
        propagate::emit(&self.node.meta);
        Ok(())
    }

    pub fn insert(&self, index: usize, value: impl Into<Value>) -> Result<()> {
        {
            let mut items = self.node.items.write();
            if index > items.len() {
                return Err(MutagraphError::IndexOutOfBounds {
                    index,
                    len: items.len(),
                });
            }
            let wrapped = wrap_value(
                Some(&self.node.meta),
                value.into(),
                Key::Index(index),
                &mut Seen::default(),
                0,
            )?;
            items.insert(index, wrapped);
            self.shift_links_right(&items, index);
        }
        propagate::emit(&self.node.meta);
        Ok(())
    }

    /// Replace the slot at `index`. Storing a value identical to the current
    /// one is a complete no-op, including notification.
    pub fn set(&self, index: usize, value: impl Into<Value>) -> Result<()> {
        let incoming = value.into();
        let key = Key::Index(index);
        let old;
        {
            let mut items = self.node.items.write();
            let len = items.len();
            let Some(slot) = items.get_mut(index) else {
                return Err(MutagraphError::IndexOutOfBounds { index, len });
            };
            if slot.same_identity(&incoming) {
                return Ok(());
            }
            old = slot.clone();
            let wrapped = wrap_value(
                Some(&self.node.meta),
                incoming,
                key.clone(),
                &mut Seen::default(),
                0,
            )?;
            *slot = wrapped;
        }
        let unlinked = unlink_child(&self.node.meta, &old, &key);
        propagate::emit(&self.node.meta);
        if !unlinked {
            return Err(link_invariant_err(&key));
        }
        Ok(())
    }

    pub fn remove(&self, index: usize) -> Result<Value> {
        let key = Key::Index(index);
        let old;
        let unlinked;
        {
            let mut items = self.node.items.write();
            if index >= items.len() {
                return Err(MutagraphError::IndexOutOfBounds {
                    index,
                    len: items.len(),
                });
            }
            old = items.remove(index);
            unlinked = unlink_child(&self.node.meta, &old, &key);
            self.shift_links_left(&items, index);
        }
        propagate::emit(&self.node.meta);
        if !unlinked {
            return Err(link_invariant_err(&key));
        }
        Ok(old)
    }

    pub fn pop(&self) -> Result<Option<Value>> {
        let len = self.len();
        if len == 0 {
            return Ok(None);
        }
        self.remove(len - 1).map(Some)
    }

    pub fn clear(&self) -> Result<()> {
        let old: Vec<Value> = {
            let mut items = self.node.items.write();
            items.drain(..).collect()
        };
        if old.is_empty() {
            return Ok(());
        }
        let mut all_unlinked = true;
        for (i, value) in old.iter().enumerate() {
            all_unlinked &= unlink_child(&self.node.meta, value, &Key::Index(i));
        }
        propagate::emit(&self.node.meta);
        if !all_unlinked {
            return Err(link_invariant_err(&Key::Index(0)));
        }
        Ok(())
    }

    pub fn extend<I>(&self, values: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let mut added = false;
        {
            let mut items = self.node.items.write();
            for value in values {
                let key = Key::Index(items.len());
                let wrapped =
                    wrap_value(Some(&self.node.meta), value.into(), key, &mut Seen::default(), 0)?;
                items.push(wrapped);
                added = true;
            }
        }
        if added {
            propagate::emit(&self.node.meta);
        }
        Ok(())
    }

    /// After inserting at `index`, children at index+1.. moved up one slot.
    /// Walk right-to-left so duplicate children keep every key they hold.
    fn shift_links_right(&self, items: &[Value], index: usize) {
        let token = self.node.meta.token().id();
        for i in (index + 1..items.len()).rev() {
            if let Some(meta) = items[i].node() {
                meta.unlink(token, &Key::Index(i - 1));
                meta.link(self.node.meta.token(), Key::Index(i));
            }
        }
    }

    /// After removing at `index`, children at index.. moved down one slot.
    fn shift_links_left(&self, items: &[Value], index: usize) {
        let token = self.node.meta.token().id();
        for (i, item) in items.iter().enumerate().skip(index) {
            if let Some(meta) = item.node() {
                meta.unlink(token, &Key::Index(i + 1));
                meta.link(self.node.meta.token(), Key::Index(i));
            }
        }
    }
}
