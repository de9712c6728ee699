use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::batch::BatchGuard;
use crate::node::NodeMeta;
use crate::propagate;
use crate::types::ParentLink;
use crate::value::{RawId, Scalar};

/// Set proxy over hashable atoms. Elements carry no tracking state, so set
/// operations never fail; a mutation that does not change membership is a
/// complete no-op.
#[derive(Clone, Debug)]
pub struct TrackedSet {
    node: Arc<SetNode>,
}

#[derive(Debug)]
struct SetNode {
    meta: Arc<NodeMeta>,
    elems: RwLock<BTreeSet<Scalar>>,
}

impl TrackedSet {
    pub(crate) fn new_empty() -> Self {
        Self::from_scalars(BTreeSet::new())
    }

    pub(crate) fn from_scalars(elems: BTreeSet<Scalar>) -> Self {
        Self {
            node: Arc::new(SetNode {
                meta: NodeMeta::new(),
                elems: RwLock::new(elems),
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
        self.node.elems.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.node.elems.read().is_empty()
    }

    pub fn contains(&self, elem: &Scalar) -> bool {
        self.node.elems.read().contains(elem)
    }

    /// Snapshot of the current elements.
    pub fn to_set(&self) -> BTreeSet<Scalar> {
        self.node.elems.read().clone()
    }

    /// Returns true when the element was newly added.
    pub fn insert(&self, elem: impl Into<Scalar>) -> bool {
        let added = self.node.elems.write().insert(elem.into());
        if added {
            propagate::emit(&self.node.meta);
        }
        added
    }

    /// Returns true when the element was present.
    pub fn remove(&self, elem: &Scalar) -> bool {
        let removed = self.node.elems.write().remove(elem);
        if removed {
            propagate::emit(&self.node.meta);
        }
        removed
    }

    pub fn clear(&self) {
        let was_empty = {
            let mut elems = self.node.elems.write();
            let empty = elems.is_empty();
            elems.clear();
            empty
        };
        if !was_empty {
            propagate::emit(&self.node.meta);
        }
    }

    pub fn extend<I>(&self, elems: I)
    where
        I: IntoIterator,
        I::Item: Into<Scalar>,
    {
        let mut added = false;
        {
            let mut set = self.node.elems.write();
            for elem in elems {
                added |= set.insert(elem.into());
            }
        }
        if added {
            propagate::emit(&self.node.meta);
        }
    }
}
