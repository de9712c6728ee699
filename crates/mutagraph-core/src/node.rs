use std::cell::RefCell;
use std::sync::Arc;

use parking_lot::{ReentrantMutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;
use uuid::Uuid;

use crate::propagate::ChangeNotifier;
use crate::token::{OwnerToken, WeakToken};
use crate::types::{Key, NodeId, ParentLink, TokenId};

/// Per-node tracking metadata: identity, the node's own token, its slice of
/// the parent link registry, and the batch-suppression counter.
///
/// The link set and suppression counter sit behind a reentrant lock so a
/// thread that re-enters a node it already holds (self-referential graphs)
/// cannot deadlock against itself. Critical sections are short; propagation
/// never recurses while a node's lock is held.
pub(crate) struct NodeMeta {
    id: NodeId,
    token: OwnerToken,
    hook: RwLock<Option<Arc<dyn ChangeNotifier>>>,
    state: ReentrantMutex<RefCell<MetaState>>,
}

#[derive(Default)]
struct MetaState {
    parents: FxHashMap<TokenId, ParentEntry>,
    suppress_level: u32,
    pending: bool,
    pending_keys: FxHashSet<Key>,
}

struct ParentEntry {
    token: WeakToken,
    keys: FxHashSet<Key>,
}

impl NodeMeta {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            id: Uuid::new_v4(),
            token: OwnerToken::issue(weak.clone()),
            hook: RwLock::new(None),
            state: ReentrantMutex::new(RefCell::new(MetaState::default())),
        })
    }

    pub(crate) fn id(&self) -> NodeId {
        self.id
    }

    pub(crate) fn token(&self) -> &OwnerToken {
        &self.token
    }

    pub(crate) fn set_hook(&self, hook: Arc<dyn ChangeNotifier>) {
        *self.hook.write() = Some(hook);
    }

    pub(crate) fn hook(&self) -> Option<Arc<dyn ChangeNotifier>> {
        self.hook.read().clone()
    }

    /// Register this node as reachable from `parent` at `key`.
    /// Idempotent per (token, key).
    pub(crate) fn link(&self, parent: &OwnerToken, key: Key) {
        let guard = self.state.lock();
        let mut st = guard.borrow_mut();
        st.parents
            .entry(parent.id())
            .or_insert_with(|| ParentEntry {
                token: parent.downgrade(),
                keys: FxHashSet::default(),
            })
            .keys
            .insert(key);
    }

    /// Remove exactly the (token, key) link. Returns false when the link was
    /// absent; callers surface that as a bookkeeping violation.
    pub(crate) fn unlink(&self, parent: TokenId, key: &Key) -> bool {
        let guard = self.state.lock();
        let mut st = guard.borrow_mut();
        let Some(entry) = st.parents.get_mut(&parent) else {
            return false;
        };
        let removed = entry.keys.remove(key);
        if entry.keys.is_empty() {
            st.parents.remove(&parent);
        }
        removed
    }

    pub(crate) fn has_link(&self, parent: TokenId, key: &Key) -> bool {
        let guard = self.state.lock();
        let st = guard.borrow();
        st.parents
            .get(&parent)
            .map(|entry| entry.keys.contains(key))
            .unwrap_or(false)
    }

    /// Snapshot of the live parents. Links whose token has died are pruned in
    /// place and never yielded.
    pub(crate) fn live_parents(&self) -> Vec<(OwnerToken, Vec<Key>)> {
        let guard = self.state.lock();
        let mut st = guard.borrow_mut();
        let mut out = Vec::with_capacity(st.parents.len());
        st.parents.retain(|_, entry| match entry.token.upgrade() {
            Some(token) => {
                let mut keys: Vec<Key> = entry.keys.iter().cloned().collect();
                keys.sort();
                out.push((token, keys));
                true
            }
            None => {
                debug!(node = %self.id, "pruning link to dead owner token");
                false
            }
        });
        out
    }

    pub(crate) fn has_live_parents(&self) -> bool {
        !self.live_parents().is_empty()
    }

    /// Live links as (token, key) pairs, for observability and tests.
    pub(crate) fn parent_links(&self) -> Vec<ParentLink> {
        let mut out = Vec::new();
        for (token, keys) in self.live_parents() {
            for key in keys {
                out.push(ParentLink {
                    token: token.id(),
                    key,
                });
            }
        }
        out
    }

    pub(crate) fn begin_batch(&self) {
        let guard = self.state.lock();
        let mut st = guard.borrow_mut();
        st.suppress_level += 1;
    }

    /// Leave one batch level. Returns the pending keys when the outermost
    /// scope ends with at least one deferred change.
    pub(crate) fn end_batch(&self) -> Option<Vec<Key>> {
        let guard = self.state.lock();
        let mut st = guard.borrow_mut();
        st.suppress_level = st.suppress_level.saturating_sub(1);
        if st.suppress_level == 0 && st.pending {
            st.pending = false;
            let mut keys: Vec<Key> = st.pending_keys.drain().collect();
            keys.sort();
            Some(keys)
        } else {
            None
        }
    }

    /// True when the change should be emitted now; false when it was deferred
    /// into the currently open batch window.
    pub(crate) fn mark_or_defer(&self, key: Option<&Key>) -> bool {
        let guard = self.state.lock();
        let mut st = guard.borrow_mut();
        if st.suppress_level > 0 {
            st.pending = true;
            if let Some(key) = key {
                st.pending_keys.insert(key.clone());
            }
            false
        } else {
            true
        }
    }
}

impl std::fmt::Debug for NodeMeta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeMeta").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_is_idempotent_per_token_and_key() {
        let parent = NodeMeta::new();
        let child = NodeMeta::new();
        child.link(parent.token(), Key::name("a"));
        child.link(parent.token(), Key::name("a"));
        assert_eq!(child.parent_links().len(), 1);

        child.link(parent.token(), Key::name("b"));
        assert_eq!(child.parent_links().len(), 2);
    }

    #[test]
    fn unlink_removes_exactly_one_link() {
        let parent = NodeMeta::new();
        let child = NodeMeta::new();
        child.link(parent.token(), Key::name("a"));
        child.link(parent.token(), Key::name("b"));

        assert!(child.unlink(parent.token().id(), &Key::name("a")));
        assert!(!child.unlink(parent.token().id(), &Key::name("a")));
        assert_eq!(child.parent_links(), vec![ParentLink {
            token: parent.token().id(),
            key: Key::name("b"),
        }]);
    }

    #[test]
    fn dead_owner_links_are_pruned() {
        let child = NodeMeta::new();
        let parent = NodeMeta::new();
        child.link(parent.token(), Key::index(0));
        assert!(child.has_live_parents());

        drop(parent);
        assert!(!child.has_live_parents());
        assert!(child.parent_links().is_empty());
    }

    #[test]
    fn batch_levels_reference_count() {
        let node = NodeMeta::new();
        node.begin_batch();
        node.begin_batch();
        assert!(!node.mark_or_defer(Some(&Key::name("x"))));
        assert_eq!(node.end_batch(), None);
        let keys = node.end_batch().expect("outermost exit flushes");
        assert_eq!(keys, vec![Key::name("x")]);
    }

    #[test]
    fn empty_batch_flushes_nothing() {
        let node = NodeMeta::new();
        node.begin_batch();
        assert_eq!(node.end_batch(), None);
    }
}
