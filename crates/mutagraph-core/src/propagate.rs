use std::sync::Arc;

use rustc_hash::FxHashSet;
use tracing::{debug, warn};

use crate::node::NodeMeta;
use crate::types::{Key, NodeId, DEFAULT_MAX_PROPAGATION_DEPTH};

/// Boundary callback, invoked when a change reaches a node with no live
/// parents. The persistence collaborator implements this to mark its own
/// record dirty.
pub trait ChangeNotifier: Send + Sync {
    /// `keys` are the owner fields through which the change surfaced: a
    /// single key for an unbatched mutation, every distinct field touched
    /// inside the scope for a batch flush.
    fn notify(&self, keys: &[Key]);
}

/// Entry point for a mutation originating on `node`. Honors the node's own
/// batch suppression before fanning out to parents.
pub(crate) fn emit(node: &Arc<NodeMeta>) {
    if !node.mark_or_defer(None) {
        return;
    }
    if node.has_live_parents() {
        Propagation::default().fan_out(node, 0);
    } else if let Some(hook) = node.hook() {
        hook.notify(&[]);
    }
}

/// Entry point for a mutation that is already an arrival: a root owner field
/// changed at `key`.
pub(crate) fn emit_at(node: &Arc<NodeMeta>, key: &Key) {
    Propagation::default().arrive(node, key.clone(), 0);
}

/// Deliver a coalesced batch flush for `node`.
pub(crate) fn flush(node: &Arc<NodeMeta>, keys: Vec<Key>) {
    if node.has_live_parents() {
        Propagation::default().fan_out(node, 0);
    } else if let Some(hook) = node.hook() {
        hook.notify(&keys);
    }
}

/// One synchronous upward walk. Each node fans out to its parents at most
/// once per propagation (cycle tolerance), but arrivals are per (parent, key)
/// so a child reachable under several keys of one owner notifies each link.
#[derive(Default)]
struct Propagation {
    visited: FxHashSet<NodeId>,
}

impl Propagation {
    fn fan_out(&mut self, node: &Arc<NodeMeta>, depth: usize) {
        if depth > DEFAULT_MAX_PROPAGATION_DEPTH {
            warn!(
                node = %node.id(),
                depth,
                "propagation depth limit hit; graph nesting exceeds configuration"
            );
            return;
        }
        if !self.visited.insert(node.id()) {
            return;
        }
        for (token, keys) in node.live_parents() {
            let Some(parent) = token.node() else {
                // Token upgraded but its node is gone: treat as stale.
                debug!(node = %node.id(), "parent token outlived its node");
                continue;
            };
            for key in keys {
                self.arrive(&parent, key, depth + 1);
            }
        }
    }

    /// The change became visible on `node` at `key`. Suppressed nodes record
    /// the pending key and stop the branch; boundary nodes fire their hook.
    fn arrive(&mut self, node: &Arc<NodeMeta>, key: Key, depth: usize) {
        if depth > DEFAULT_MAX_PROPAGATION_DEPTH {
            warn!(
                node = %node.id(),
                depth,
                "propagation depth limit hit; graph nesting exceeds configuration"
            );
            return;
        }
        if !node.mark_or_defer(Some(&key)) {
            debug!(node = %node.id(), %key, "change deferred into open batch scope");
            return;
        }
        if node.has_live_parents() {
            self.fan_out(node, depth);
        } else if let Some(hook) = node.hook() {
            hook.notify(std::slice::from_ref(&key));
        }
    }
}
