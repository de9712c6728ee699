use std::sync::Arc;

use crate::node::NodeMeta;
use crate::propagate;

/// RAII suppression window coalescing many mutations into one notification.
///
/// Nested guards on the same node reference-count; the outermost drop emits
/// exactly one coalesced notification, and only if at least one mutation was
/// deferred inside the window. Restoration happens on every exit path,
/// including unwinds.
#[must_use = "dropping the guard immediately ends the batch scope"]
pub struct BatchGuard {
    node: Arc<NodeMeta>,
}

impl BatchGuard {
    pub(crate) fn enter(node: Arc<NodeMeta>) -> Self {
        node.begin_batch();
        Self { node }
    }
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        if let Some(keys) = self.node.end_batch() {
            propagate::flush(&self.node, keys);
        }
    }
}
