use std::sync::Arc;

use tracing::error;

use crate::error::MutagraphError;
use crate::node::NodeMeta;
use crate::types::Key;
use crate::value::Value;

mod list;
mod map;
mod set;

pub use list::TrackedList;
pub use map::TrackedMap;
pub use set::TrackedSet;

/// Drop the (container, key) link of a displaced child. Atoms and raw values
/// carry no links and always succeed. A missing link on a tracked child is a
/// bookkeeping violation: it is logged here and surfaced by the caller, but
/// never blocks the mutation itself.
pub(crate) fn unlink_child(parent: &Arc<NodeMeta>, child: &Value, key: &Key) -> bool {
    match child.node() {
        Some(meta) => {
            let ok = meta.unlink(parent.token().id(), key);
            if !ok {
                error!(%key, "missing parent link while unlinking displaced child");
            }
            ok
        }
        None => true,
    }
}

pub(crate) fn link_invariant_err(key: &Key) -> MutagraphError {
    MutagraphError::LinkInvariant {
        key: key.clone(),
        reason: "displaced child had no link to this container".to_string(),
    }
}
