use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::trace;

use crate::containers::{TrackedList, TrackedMap, TrackedSet};
use crate::error::{MutagraphError, Result};
use crate::node::NodeMeta;
use crate::types::{Key, DEFAULT_MAX_NESTING_DEPTH};
use crate::value::{RawId, Value};

/// Wrapping memo keyed by allocation identity. Shared raw structure wraps to
/// a single tracked instance; cyclic structure terminates because a composite
/// is recorded here before its children are visited.
pub(crate) type Seen = FxHashMap<RawId, Value>;

/// Recursively convert a value into its tracked form and link it under
/// `parent` at `key`.
///
/// Atoms pass through untouched. Already-tracked composites are not re-wrapped,
/// only linked, so moving a tracked subtree between owners preserves identity.
/// Foreign values stay opaque and unlinked.
pub(crate) fn wrap_value(
    parent: Option<&Arc<NodeMeta>>,
    value: Value,
    key: Key,
    seen: &mut Seen,
    depth: usize,
) -> Result<Value> {
    if value.is_atomic() {
        return Ok(value);
    }
    if depth >= DEFAULT_MAX_NESTING_DEPTH {
        return Err(MutagraphError::NestingTooDeep {
            depth,
            limit: DEFAULT_MAX_NESTING_DEPTH,
        });
    }
    match value {
        Value::Foreign(f) => {
            trace!(%key, "opaque value passes through wrapping untracked");
            Ok(Value::Foreign(f))
        }
        Value::List(list) => {
            link(parent, list.meta(), &key);
            Ok(Value::List(list))
        }
        Value::Map(map) => {
            link(parent, map.meta(), &key);
            Ok(Value::Map(map))
        }
        Value::Set(set) => {
            link(parent, set.meta(), &key);
            Ok(Value::Set(set))
        }
        Value::RawList(cell) => {
            if let Some(existing) = seen.get(&cell.raw_id()) {
                let existing = existing.clone();
                if let Some(meta) = existing.node() {
                    link(parent, &meta, &key);
                }
                return Ok(existing);
            }
            let tracked = TrackedList::new_empty();
            seen.insert(cell.raw_id(), Value::List(tracked.clone()));
            let items = cell.read().clone();
            for (i, item) in items.into_iter().enumerate() {
                let wrapped = wrap_value(Some(tracked.meta()), item, Key::Index(i), seen, depth + 1)?;
                tracked.raw_push(wrapped);
            }
            link(parent, tracked.meta(), &key);
            Ok(Value::List(tracked))
        }
        Value::RawMap(cell) => {
            if let Some(existing) = seen.get(&cell.raw_id()) {
                let existing = existing.clone();
                if let Some(meta) = existing.node() {
                    link(parent, &meta, &key);
                }
                return Ok(existing);
            }
            let tracked = TrackedMap::new_empty();
            seen.insert(cell.raw_id(), Value::Map(tracked.clone()));
            let entries = cell.read().clone();
            for (name, entry) in entries {
                let wrapped = wrap_value(
                    Some(tracked.meta()),
                    entry,
                    Key::Name(name.clone()),
                    seen,
                    depth + 1,
                )?;
                tracked.raw_insert(name, wrapped);
            }
            link(parent, tracked.meta(), &key);
            Ok(Value::Map(tracked))
        }
        Value::RawSet(cell) => {
            if let Some(existing) = seen.get(&cell.raw_id()) {
                let existing = existing.clone();
                if let Some(meta) = existing.node() {
                    link(parent, &meta, &key);
                }
                return Ok(existing);
            }
            let tracked = TrackedSet::from_scalars(cell.read().clone());
            seen.insert(cell.raw_id(), Value::Set(tracked.clone()));
            link(parent, tracked.meta(), &key);
            Ok(Value::Set(tracked))
        }
        atomic => Ok(atomic),
    }
}

fn link(parent: Option<&Arc<NodeMeta>>, child: &Arc<NodeMeta>, key: &Key) {
    if let Some(parent) = parent {
        child.link(parent.token(), key.clone());
    }
}

impl Value {
    /// Convert into tracked form without attaching to any owner. The result
    /// can be assigned to owners later; until then it has no parents and
    /// notifies nobody.
    pub fn into_tracked(self) -> Result<Value> {
        // The key is only consulted when linking to a parent.
        wrap_value(None, self, Key::Index(0), &mut Seen::default(), 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn wrap_root(value: Value) -> Result<Value> {
        wrap_value(None, value, Key::name("root"), &mut Seen::default(), 0)
    }

    #[test]
    fn atoms_pass_through() {
        let wrapped = wrap_root(Value::from(42)).unwrap();
        assert!(wrapped.same_identity(&Value::from(42)));
    }

    #[test]
    fn nested_raw_structure_becomes_tracked() {
        let raw = Value::map(BTreeMap::from([(
            "items".to_string(),
            Value::list(vec![Value::from(1), Value::list(vec![])]),
        )]));
        let wrapped = wrap_root(raw).unwrap();

        let map = wrapped.as_map().unwrap();
        let items = map.get("items").unwrap().as_list().unwrap();
        assert_eq!(items.parent_links().len(), 1);
        assert_eq!(items.parent_links()[0].key, Key::name("items"));
        assert!(items.get(1).unwrap().is_tracked());
    }

    #[test]
    fn shared_substructure_wraps_to_one_instance() {
        let shared = Value::list(vec![Value::from(1)]);
        let raw = Value::map(BTreeMap::from([
            ("a".to_string(), shared.clone()),
            ("b".to_string(), shared),
        ]));
        let wrapped = wrap_root(raw).unwrap();

        let map = wrapped.as_map().unwrap();
        let a = map.get("a").unwrap().as_list().unwrap();
        let b = map.get("b").unwrap().as_list().unwrap();
        assert!(a.same(&b));
        assert_eq!(a.parent_links().len(), 2);
    }

    #[test]
    fn cyclic_raw_structure_terminates() {
        let cycle = Value::list(vec![]);
        if let Value::RawList(cell) = &cycle {
            cell.write().push(cycle.clone());
        }
        let wrapped = wrap_root(cycle).unwrap();

        let list = wrapped.as_list().unwrap();
        let inner = list.get(0).unwrap().as_list().unwrap();
        assert!(list.same(&inner));
    }

    #[test]
    fn nesting_past_the_limit_is_rejected() {
        let mut value = Value::list(vec![]);
        for _ in 0..DEFAULT_MAX_NESTING_DEPTH + 1 {
            value = Value::list(vec![value]);
        }
        assert!(matches!(
            wrap_root(value),
            Err(MutagraphError::NestingTooDeep { .. })
        ));
    }

    #[test]
    fn foreign_values_stay_opaque() {
        struct Opaque;
        let raw = Value::list(vec![Value::foreign(Opaque)]);
        let wrapped = wrap_root(raw).unwrap();
        let list = wrapped.as_list().unwrap();
        assert!(matches!(list.get(0).unwrap(), Value::Foreign(_)));
    }

    #[test]
    fn detached_wrapping_produces_an_orphan() {
        let tracked = Value::list(vec![Value::from(1)]).into_tracked().unwrap();
        let list = tracked.as_list().unwrap();
        assert!(list.parent_links().is_empty());
        assert_eq!(list.get(0).unwrap().as_i64(), Some(1));
    }

    #[test]
    fn already_tracked_subtree_is_linked_not_rewrapped() {
        let child = TrackedList::new_empty();
        let raw = Value::list(vec![Value::List(child.clone())]);
        let wrapped = wrap_root(raw).unwrap();

        let list = wrapped.as_list().unwrap();
        assert!(list.get(0).unwrap().as_list().unwrap().same(&child));
        assert_eq!(child.parent_links().len(), 1);
    }
}
