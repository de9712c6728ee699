use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{MutagraphError, Result};
use crate::types::DEFAULT_MAX_NESTING_DEPTH;
use crate::value::{Scalar, Value};

/// Fully detached, serializable snapshot of a value tree. Carries no tracking
/// state and no shared identity; decoding yields raw composites that wrapping
/// can re-track.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PlainValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<PlainValue>),
    Map(BTreeMap<String, PlainValue>),
    Set(BTreeSet<Scalar>),
}

impl PlainValue {
    /// Rebuild an untracked value tree from a snapshot. Every composite gets
    /// a fresh allocation.
    pub fn to_raw(&self) -> Value {
        match self {
            PlainValue::Null => Value::Null,
            PlainValue::Bool(b) => Value::Bool(*b),
            PlainValue::Int(i) => Value::Int(*i),
            PlainValue::Float(f) => Value::Float(*f),
            PlainValue::Str(s) => Value::Str(s.clone()),
            PlainValue::Bytes(b) => Value::Bytes(b.clone()),
            PlainValue::List(items) => Value::list(items.iter().map(Self::to_raw).collect()),
            PlainValue::Map(entries) => Value::map(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_raw()))
                    .collect(),
            ),
            PlainValue::Set(elems) => Value::set(elems.clone()),
        }
    }
}

/// Snapshot one value. Container payloads are copied out before recursing, so
/// an export never holds a container lock across the walk. Cyclic structure
/// exceeds the depth limit and is rejected rather than looping.
pub fn export_value(value: &Value) -> Result<PlainValue> {
    export_inner(value, 0)
}

fn export_inner(value: &Value, depth: usize) -> Result<PlainValue> {
    if depth >= DEFAULT_MAX_NESTING_DEPTH {
        return Err(MutagraphError::NestingTooDeep {
            depth,
            limit: DEFAULT_MAX_NESTING_DEPTH,
        });
    }
    Ok(match value {
        Value::Null => PlainValue::Null,
        Value::Bool(b) => PlainValue::Bool(*b),
        Value::Int(i) => PlainValue::Int(*i),
        Value::Float(f) => PlainValue::Float(*f),
        Value::Str(s) => PlainValue::Str(s.clone()),
        Value::Bytes(b) => PlainValue::Bytes(b.clone()),
        Value::RawList(cell) => {
            let items = cell.read().clone();
            PlainValue::List(
                items
                    .iter()
                    .map(|v| export_inner(v, depth + 1))
                    .collect::<Result<_>>()?,
            )
        }
        Value::RawMap(cell) => {
            let entries = cell.read().clone();
            PlainValue::Map(
                entries
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), export_inner(v, depth + 1)?)))
                    .collect::<Result<_>>()?,
            )
        }
        Value::RawSet(cell) => PlainValue::Set(cell.read().clone()),
        Value::List(list) => PlainValue::List(
            list.to_vec()
                .iter()
                .map(|v| export_inner(v, depth + 1))
                .collect::<Result<_>>()?,
        ),
        Value::Map(map) => PlainValue::Map(
            map.to_map()
                .iter()
                .map(|(k, v)| Ok((k.clone(), export_inner(v, depth + 1)?)))
                .collect::<Result<_>>()?,
        ),
        Value::Set(set) => PlainValue::Set(set.to_set()),
        Value::Foreign(_) => {
            warn!("opaque value cannot be snapshotted; exporting as null");
            PlainValue::Null
        }
    })
}

/// Snapshot a whole field map, as stored by an owner object.
pub fn export_fields(fields: &BTreeMap<String, Value>) -> Result<BTreeMap<String, PlainValue>> {
    fields
        .iter()
        .map(|(name, value)| Ok((name.clone(), export_value(value)?)))
        .collect()
}
