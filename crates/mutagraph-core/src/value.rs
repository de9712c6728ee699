use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};

use crate::containers::{TrackedList, TrackedMap, TrackedSet};
use crate::node::NodeMeta;

/// Allocation identity of a composite, used as the visited-set key while
/// wrapping. Stable for as long as the visited set keeps the value alive.
pub(crate) type RawId = usize;

/// A dynamically typed value in an owner graph.
///
/// Atoms are plain data and never carry tracking state. Raw composites are
/// untracked containers with allocation identity, as produced by literals or
/// snapshot decoding; wrapping turns them into their tracked counterparts.
/// Foreign values are opaque payloads that pass through wrapping untouched.
#[derive(Clone, Debug)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    RawList(RawCell<Vec<Value>>),
    RawMap(RawCell<BTreeMap<String, Value>>),
    RawSet(RawCell<BTreeSet<Scalar>>),
    List(TrackedList),
    Map(TrackedMap),
    Set(TrackedSet),
    Foreign(ForeignValue),
}

/// Hashable atom: the only element type a set may hold.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    Bytes(Vec<u8>),
}

/// Shared mutable cell giving raw composites allocation identity, so shared
/// and cyclic raw structure survives until wrapping reconstructs it.
pub struct RawCell<T>(Arc<RwLock<T>>);

impl<T> Clone for RawCell<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> RawCell<T> {
    pub fn new(value: T) -> Self {
        Self(Arc::new(RwLock::new(value)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.0.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.0.write()
    }

    pub fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn raw_id(&self) -> RawId {
        Arc::as_ptr(&self.0) as RawId
    }
}

impl<T: fmt::Debug> fmt::Debug for RawCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawCell({:?})", &*self.read())
    }
}

/// Opaque payload the wrapper cannot introspect. Carried untracked,
/// never fatal.
#[derive(Clone)]
pub struct ForeignValue(Arc<dyn Any + Send + Sync>);

impl ForeignValue {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }

    pub fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn raw_id(&self) -> RawId {
        Arc::as_ptr(&self.0) as *const () as RawId
    }
}

impl fmt::Debug for ForeignValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ForeignValue(..)")
    }
}

impl Value {
    /// Untracked list literal.
    pub fn list(items: Vec<Value>) -> Self {
        Value::RawList(RawCell::new(items))
    }

    /// Untracked map literal.
    pub fn map(entries: BTreeMap<String, Value>) -> Self {
        Value::RawMap(RawCell::new(entries))
    }

    /// Untracked set literal.
    pub fn set(elems: BTreeSet<Scalar>) -> Self {
        Value::RawSet(RawCell::new(elems))
    }

    pub fn foreign<T: Any + Send + Sync>(value: T) -> Self {
        Value::Foreign(ForeignValue::new(value))
    }

    /// Atoms bypass wrapping entirely; primitive-field assignment pays no
    /// tracking overhead.
    pub fn is_atomic(&self) -> bool {
        matches!(
            self,
            Value::Null
                | Value::Bool(_)
                | Value::Int(_)
                | Value::Float(_)
                | Value::Str(_)
                | Value::Bytes(_)
        )
    }

    pub fn is_tracked(&self) -> bool {
        matches!(self, Value::List(_) | Value::Map(_) | Value::Set(_))
    }

    pub fn is_raw_composite(&self) -> bool {
        matches!(self, Value::RawList(_) | Value::RawMap(_) | Value::RawSet(_))
    }

    /// Identity comparison: pointer equality for composites and foreign
    /// values, value equality for atoms.
    pub fn same_identity(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::RawList(a), Value::RawList(b)) => a.same(b),
            (Value::RawMap(a), Value::RawMap(b)) => a.same(b),
            (Value::RawSet(a), Value::RawSet(b)) => a.same(b),
            (Value::List(a), Value::List(b)) => a.same(b),
            (Value::Map(a), Value::Map(b)) => a.same(b),
            (Value::Set(a), Value::Set(b)) => a.same(b),
            (Value::Foreign(a), Value::Foreign(b)) => a.same(b),
            _ => false,
        }
    }

    /// Allocation identity for composites and foreign values; atoms have none.
    pub(crate) fn raw_id(&self) -> Option<RawId> {
        match self {
            Value::RawList(c) => Some(c.raw_id()),
            Value::RawMap(c) => Some(c.raw_id()),
            Value::RawSet(c) => Some(c.raw_id()),
            Value::List(l) => Some(l.raw_id()),
            Value::Map(m) => Some(m.raw_id()),
            Value::Set(s) => Some(s.raw_id()),
            Value::Foreign(f) => Some(f.raw_id()),
            _ => None,
        }
    }

    /// Tracking metadata of a tracked composite.
    pub(crate) fn node(&self) -> Option<Arc<NodeMeta>> {
        match self {
            Value::List(l) => Some(l.meta().clone()),
            Value::Map(m) => Some(m.meta().clone()),
            Value::Set(s) => Some(s.meta().clone()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<TrackedList> {
        match self {
            Value::List(l) => Some(l.clone()),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<TrackedMap> {
        match self {
            Value::Map(m) => Some(m.clone()),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<TrackedSet> {
        match self {
            Value::Set(s) => Some(s.clone()),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Scalar> for Value {
    fn from(v: Scalar) -> Self {
        match v {
            Scalar::Null => Value::Null,
            Scalar::Bool(b) => Value::Bool(b),
            Scalar::Int(i) => Value::Int(i),
            Scalar::Str(s) => Value::Str(s),
            Scalar::Bytes(b) => Value::Bytes(b),
        }
    }
}

impl From<TrackedList> for Value {
    fn from(v: TrackedList) -> Self {
        Value::List(v)
    }
}

impl From<TrackedMap> for Value {
    fn from(v: TrackedMap) -> Self {
        Value::Map(v)
    }
}

impl From<TrackedSet> for Value {
    fn from(v: TrackedSet) -> Self {
        Value::Set(v)
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Bool(v)
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Int(v)
    }
}

impl From<i32> for Scalar {
    fn from(v: i32) -> Self {
        Scalar::Int(v as i64)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Str(v.to_string())
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Scalar::Str(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atoms_compare_by_value() {
        assert!(Value::from(1).same_identity(&Value::from(1)));
        assert!(!Value::from(1).same_identity(&Value::from(2)));
        assert!(Value::from("a").same_identity(&Value::from("a")));
        assert!(!Value::Null.same_identity(&Value::from(false)));
    }

    #[test]
    fn raw_cells_compare_by_allocation() {
        let a = Value::list(vec![Value::from(1)]);
        let b = Value::list(vec![Value::from(1)]);
        assert!(a.same_identity(&a.clone()));
        assert!(!a.same_identity(&b));
    }

    #[test]
    fn foreign_values_are_opaque_but_identifiable() {
        #[derive(Debug)]
        struct Blob(u32);

        let v = Value::foreign(Blob(7));
        assert!(v.same_identity(&v.clone()));
        let Value::Foreign(f) = &v else { unreachable!() };
        assert_eq!(f.downcast_ref::<Blob>().unwrap().0, 7);
    }

    #[test]
    fn float_identity_uses_bits() {
        assert!(Value::Float(f64::NAN).same_identity(&Value::Float(f64::NAN)));
        assert!(!Value::Float(0.0).same_identity(&Value::Float(-0.0)));
    }
}
