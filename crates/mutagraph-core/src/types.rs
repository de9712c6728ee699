use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type NodeId = Uuid;
pub type TokenId = Uuid;

/// Cap on structural nesting during wrapping and snapshot export. Exceeding
/// it rejects the operation rather than recursing further.
pub const DEFAULT_MAX_NESTING_DEPTH: usize = 100;

/// Defensive cap on upward propagation hops. The visited set already bounds
/// a single propagation; this guards against bookkeeping gone wrong.
pub const DEFAULT_MAX_PROPAGATION_DEPTH: usize = 256;

/// Slot under which a child is reachable from its owner: a named field or
/// map entry, or a positional list index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Key {
    Name(String),
    Index(usize),
}

impl Key {
    pub fn name<S: Into<String>>(s: S) -> Self {
        Key::Name(s.into())
    }

    pub fn index(i: usize) -> Self {
        Key::Index(i)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Name(s) => f.write_str(s),
            Key::Index(i) => write!(f, "[{}]", i),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Name(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Name(s)
    }
}

impl From<usize> for Key {
    fn from(i: usize) -> Self {
        Key::Index(i)
    }
}

/// One live edge in the ownership graph: the owner's token identity and the
/// slot at which the child is reachable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParentLink {
    pub token: TokenId,
    pub key: Key,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_display() {
        assert_eq!(Key::name("tags").to_string(), "tags");
        assert_eq!(Key::index(3).to_string(), "[3]");
    }

    #[test]
    fn key_orders_names_before_indices_consistently() {
        let mut keys = vec![Key::index(2), Key::name("b"), Key::name("a"), Key::index(0)];
        keys.sort();
        let sorted: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        assert_eq!(sorted, vec!["a", "b", "[0]", "[2]"]);
    }
}
