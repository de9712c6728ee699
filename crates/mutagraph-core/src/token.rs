use std::fmt;
use std::sync::{Arc, Weak};

use uuid::Uuid;

use crate::node::NodeMeta;
use crate::types::TokenId;

/// Opaque per-node identity handle.
///
/// A node owns its token strongly for its whole lifetime; everything else
/// (parent link registries) holds the token weakly. When the node dies, its
/// token dies with it and every link pointing at it upgrades to `None`, so
/// dead-owner links vanish without explicit teardown.
///
/// Tokens are compared by identity only and are never reused.
#[derive(Clone)]
pub struct OwnerToken {
    inner: Arc<TokenInner>,
}

pub(crate) struct TokenInner {
    id: TokenId,
    node: Weak<NodeMeta>,
}

impl OwnerToken {
    pub(crate) fn issue(node: Weak<NodeMeta>) -> Self {
        Self {
            inner: Arc::new(TokenInner {
                id: Uuid::new_v4(),
                node,
            }),
        }
    }

    pub fn id(&self) -> TokenId {
        self.inner.id
    }

    /// The node this token identifies, if it is still alive.
    pub(crate) fn node(&self) -> Option<Arc<NodeMeta>> {
        self.inner.node.upgrade()
    }

    pub(crate) fn downgrade(&self) -> WeakToken {
        WeakToken(Arc::downgrade(&self.inner))
    }
}

impl fmt::Debug for OwnerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OwnerToken({})", self.inner.id)
    }
}

/// Weak side of a token, stored in link registries.
#[derive(Clone)]
pub(crate) struct WeakToken(Weak<TokenInner>);

impl WeakToken {
    pub(crate) fn upgrade(&self) -> Option<OwnerToken> {
        self.0.upgrade().map(|inner| OwnerToken { inner })
    }
}
