//! Change tracking for deeply nested, shared and cyclic value graphs.
//!
//! Assign structured values to a [`TrackedObject`] and every mutation made
//! anywhere in the reachable graph surfaces at the owning object through its
//! [`ChangeNotifier`] hook, labeled with the field it came through. Ownership
//! edges are held weakly, so dropping an owner detaches its subtree without
//! explicit teardown. [`BatchGuard`] scopes coalesce bursts of mutations into
//! a single notification, and [`PersistenceBinding`] implementations move
//! detached [`PlainValue`] snapshots in and out of storage formats.

pub mod batch;
pub mod bind;
pub mod containers;
pub mod error;
pub mod object;
pub mod propagate;
pub mod snapshot;
pub mod token;
pub mod types;
pub mod value;

mod node;
mod wrap;

pub use batch::*;
pub use bind::*;
pub use containers::*;
pub use error::*;
pub use object::*;
pub use propagate::*;
pub use snapshot::*;
pub use token::*;
pub use types::*;
pub use value::*;
