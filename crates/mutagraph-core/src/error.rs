use thiserror::Error;

use crate::types::Key;

#[derive(Error, Debug)]
pub enum MutagraphError {
    #[error("nesting depth {depth} exceeds configured limit {limit}")]
    NestingTooDeep { depth: usize, limit: usize },

    #[error("parent link bookkeeping violated at key {key}: {reason}")]
    LinkInvariant { key: Key, reason: String },

    #[error("index {index} out of bounds (len {len})")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("binding already registered for owner type {0}")]
    BindingConflict(String),

    #[error("no binding registered for owner type {0}")]
    BindingMissing(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MutagraphError>;
