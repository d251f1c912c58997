//! Error types for the editor

use std::time::Duration;

use thiserror::Error;

use crate::node::NodeKey;

/// Errors raised by NodeStore mutations and commits.
///
/// A failing transaction is discarded as a whole; the previously committed
/// EditorState stays authoritative.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransactionError {
    #[error("No active transaction")]
    NoActiveTransaction,

    #[error("A transaction is already open")]
    AlreadyInTransaction,

    #[error("Node not found: {0}")]
    NodeNotFound(NodeKey),

    #[error("Invalid mutation: {0}")]
    InvalidMutation(String),
}

impl TransactionError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        TransactionError::InvalidMutation(reason.into())
    }
}

/// Problems found while importing a persisted document.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    #[error("Malformed node: {0}")]
    Malformed(String),
}

/// Failures reported by the persistence collaborator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PersistenceError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Save timed out after {0:?}")]
    Timeout(Duration),

    #[error("Save conflict: {0}")]
    Conflict(String),

    #[error("Save rejected: {0}")]
    Rejected(String),
}

/// Media rejected before any tree mutation happens.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AssetError {
    #[error("Asset too large: {size} bytes exceeds the {max} byte limit")]
    TooLarge { size: usize, max: usize },

    #[error("Unsupported asset type: {0}")]
    UnsupportedType(String),

    #[error("Invalid data URI")]
    InvalidDataUri,
}

#[derive(Error, Debug)]
pub enum EditorError {
    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Oversize asset: {0}")]
    Asset(#[from] AssetError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown plugin: {0}")]
    UnknownPlugin(String),

    /// The committed tree is corrupt and must be reloaded from the last
    /// persisted snapshot.
    #[error("Fatal: {0}")]
    Fatal(String),
}

impl EditorError {
    /// True when the error can only be resolved by reloading the document.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EditorError::Fatal(_))
    }
}

pub type EditorResult<T> = Result<T, EditorError>;
