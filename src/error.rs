//! Error types for the index layer.
//!
//! Every fallible operation returns [`Result`]. The variants map one-to-one
//! onto the failure kinds callers are expected to tell apart: storage
//! failures, exhausted partition capacity, uniqueness conflicts, corrupt
//! on-disk state, lifecycle misuse and out-of-order label updates.

use thiserror::Error;

use crate::codec::value::Value;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, NodexError>;

/// The error type of the index layer.
#[derive(Debug, Error)]
pub enum NodexError {
    /// Disk or filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Metadata or document (de)serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A partition reached its document-count ceiling and merging could not
    /// free enough headroom.
    #[error(
        "partition capacity exceeded: {current_docs} documents present, {requested} requested, ceiling is {max_docs}"
    )]
    CapacityExceeded {
        max_docs: u64,
        current_docs: u64,
        requested: u64,
    },

    /// Two entities carry the same value under a uniqueness guarantee.
    #[error(
        "entities {existing_entity} and {conflicting_entity} both have value {value} in a unique index"
    )]
    ConstraintConflict {
        value: Value,
        existing_entity: u64,
        conflicting_entity: u64,
    },

    /// The on-disk index failed an integrity check.
    #[error("corrupt index: {0}")]
    CorruptIndex(String),

    /// An operation was invoked in the wrong lifecycle state.
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// Label updates arrived out of node id order.
    #[error("label updates must arrive in node id order: {next} supplied after {previous}")]
    OrderingViolation { previous: u64, next: u64 },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A background task observed cancellation.
    #[error("cancelled: {0}")]
    Cancelled(String),
}

impl NodexError {
    pub fn illegal_state<S: Into<String>>(msg: S) -> Self {
        NodexError::IllegalState(msg.into())
    }

    pub fn corrupt<S: Into<String>>(msg: S) -> Self {
        NodexError::CorruptIndex(msg.into())
    }

    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        NodexError::InvalidArgument(msg.into())
    }

    pub fn cancelled<S: Into<String>>(msg: S) -> Self {
        NodexError::Cancelled(msg.into())
    }

    /// Whether this error is a uniqueness conflict rather than a storage failure.
    pub fn is_constraint_conflict(&self) -> bool {
        matches!(self, NodexError::ConstraintConflict { .. })
    }
}
