//! Property index update records.

use serde::{Deserialize, Serialize};

use crate::codec::value::Value;

/// One change to the value an entity holds under an index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexUpdate {
    Added {
        entity_id: u64,
        value: Value,
    },
    Changed {
        entity_id: u64,
        before: Value,
        after: Value,
    },
    Removed {
        entity_id: u64,
        value: Value,
    },
}

impl IndexUpdate {
    pub fn added(entity_id: u64, value: impl Into<Value>) -> Self {
        IndexUpdate::Added {
            entity_id,
            value: value.into(),
        }
    }

    pub fn changed(entity_id: u64, before: impl Into<Value>, after: impl Into<Value>) -> Self {
        IndexUpdate::Changed {
            entity_id,
            before: before.into(),
            after: after.into(),
        }
    }

    pub fn removed(entity_id: u64, value: impl Into<Value>) -> Self {
        IndexUpdate::Removed {
            entity_id,
            value: value.into(),
        }
    }

    pub fn entity_id(&self) -> u64 {
        match self {
            IndexUpdate::Added { entity_id, .. }
            | IndexUpdate::Changed { entity_id, .. }
            | IndexUpdate::Removed { entity_id, .. } => *entity_id,
        }
    }

    /// The value the entity holds after this update, if any.
    pub fn value_after(&self) -> Option<&Value> {
        match self {
            IndexUpdate::Added { value, .. } => Some(value),
            IndexUpdate::Changed { after, .. } => Some(after),
            IndexUpdate::Removed { .. } => None,
        }
    }
}
