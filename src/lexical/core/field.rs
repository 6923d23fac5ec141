//! Field value types.
//!
//! Documents are schema-less: every field carries a [`FieldValue`] and a flag
//! telling whether it contributes a term to the index. All fields are
//! stored and returned by the searcher.

use serde::{Deserialize, Serialize};

/// The value stored in a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldValue {
    /// Untokenized text, indexed as a single term.
    Text(String),
    /// 64-bit integer, indexed as its decimal representation.
    Long(i64),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            FieldValue::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// The term text this value contributes when indexed.
    pub fn term_text(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::Long(v) => v.to_string(),
        }
    }
}

/// A field combines a value with its indexing flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub value: FieldValue,

    /// Whether the value is added to the term dictionary. Stored-only fields
    /// are still visible to field-existence queries.
    #[serde(default = "default_true")]
    pub indexed: bool,
}

impl Field {
    pub fn indexed(value: FieldValue) -> Self {
        Field {
            value,
            indexed: true,
        }
    }

    pub fn stored(value: FieldValue) -> Self {
        Field {
            value,
            indexed: false,
        }
    }
}

fn default_true() -> bool {
    true
}
