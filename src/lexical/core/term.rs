use std::fmt;

use serde::{Deserialize, Serialize};

/// A (field, text) pair addressing one entry of the term dictionary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Term {
    pub field: String,
    pub text: String,
}

impl Term {
    pub fn new<F: Into<String>, T: Into<String>>(field: F, text: T) -> Self {
        Term {
            field: field.into(),
            text: text.into(),
        }
    }

    /// Term for an indexed [`FieldValue::Long`](super::field::FieldValue::Long).
    pub fn long<F: Into<String>>(field: F, value: i64) -> Self {
        Term::new(field, value.to_string())
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.field, self.text)
    }
}
