//! Document structure for schema-less indexing.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::lexical::core::field::{Field, FieldValue};

/// A document is a collection of named fields, at most one value per name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub fields: HashMap<String, Field>,
}

impl Document {
    /// Create a new empty document.
    pub fn new() -> Self {
        Document {
            fields: HashMap::new(),
        }
    }

    /// Add an indexed text field.
    pub fn with_text(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.fields
            .insert(name.into(), Field::indexed(FieldValue::Text(text.into())));
        self
    }

    /// Add an indexed integer field.
    pub fn with_long(mut self, name: impl Into<String>, value: i64) -> Self {
        self.fields
            .insert(name.into(), Field::indexed(FieldValue::Long(value)));
        self
    }

    /// Add a stored-only integer field.
    pub fn with_stored_long(mut self, name: impl Into<String>, value: i64) -> Self {
        self.fields
            .insert(name.into(), Field::stored(FieldValue::Long(value)));
        self
    }

    /// Add a field with explicit options.
    pub fn with_field(mut self, name: impl Into<String>, field: Field) -> Self {
        self.fields.insert(name.into(), field);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    pub fn get_text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(|f| f.value.as_text())
    }

    pub fn get_long(&self, name: &str) -> Option<i64> {
        self.fields.get(name).and_then(|f| f.value.as_long())
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(|s| s.as_str())
    }

    /// Iterate `(field, term text)` for every indexed field.
    pub fn indexed_terms(&self) -> impl Iterator<Item = (&str, String)> {
        self.fields
            .iter()
            .filter(|(_, f)| f.indexed)
            .map(|(name, f)| (name.as_str(), f.value.term_text()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
