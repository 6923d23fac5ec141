//! Range documents.
//!
//! One document per node-id range:
//!
//! - `range`: the range id, indexed, the document key
//! - `<label id>`: one stored-only field per label with members in the
//!   range, holding the bitmap's bits as a signed 64-bit integer
//!
//! A zero bitmap is never written, and a range without labels has no
//! document. Scans select ranges by label with a field-existence query.

use std::collections::BTreeMap;

use crate::error::{NodexError, Result};
use crate::label::bitmap;
use crate::lexical::core::document::Document;
use crate::lexical::core::term::Term;
use crate::lexical::query::{BooleanQuery, Query};

pub const RANGE_FIELD: &str = "range";

/// Label bitmaps of one range.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeDocument {
    pub range: u64,
    /// Label id to non-zero bitmap.
    pub bitmaps: BTreeMap<u32, u64>,
}

impl RangeDocument {
    pub fn new(range: u64) -> Self {
        RangeDocument {
            range,
            bitmaps: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bitmaps.is_empty()
    }

    pub fn bitmap(&self, label: u32) -> u64 {
        self.bitmaps.get(&label).copied().unwrap_or(0)
    }

    pub fn labels(&self) -> impl Iterator<Item = u32> + '_ {
        self.bitmaps.keys().copied()
    }

    /// Labels carried by `node_id`, ascending.
    pub fn labels_of(&self, node_id: u64) -> Vec<u32> {
        self.bitmaps
            .iter()
            .filter(|(_, bits)| bitmap::contains(**bits, node_id))
            .map(|(label, _)| *label)
            .collect()
    }

    /// Every node with at least one label, ascending.
    pub fn nodes(&self) -> Vec<u64> {
        let any = self.bitmaps.values().fold(0u64, |acc, bits| acc | bits);
        bitmap::members_of(self.range, any)
    }

    /// A copy in which `node_id` carries exactly `labels`. Bitmaps left
    /// empty are dropped.
    pub fn with_node_labels(&self, node_id: u64, labels: &[u32]) -> RangeDocument {
        let mut bitmaps: BTreeMap<u32, u64> = self
            .bitmaps
            .iter()
            .map(|(label, bits)| (*label, bitmap::set(*bits, node_id, false)))
            .collect();
        for label in labels {
            let bits = bitmaps.entry(*label).or_default();
            *bits = bitmap::set(*bits, node_id, true);
        }
        bitmaps.retain(|_, bits| *bits != 0);
        RangeDocument {
            range: self.range,
            bitmaps,
        }
    }

    pub fn to_document(&self) -> Document {
        self.bitmaps.iter().fold(
            Document::new().with_long(RANGE_FIELD, self.range as i64),
            |doc, (label, bits)| doc.with_stored_long(label.to_string(), *bits as i64),
        )
    }

    pub fn from_document(doc: &Document) -> Result<Self> {
        let range = doc
            .get_long(RANGE_FIELD)
            .ok_or_else(|| NodexError::corrupt("label range document without a range"))?
            as u64;
        let mut bitmaps = BTreeMap::new();
        for name in doc.field_names().filter(|n| *n != RANGE_FIELD) {
            let label: u32 = name.parse().map_err(|_| {
                NodexError::corrupt(format!("range {range} has a non-label field {name:?}"))
            })?;
            let bits = doc.get_long(name).ok_or_else(|| {
                NodexError::corrupt(format!("range {range} label {label} is not a bitmap"))
            })? as u64;
            if bits != 0 {
                bitmaps.insert(label, bits);
            }
        }
        Ok(RangeDocument { range, bitmaps })
    }

    pub fn range_term(range: u64) -> Term {
        Term::long(RANGE_FIELD, range as i64)
    }

    /// Ranges with members carrying `label`.
    pub fn label_query(label: u32) -> Query {
        Query::exists(label.to_string())
    }

    /// Ranges with members for every label.
    pub fn all_labels_query(labels: &[u32]) -> Query {
        labels
            .iter()
            .fold(BooleanQuery::new(), |q, label| q.must(Self::label_query(*label)))
            .build()
    }

    /// Ranges with members for any label.
    pub fn any_label_query(labels: &[u32]) -> Query {
        labels
            .iter()
            .fold(BooleanQuery::new(), |q, label| q.should(Self::label_query(*label)))
            .build()
    }

    pub fn all_ranges_query() -> Query {
        Query::exists(RANGE_FIELD)
    }
}
