//! Queries understood by the document engine.
//!
//! A [`Query`] is evaluated per segment into an ascending list of local
//! document ids, or directly against a single buffered document.

use std::ops::Bound;

use serde::{Deserialize, Serialize};

use crate::lexical::core::document::Document;
use crate::lexical::core::term::Term;
use crate::lexical::segment::SegmentData;

/// A query over terms and field presence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Query {
    /// Documents containing exactly this term.
    Term(Term),
    /// Documents with a term of `field` starting with `prefix`.
    Prefix { field: String, prefix: String },
    /// Documents with a term of `field` inside the bounds. `None` is open.
    TermRange(TermRange),
    /// Documents that carry `field` at all, indexed or not.
    FieldExists(String),
    MatchAll,
    Boolean(BooleanQuery),
}

/// Lexicographic range over the terms of one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermRange {
    pub field: String,
    pub lower: Option<String>,
    pub upper: Option<String>,
    pub include_lower: bool,
    pub include_upper: bool,
}

impl TermRange {
    fn bounds(&self) -> (Bound<&str>, Bound<&str>) {
        let lower = match &self.lower {
            None => Bound::Unbounded,
            Some(l) if self.include_lower => Bound::Included(l.as_str()),
            Some(l) => Bound::Excluded(l.as_str()),
        };
        let upper = match &self.upper {
            None => Bound::Unbounded,
            Some(u) if self.include_upper => Bound::Included(u.as_str()),
            Some(u) => Bound::Excluded(u.as_str()),
        };
        (lower, upper)
    }

    fn contains(&self, text: &str) -> bool {
        let above = match &self.lower {
            None => true,
            Some(l) if self.include_lower => text >= l.as_str(),
            Some(l) => text > l.as_str(),
        };
        let below = match &self.upper {
            None => true,
            Some(u) if self.include_upper => text <= u.as_str(),
            Some(u) => text < u.as_str(),
        };
        above && below
    }
}

/// Conjunction / disjunction / exclusion of sub-queries.
///
/// With at least one `must` clause, `should` clauses are ignored. Without
/// `must`, at least one `should` has to match. A query with only `must_not`
/// clauses matches every document not excluded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BooleanQuery {
    pub must: Vec<Query>,
    pub should: Vec<Query>,
    pub must_not: Vec<Query>,
}

impl BooleanQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn must(mut self, query: Query) -> Self {
        self.must.push(query);
        self
    }

    pub fn should(mut self, query: Query) -> Self {
        self.should.push(query);
        self
    }

    pub fn must_not(mut self, query: Query) -> Self {
        self.must_not.push(query);
        self
    }

    pub fn build(self) -> Query {
        Query::Boolean(self)
    }
}

impl Query {
    pub fn term<F: Into<String>, T: Into<String>>(field: F, text: T) -> Self {
        Query::Term(Term::new(field, text))
    }

    pub fn prefix<F: Into<String>, P: Into<String>>(field: F, prefix: P) -> Self {
        Query::Prefix {
            field: field.into(),
            prefix: prefix.into(),
        }
    }

    pub fn range<F: Into<String>>(
        field: F,
        lower: Option<String>,
        upper: Option<String>,
        include_lower: bool,
        include_upper: bool,
    ) -> Self {
        Query::TermRange(TermRange {
            field: field.into(),
            lower,
            upper,
            include_lower,
            include_upper,
        })
    }

    pub fn exists<F: Into<String>>(field: F) -> Self {
        Query::FieldExists(field.into())
    }

    /// Ascending local doc ids of `segment` matching this query, deleted
    /// documents included.
    pub fn matching_docs(&self, segment: &SegmentData) -> Vec<u32> {
        match self {
            Query::Term(term) => segment.postings(&term.field, &term.text).to_vec(),
            Query::Prefix { field, prefix } => union(
                segment
                    .term_range(field, Bound::Included(prefix.as_str()), Bound::Unbounded)
                    .take_while(|(text, _)| text.starts_with(prefix.as_str()))
                    .map(|(_, postings)| postings),
            ),
            Query::TermRange(range) => {
                let (lower, upper) = range.bounds();
                union(
                    segment
                        .term_range(&range.field, lower, upper)
                        .map(|(_, postings)| postings),
                )
            }
            Query::FieldExists(field) => segment.field_docs(field).to_vec(),
            Query::MatchAll => (0..segment.max_doc()).collect(),
            Query::Boolean(boolean) => {
                let mut docs = if !boolean.must.is_empty() {
                    let mut iter = boolean.must.iter();
                    let mut acc = iter
                        .next()
                        .map(|q| q.matching_docs(segment))
                        .unwrap_or_default();
                    for query in iter {
                        if acc.is_empty() {
                            break;
                        }
                        acc = intersect(&acc, &query.matching_docs(segment));
                    }
                    acc
                } else if !boolean.should.is_empty() {
                    let lists: Vec<Vec<u32>> = boolean
                        .should
                        .iter()
                        .map(|q| q.matching_docs(segment))
                        .collect();
                    union(lists.iter().map(|l| l.as_slice()))
                } else {
                    (0..segment.max_doc()).collect()
                };
                for query in &boolean.must_not {
                    if docs.is_empty() {
                        break;
                    }
                    docs = difference(&docs, &query.matching_docs(segment));
                }
                docs
            }
        }
    }

    /// Whether a single, not yet segmented document matches.
    pub fn matches_document(&self, doc: &Document) -> bool {
        let indexed_text = |field: &str| -> Option<String> {
            doc.get(field)
                .filter(|f| f.indexed)
                .map(|f| f.value.term_text())
        };
        match self {
            Query::Term(term) => indexed_text(&term.field).is_some_and(|t| t == term.text),
            Query::Prefix { field, prefix } => {
                indexed_text(field).is_some_and(|t| t.starts_with(prefix.as_str()))
            }
            Query::TermRange(range) => {
                indexed_text(&range.field).is_some_and(|t| range.contains(&t))
            }
            Query::FieldExists(field) => doc.has_field(field),
            Query::MatchAll => true,
            Query::Boolean(boolean) => {
                let required = if !boolean.must.is_empty() {
                    boolean.must.iter().all(|q| q.matches_document(doc))
                } else if !boolean.should.is_empty() {
                    boolean.should.iter().any(|q| q.matches_document(doc))
                } else {
                    true
                };
                required && !boolean.must_not.iter().any(|q| q.matches_document(doc))
            }
        }
    }
}

fn union<'a>(lists: impl Iterator<Item = &'a [u32]>) -> Vec<u32> {
    let mut docs: Vec<u32> = lists.flat_map(|l| l.iter().copied()).collect();
    docs.sort_unstable();
    docs.dedup();
    docs
}

fn intersect(a: &[u32], b: &[u32]) -> Vec<u32> {
    let (mut i, mut j) = (0, 0);
    let mut out = Vec::with_capacity(a.len().min(b.len()));
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}

fn difference(a: &[u32], b: &[u32]) -> Vec<u32> {
    let mut j = 0;
    let mut out = Vec::with_capacity(a.len());
    for &doc in a {
        while j < b.len() && b[j] < doc {
            j += 1;
        }
        if j >= b.len() || b[j] != doc {
            out.push(doc);
        }
    }
    out
}
