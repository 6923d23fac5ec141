//! Point-in-time read views.
//!
//! An [`IndexSnapshot`] pins the segments and deletion bitmaps a writer
//! had when it was taken. Later writes never modify a snapshot: deletion
//! bitmaps are copied on write by the writer while a snapshot shares them.

use std::collections::BTreeMap;
use std::sync::Arc;

use bit_vec::BitVec;

use crate::lexical::core::document::Document;
use crate::lexical::query::Query;
use crate::lexical::segment::SegmentData;

/// Address of a document inside one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocAddress {
    pub segment: u32,
    pub doc: u32,
}

/// One segment as seen by a snapshot.
#[derive(Debug, Clone)]
pub struct SegmentView {
    pub data: Arc<SegmentData>,
    pub deleted: Arc<BitVec>,
}

impl SegmentView {
    pub fn is_live(&self, doc: u32) -> bool {
        !self.deleted.get(doc as usize).unwrap_or(false)
    }
}

/// Term statistics over live documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermStats {
    pub text: String,
    pub doc_freq: u64,
}

/// Immutable view of a directory's documents.
#[derive(Debug, Default)]
pub struct IndexSnapshot {
    segments: Vec<SegmentView>,
    version: u64,
}

impl IndexSnapshot {
    pub fn new(segments: Vec<SegmentView>, version: u64) -> Self {
        IndexSnapshot { segments, version }
    }

    /// Writer change counter this snapshot reflects.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn segments(&self) -> &[SegmentView] {
        &self.segments
    }

    pub fn max_doc(&self) -> u64 {
        self.segments.iter().map(|s| s.data.max_doc() as u64).sum()
    }

    pub fn num_docs(&self) -> u64 {
        self.segments
            .iter()
            .map(|s| s.data.max_doc() as u64 - s.deleted.iter().filter(|d| *d).count() as u64)
            .sum()
    }
}

/// Executes queries against a snapshot.
#[derive(Debug, Clone)]
pub struct IndexSearcher {
    snapshot: Arc<IndexSnapshot>,
}

impl IndexSearcher {
    pub fn new(snapshot: Arc<IndexSnapshot>) -> Self {
        IndexSearcher { snapshot }
    }

    pub fn snapshot(&self) -> &Arc<IndexSnapshot> {
        &self.snapshot
    }

    /// All live documents matching the query, in address order.
    pub fn search(&self, query: &Query) -> Vec<DocAddress> {
        self.search_after(query, None, usize::MAX)
    }

    /// Up to `limit` live matches strictly after `after`, in address order.
    pub fn search_after(
        &self,
        query: &Query,
        after: Option<DocAddress>,
        limit: usize,
    ) -> Vec<DocAddress> {
        let mut hits = Vec::new();
        for (segment_idx, segment) in self.snapshot.segments.iter().enumerate() {
            let segment_idx = segment_idx as u32;
            if after.is_some_and(|a| a.segment > segment_idx) {
                continue;
            }
            for doc in query.matching_docs(&segment.data) {
                if hits.len() >= limit {
                    return hits;
                }
                let address = DocAddress {
                    segment: segment_idx,
                    doc,
                };
                if after.is_some_and(|a| address <= a) || !segment.is_live(doc) {
                    continue;
                }
                hits.push(address);
            }
        }
        hits
    }

    pub fn count(&self, query: &Query) -> usize {
        self.snapshot
            .segments
            .iter()
            .map(|s| {
                query
                    .matching_docs(&s.data)
                    .into_iter()
                    .filter(|d| s.is_live(*d))
                    .count()
            })
            .sum()
    }

    pub fn doc(&self, address: DocAddress) -> Option<&Document> {
        self.snapshot
            .segments
            .get(address.segment as usize)
            .and_then(|s| s.data.doc(address.doc))
    }

    /// Every term of `field` with the number of live documents holding it,
    /// in term order. Terms only held by deleted documents are skipped.
    pub fn terms(&self, field: &str) -> Vec<TermStats> {
        let mut merged: BTreeMap<&str, u64> = BTreeMap::new();
        for segment in &self.snapshot.segments {
            for (text, postings) in segment.data.terms(field) {
                let live = postings.iter().filter(|d| segment.is_live(**d)).count() as u64;
                if live > 0 {
                    *merged.entry(text).or_default() += live;
                }
            }
        }
        merged
            .into_iter()
            .map(|(text, doc_freq)| TermStats {
                text: text.to_string(),
                doc_freq,
            })
            .collect()
    }

    /// Iterate every live document.
    pub fn live_docs(&self) -> impl Iterator<Item = (DocAddress, &Document)> {
        self.snapshot
            .segments
            .iter()
            .enumerate()
            .flat_map(|(segment_idx, segment)| {
                segment
                    .data
                    .docs()
                    .iter()
                    .enumerate()
                    .filter(move |(doc, _)| segment.is_live(*doc as u32))
                    .map(move |(doc, d)| {
                        (
                            DocAddress {
                                segment: segment_idx as u32,
                                doc: doc as u32,
                            },
                            d,
                        )
                    })
            })
    }

    pub fn max_doc(&self) -> u64 {
        self.snapshot.max_doc()
    }

    pub fn num_docs(&self) -> u64 {
        self.snapshot.num_docs()
    }
}
