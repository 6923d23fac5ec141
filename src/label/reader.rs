//! Scans over range documents.
//!
//! Scans are lazy. Range documents are fetched one page at a time per
//! partition, resuming after the last document of the previous page.
//! Pages follow document order, which matches range order only while every
//! range was written once in ascending order; a rewritten range moves to a
//! later segment. Ranges are sorted within a page, node ids within a range,
//! but a scan as a whole is not guaranteed ascending. Partitions are
//! visited in order. A scan cannot be restarted; create a new one instead.

use std::collections::VecDeque;

use crate::error::Result;
use crate::label::bitmap;
use crate::label::format::RangeDocument;
use crate::lexical::query::Query;
use crate::lexical::searcher::DocAddress;
use crate::partition::searcher::SearcherGuard;

/// A range and the labels of its nodes, as yielded by
/// [`LabelScanReader::all_node_labels`].
pub type NodeLabelRange = RangeDocument;

/// Point-in-time reader over every partition of a label-scan store.
#[derive(Debug)]
pub struct LabelScanReader {
    searchers: Vec<SearcherGuard>,
    page_size: usize,
}

impl LabelScanReader {
    pub fn new(searchers: Vec<SearcherGuard>, page_size: usize) -> Self {
        LabelScanReader {
            searchers,
            page_size: page_size.max(1),
        }
    }

    fn pages(&self, query: Query) -> RangePages<'_> {
        RangePages {
            searchers: &self.searchers,
            query,
            page_size: self.page_size,
            partition: 0,
            after: None,
            page: VecDeque::new(),
        }
    }

    /// Nodes carrying `label`.
    pub fn nodes_with_label(&self, label: u32) -> NodeIds<'_> {
        NodeIds::new(
            self.pages(RangeDocument::label_query(label)),
            vec![label],
            Combine::All,
        )
    }

    /// Nodes carrying every one of `labels`.
    pub fn nodes_with_all_labels(&self, labels: &[u32]) -> NodeIds<'_> {
        NodeIds::new(
            self.pages(RangeDocument::all_labels_query(labels)),
            labels.to_vec(),
            Combine::All,
        )
    }

    /// Nodes carrying at least one of `labels`.
    pub fn nodes_with_any_label(&self, labels: &[u32]) -> NodeIds<'_> {
        NodeIds::new(
            self.pages(RangeDocument::any_label_query(labels)),
            labels.to_vec(),
            Combine::Any,
        )
    }

    /// Labels of one node, ascending.
    pub fn labels_for_node(&self, node_id: u64) -> Result<Vec<u32>> {
        let query = Query::Term(RangeDocument::range_term(bitmap::range_of(node_id)));
        for searcher in &self.searchers {
            let hit = searcher
                .search_after(&query, None, 1)
                .first()
                .and_then(|address| searcher.doc(*address));
            if let Some(doc) = hit {
                return Ok(RangeDocument::from_document(doc)?.labels_of(node_id));
            }
        }
        Ok(Vec::new())
    }

    /// Every stored range with its bitmaps.
    pub fn all_node_labels(&self) -> impl Iterator<Item = Result<NodeLabelRange>> + '_ {
        self.pages(RangeDocument::all_ranges_query())
    }
}

struct RangePages<'a> {
    searchers: &'a [SearcherGuard],
    query: Query,
    page_size: usize,
    partition: usize,
    after: Option<DocAddress>,
    page: VecDeque<RangeDocument>,
}

impl RangePages<'_> {
    /// Load the next non-empty page. `Ok(false)` once every partition is
    /// exhausted.
    fn fill(&mut self) -> Result<bool> {
        while let Some(searcher) = self.searchers.get(self.partition) {
            let hits = searcher.search_after(&self.query, self.after, self.page_size);
            let Some(last) = hits.last().copied() else {
                self.partition += 1;
                self.after = None;
                continue;
            };
            self.after = Some(last);

            let mut page = hits
                .iter()
                .filter_map(|address| searcher.doc(*address))
                .map(RangeDocument::from_document)
                .collect::<Result<Vec<_>>>()?;
            page.sort_by_key(|d| d.range);
            self.page.extend(page);
            return Ok(true);
        }
        Ok(false)
    }
}

impl Iterator for RangePages<'_> {
    type Item = Result<RangeDocument>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.page.is_empty() {
            match self.fill() {
                Ok(true) => {}
                Ok(false) => return None,
                Err(e) => {
                    // Stop after reporting the failure.
                    self.partition = self.searchers.len();
                    return Some(Err(e));
                }
            }
        }
        self.page.pop_front().map(Ok)
    }
}

#[derive(Debug, Clone, Copy)]
enum Combine {
    All,
    Any,
}

/// Lazy sequence of node ids produced by a label scan.
pub struct NodeIds<'a> {
    pages: RangePages<'a>,
    labels: Vec<u32>,
    combine: Combine,
    buffer: VecDeque<u64>,
}

impl<'a> NodeIds<'a> {
    fn new(pages: RangePages<'a>, labels: Vec<u32>, combine: Combine) -> Self {
        NodeIds {
            pages,
            labels,
            combine,
            buffer: VecDeque::new(),
        }
    }

    fn bitmap(&self, range: &RangeDocument) -> u64 {
        let bitmaps = self.labels.iter().map(|label| range.bitmap(*label));
        match self.combine {
            Combine::All if self.labels.is_empty() => 0,
            Combine::All => bitmaps.fold(u64::MAX, |acc, bits| acc & bits),
            Combine::Any => bitmaps.fold(0, |acc, bits| acc | bits),
        }
    }
}

impl Iterator for NodeIds<'_> {
    type Item = Result<u64>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(node) = self.buffer.pop_front() {
                return Some(Ok(node));
            }
            let range = match self.pages.next()? {
                Ok(range) => range,
                Err(e) => return Some(Err(e)),
            };
            let bits = self.bitmap(&range);
            self.buffer.extend(bitmap::members_of(range.range, bits));
        }
    }
}
