//! Batched application of label changes.
//!
//! Updates must arrive in non-decreasing node id order. They are grouped by
//! range and flushed once either the number of dirty ranges or the number
//! of pending updates reaches its bound. Flushing rebuilds each dirty
//! range document from the live searchers and replaces it in the
//! partition that already holds it, or inserts it into the insertion
//! partition when it is new. Searchers are refreshed after every flush so
//! later batches see earlier ones.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::LabelScanConfig;
use crate::error::{NodexError, Result};
use crate::label::bitmap;
use crate::label::format::RangeDocument;
use crate::lexical::query::Query;
use crate::partition::index::PartitionedIndex;
use crate::partition::index_partition::IndexPartition;

/// Label sets of one node before and after a change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeLabelUpdate {
    pub node_id: u64,
    pub labels_before: Vec<u32>,
    pub labels_after: Vec<u32>,
}

impl NodeLabelUpdate {
    pub fn new(node_id: u64, labels_before: Vec<u32>, labels_after: Vec<u32>) -> Self {
        NodeLabelUpdate {
            node_id,
            labels_before,
            labels_after,
        }
    }

    /// A node gaining labels it did not have.
    pub fn added(node_id: u64, labels: Vec<u32>) -> Self {
        Self::new(node_id, Vec::new(), labels)
    }
}

#[derive(Debug)]
pub struct LabelScanWriter {
    index: Arc<PartitionedIndex>,
    max_batch_ranges: usize,
    max_batch_updates: usize,
    /// Range id to the final label set of each touched node.
    pending: BTreeMap<u64, BTreeMap<u64, Vec<u32>>>,
    pending_updates: usize,
    last_node: Option<u64>,
    closed: bool,
}

impl LabelScanWriter {
    pub fn new(index: Arc<PartitionedIndex>, config: &LabelScanConfig) -> Self {
        LabelScanWriter {
            index,
            max_batch_ranges: config.max_batch_ranges.max(1),
            max_batch_updates: config.max_batch_updates.max(1),
            pending: BTreeMap::new(),
            pending_updates: 0,
            last_node: None,
            closed: false,
        }
    }

    pub fn write(&mut self, update: NodeLabelUpdate) -> Result<()> {
        if self.closed {
            return Err(NodexError::illegal_state("label scan writer is closed"));
        }
        if let Some(previous) = self.last_node {
            if update.node_id < previous {
                return Err(NodexError::OrderingViolation {
                    previous,
                    next: update.node_id,
                });
            }
        }
        self.last_node = Some(update.node_id);

        let range = bitmap::range_of(update.node_id);
        if !self.pending.contains_key(&range) && self.pending.len() >= self.max_batch_ranges {
            self.flush()?;
        }
        let mut labels = update.labels_after;
        labels.sort_unstable();
        labels.dedup();
        self.pending
            .entry(range)
            .or_default()
            .insert(update.node_id, labels);
        self.pending_updates += 1;

        if self.pending_updates >= self.max_batch_updates {
            self.flush()?;
        }
        Ok(())
    }

    /// Apply every pending update and refresh searchers.
    pub fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        self.index.check_writable()?;
        let pending = std::mem::take(&mut self.pending);
        let updates = std::mem::replace(&mut self.pending_updates, 0);

        let partitions = self.index.partitions();
        let searchers: Vec<_> = partitions.iter().map(|p| p.acquire_searcher()).collect();
        let insertion = partitions
            .last()
            .ok_or_else(|| NodexError::illegal_state("index has no open partitions"))?;

        for (range, nodes) in pending {
            let term = RangeDocument::range_term(range);
            let query = Query::Term(term.clone());

            let mut existing: Option<(&Arc<IndexPartition>, RangeDocument)> = None;
            for (partition, searcher) in partitions.iter().zip(&searchers) {
                let hit = searcher
                    .search_after(&query, None, 1)
                    .first()
                    .and_then(|address| searcher.doc(*address));
                if let Some(doc) = hit {
                    existing = Some((partition, RangeDocument::from_document(doc)?));
                    break;
                }
            }

            let (target, current) = match existing {
                Some((partition, doc)) => (partition, Some(doc)),
                None => (insertion, None),
            };
            let base = current.clone().unwrap_or_else(|| RangeDocument::new(range));
            let updated = nodes
                .iter()
                .fold(base, |doc, (node, labels)| doc.with_node_labels(*node, labels));

            if updated.is_empty() {
                if current.is_some() {
                    target.delete_documents(&term)?;
                }
            } else if current.as_ref() != Some(&updated) {
                target.update_document(&term, updated.to_document())?;
            }
        }
        drop(searchers);

        self.index.refresh()?;
        log::debug!(
            "flushed {updates} label updates into {:?}",
            self.index.folder()
        );
        Ok(())
    }

    /// Flush and stop accepting updates.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.flush()?;
        self.closed = true;
        Ok(())
    }
}

impl Drop for LabelScanWriter {
    fn drop(&mut self) {
        if !self.closed && !self.pending.is_empty() {
            log::warn!(
                "label scan writer for {:?} dropped with {} unflushed updates",
                self.index.folder(),
                self.pending_updates
            );
        }
    }
}
