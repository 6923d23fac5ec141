//! Uniqueness verification.
//!
//! During population, [`UniqueValueChecker`] catches duplicates as they are
//! added: values added since the last searcher refresh are remembered in a
//! bounded map, older ones are found through the searchers. After
//! population, [`verify_deferred_constraints`] walks the term dictionary of
//! every value field and re-checks each value held by more than one
//! document, catching anything the batched check let through.

use std::collections::BTreeMap;

use ahash::AHashMap;

use crate::codec::value::{VALUE_FIELDS, Value, ValueCodec};
use crate::error::{NodexError, Result};
use crate::lexical::core::term::Term;
use crate::lexical::query::Query;
use crate::partition::index::PartitionedIndex;
use crate::partition::searcher::SearcherGuard;

fn conflict(value: Value, existing_entity: u64, conflicting_entity: u64) -> NodexError {
    NodexError::ConstraintConflict {
        value,
        existing_entity,
        conflicting_entity,
    }
}

/// Population-time duplicate detection.
#[derive(Debug)]
pub struct UniqueValueChecker {
    batch: AHashMap<Term, u64>,
    batch_size: usize,
    searchers: Option<Vec<SearcherGuard>>,
}

impl UniqueValueChecker {
    pub fn new(batch_size: usize) -> Self {
        UniqueValueChecker {
            batch: AHashMap::new(),
            batch_size: batch_size.max(1),
            searchers: None,
        }
    }

    /// Check `value` for `entity_id` before it is added. Returns `true` if
    /// it should be added, `false` if the entity already holds it.
    pub fn check(&mut self, index: &PartitionedIndex, entity_id: u64, value: &Value) -> Result<bool> {
        let term = ValueCodec::value_term(value);
        if let Some(&existing) = self.batch.get(&term) {
            return if existing == entity_id {
                Ok(false)
            } else {
                Err(conflict(value.clone(), existing, entity_id))
            };
        }

        if self.searchers.is_none() {
            self.searchers = Some(index.acquire_searchers()?);
        }
        let query = Query::Term(term.clone());
        for searcher in self.searchers.iter().flatten() {
            for address in searcher.search(&query) {
                let Some(doc) = searcher.doc(address) else {
                    continue;
                };
                let existing = ValueCodec::entity_id(doc)?;
                return if existing == entity_id {
                    Ok(false)
                } else {
                    Err(conflict(value.clone(), existing, entity_id))
                };
            }
        }

        if self.batch.len() >= self.batch_size {
            // Everything in the batch has been written; make it searchable.
            self.searchers = None;
            index.refresh()?;
            self.batch.clear();
        }
        self.batch.insert(term, entity_id);
        Ok(true)
    }
}

/// First two distinct entities holding a match for `query`, with the
/// value they share.
fn find_conflict(searchers: &[SearcherGuard], query: &Query) -> Result<Option<(Value, u64, u64)>> {
    let mut first: Option<(Value, u64)> = None;
    for searcher in searchers {
        for address in searcher.search(query) {
            let Some(doc) = searcher.doc(address) else {
                continue;
            };
            let entity = ValueCodec::entity_id(doc)?;
            match &first {
                None => first = Some((ValueCodec::decode(doc)?, entity)),
                Some((value, existing)) if *existing != entity => {
                    return Ok(Some((value.clone(), *existing, entity)));
                }
                Some(_) => {}
            }
        }
    }
    Ok(None)
}

/// An entity other than `entity_id` holding `value`, if any.
pub fn find_other_holder(
    searchers: &[SearcherGuard],
    value: &Value,
    entity_id: u64,
) -> Result<Option<u64>> {
    let query = ValueCodec::exact_query(value);
    for searcher in searchers {
        for address in searcher.search(&query) {
            let Some(doc) = searcher.doc(address) else {
                continue;
            };
            let holder = ValueCodec::entity_id(doc)?;
            if holder != entity_id {
                return Ok(Some(holder));
            }
        }
    }
    Ok(None)
}

/// Verify that each of `values` is held by at most one entity.
pub fn verify_values(searchers: &[SearcherGuard], values: &[Value]) -> Result<()> {
    for value in values {
        if let Some((value, existing, conflicting)) =
            find_conflict(searchers, &ValueCodec::exact_query(value))?
        {
            return Err(conflict(value, existing, conflicting));
        }
    }
    Ok(())
}

/// Verify the whole index: every value is held by at most one entity.
pub fn verify_deferred_constraints(searchers: &[SearcherGuard]) -> Result<()> {
    for field in VALUE_FIELDS {
        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        for searcher in searchers {
            for term in searcher.terms(field) {
                *counts.entry(term.text).or_default() += term.doc_freq;
            }
        }

        for (text, count) in counts {
            // One document per value is the expected count.
            if count <= 1 {
                continue;
            }
            if let Some((value, existing, conflicting)) =
                find_conflict(searchers, &Query::term(field, text))?
            {
                return Err(conflict(value, existing, conflicting));
            }
        }
    }
    Ok(())
}
