//! Index sampling.
//!
//! A sample summarises the value distribution of an index for the query
//! planner: how many entries it holds and how many of them are distinct.
//! Values are counted by enumerating the term dictionary of every value
//! field, so a sample costs one pass over the terms, not over documents.

use ahash::AHashSet;
use serde::{Deserialize, Serialize};

use crate::codec::value::VALUE_FIELDS;
use crate::error::Result;
use crate::lexical::searcher::IndexSearcher;
use crate::maintenance::coordinator::TaskHandle;

/// Terms visited between cancellation checks.
const CANCELLATION_CHECK_INTERVAL: usize = 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSample {
    /// Live entries in the index.
    pub index_size: u64,
    /// Distinct values among the sampled entries.
    pub unique_values: u64,
    /// Entries the sample was taken from.
    pub sample_size: u64,
}

/// Samples one point-in-time view of an index.
#[derive(Debug)]
pub struct IndexSampler<'a> {
    searchers: Vec<&'a IndexSearcher>,
    unique: bool,
}

impl<'a> IndexSampler<'a> {
    pub fn new(searchers: Vec<&'a IndexSearcher>, unique: bool) -> Self {
        IndexSampler { searchers, unique }
    }

    /// Take the sample, stopping early with `Cancelled` if `task` is.
    pub fn sample(&self, task: &TaskHandle) -> Result<IndexSample> {
        let index_size: u64 = self.searchers.iter().map(|s| s.num_docs()).sum();
        if self.unique {
            // Every value is distinct by construction.
            task.check()?;
            return Ok(IndexSample {
                index_size,
                unique_values: index_size,
                sample_size: index_size,
            });
        }

        let mut distinct: AHashSet<(&'static str, String)> = AHashSet::new();
        let mut visited = 0usize;
        for field in VALUE_FIELDS {
            for searcher in &self.searchers {
                for term in searcher.terms(field) {
                    visited += 1;
                    if visited % CANCELLATION_CHECK_INTERVAL == 0 {
                        task.check()?;
                    }
                    distinct.insert((field, term.text));
                }
            }
        }
        task.check()?;

        Ok(IndexSample {
            index_size,
            unique_values: distinct.len() as u64,
            sample_size: index_size,
        })
    }
}
