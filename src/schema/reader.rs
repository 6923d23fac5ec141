//! Property index readers.
//!
//! A reader holds one pinned searcher per partition for its whole life, so
//! every call on it observes the same point in time. Single-partition
//! indexes get a [`SimpleIndexReader`]; larger ones a
//! [`PartitionedIndexReader`] that queries partitions in parallel.

use rayon::prelude::*;

use crate::codec::value::{Value, ValueCodec};
use crate::error::Result;
use crate::lexical::core::document::Document;
use crate::lexical::query::Query;
use crate::lexical::searcher::IndexSearcher;
use crate::partition::searcher::SearcherGuard;
use crate::schema::sampler::IndexSampler;

/// Queries a property index answers.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexQuery {
    /// Entities whose value equals this one.
    Exact(Value),
    /// Entities with a number inside the bounds. `None` leaves a side open.
    NumberRange {
        lower: Option<f64>,
        upper: Option<f64>,
        include_lower: bool,
        include_upper: bool,
    },
    /// Entities with a number outside the bounds.
    NotNumberRange {
        lower: Option<f64>,
        upper: Option<f64>,
        include_lower: bool,
        include_upper: bool,
    },
    StringPrefix(String),
    StringSuffix(String),
    /// Every indexed entity.
    Exists,
}

impl IndexQuery {
    pub fn exact(value: impl Into<Value>) -> Self {
        IndexQuery::Exact(value.into())
    }

    /// Numbers strictly below `upper`.
    pub fn less_than(upper: f64) -> Self {
        IndexQuery::NumberRange {
            lower: None,
            upper: Some(upper),
            include_lower: true,
            include_upper: false,
        }
    }

    /// The complement of this query among numbers. Other shapes have no
    /// complement and are returned unchanged.
    pub fn negate(self) -> Self {
        match self {
            IndexQuery::NumberRange {
                lower,
                upper,
                include_lower,
                include_upper,
            } => IndexQuery::NotNumberRange {
                lower,
                upper,
                include_lower,
                include_upper,
            },
            IndexQuery::NotNumberRange {
                lower,
                upper,
                include_lower,
                include_upper,
            } => IndexQuery::NumberRange {
                lower,
                upper,
                include_lower,
                include_upper,
            },
            other => other,
        }
    }

    pub fn to_query(&self) -> Query {
        match self {
            IndexQuery::Exact(value) => ValueCodec::exact_query(value),
            IndexQuery::NumberRange {
                lower,
                upper,
                include_lower,
                include_upper,
            } => ValueCodec::number_range(*lower, *upper, *include_lower, *include_upper),
            IndexQuery::NotNumberRange {
                lower,
                upper,
                include_lower,
                include_upper,
            } => ValueCodec::not_number_range(*lower, *upper, *include_lower, *include_upper),
            IndexQuery::StringPrefix(prefix) => ValueCodec::string_prefix(prefix),
            IndexQuery::StringSuffix(suffix) => ValueCodec::string_suffix(suffix),
            IndexQuery::Exists => ValueCodec::all_query(),
        }
    }
}

/// Read access to a property index.
pub trait IndexReader: Send + Sync {
    /// Ids of matching entities, ascending and distinct.
    fn query(&self, query: &IndexQuery) -> Result<Vec<u64>>;

    fn lookup(&self, value: &Value) -> Result<Vec<u64>> {
        self.query(&IndexQuery::Exact(value.clone()))
    }

    /// Documents indexing `value` for `entity_id`; more than one points at a
    /// duplicate entry.
    fn count_indexed_nodes(&self, entity_id: u64, value: &Value) -> Result<u64>;

    /// Every `(entity id, value)` entry, lazily.
    fn all_entries(&self) -> Box<dyn Iterator<Item = Result<(u64, Value)>> + '_>;

    fn sampler(&self) -> IndexSampler<'_>;
}

fn entity_ids(searcher: &IndexSearcher, query: &Query) -> Result<Vec<u64>> {
    searcher
        .search(query)
        .into_iter()
        .filter_map(|address| searcher.doc(address))
        .map(ValueCodec::entity_id)
        .collect()
}

fn entry(doc: &Document) -> Result<(u64, Value)> {
    Ok((ValueCodec::entity_id(doc)?, ValueCodec::decode(doc)?))
}

/// Reader over an index with a single partition.
#[derive(Debug)]
pub struct SimpleIndexReader {
    searcher: SearcherGuard,
    unique: bool,
}

impl SimpleIndexReader {
    pub fn new(searcher: SearcherGuard, unique: bool) -> Self {
        SimpleIndexReader { searcher, unique }
    }
}

impl IndexReader for SimpleIndexReader {
    fn query(&self, query: &IndexQuery) -> Result<Vec<u64>> {
        let mut ids = entity_ids(&self.searcher, &query.to_query())?;
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    fn count_indexed_nodes(&self, entity_id: u64, value: &Value) -> Result<u64> {
        Ok(self
            .searcher
            .count(&ValueCodec::entity_value_query(entity_id, value)) as u64)
    }

    fn all_entries(&self) -> Box<dyn Iterator<Item = Result<(u64, Value)>> + '_> {
        Box::new(self.searcher.live_docs().map(|(_, doc)| entry(doc)))
    }

    fn sampler(&self) -> IndexSampler<'_> {
        IndexSampler::new(vec![&*self.searcher], self.unique)
    }
}

/// Reader fanning out over every partition of an index.
#[derive(Debug)]
pub struct PartitionedIndexReader {
    searchers: Vec<SearcherGuard>,
    unique: bool,
}

impl PartitionedIndexReader {
    pub fn new(searchers: Vec<SearcherGuard>, unique: bool) -> Self {
        PartitionedIndexReader { searchers, unique }
    }
}

impl IndexReader for PartitionedIndexReader {
    fn query(&self, query: &IndexQuery) -> Result<Vec<u64>> {
        let query = query.to_query();
        let per_partition = self
            .searchers
            .par_iter()
            .map(|searcher| entity_ids(searcher, &query))
            .collect::<Result<Vec<_>>>()?;
        let mut ids: Vec<u64> = per_partition.into_iter().flatten().collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    fn count_indexed_nodes(&self, entity_id: u64, value: &Value) -> Result<u64> {
        let query = ValueCodec::entity_value_query(entity_id, value);
        Ok(self
            .searchers
            .par_iter()
            .map(|searcher| searcher.count(&query) as u64)
            .sum())
    }

    fn all_entries(&self) -> Box<dyn Iterator<Item = Result<(u64, Value)>> + '_> {
        Box::new(
            self.searchers
                .iter()
                .flat_map(|searcher| searcher.live_docs())
                .map(|(_, doc)| entry(doc)),
        )
    }

    fn sampler(&self) -> IndexSampler<'_> {
        IndexSampler::new(self.searchers.iter().map(|s| &**s).collect(), self.unique)
    }
}

/// The reader matching the number of partitions behind `searchers`.
pub fn new_reader(mut searchers: Vec<SearcherGuard>, unique: bool) -> Box<dyn IndexReader> {
    if searchers.len() == 1 {
        if let Some(searcher) = searchers.pop() {
            return Box::new(SimpleIndexReader::new(searcher, unique));
        }
    }
    Box::new(PartitionedIndexReader::new(searchers, unique))
}
