//! Bulk population of a new property index.
//!
//! Population writes through the single-writer capacity check instead of
//! reservations. Unique indexes check each value as it is added and can be
//! verified once more, in full, before the index is marked online.

use std::sync::Arc;

use crate::codec::value::ValueCodec;
use crate::error::{NodexError, Result};
use crate::partition::index::PartitionedIndex;
use crate::schema::accessor::{IndexUpdateMode, IndexUpdater, PartitionedIndexUpdater};
use crate::schema::reader::new_reader;
use crate::schema::sampler::IndexSample;
use crate::schema::unique::{UniqueValueChecker, verify_deferred_constraints};
use crate::schema::update::IndexUpdate;

#[derive(Debug)]
pub struct IndexPopulator {
    index: Arc<PartitionedIndex>,
    unique: Option<UniqueValueChecker>,
}

impl IndexPopulator {
    pub fn new(index: Arc<PartitionedIndex>, unique: bool) -> Self {
        let unique = unique.then(|| UniqueValueChecker::new(index.config().unique_batch_size));
        IndexPopulator { index, unique }
    }

    /// Create and open an empty index.
    pub fn create(&mut self) -> Result<()> {
        self.index.create()?;
        self.index.open()
    }

    /// Add scanned entries. Only [`IndexUpdate::Added`] is accepted.
    pub fn add(&mut self, updates: Vec<IndexUpdate>) -> Result<()> {
        let mut docs = Vec::with_capacity(updates.len());
        for update in updates {
            let (entity_id, value) = match update {
                IndexUpdate::Added { entity_id, value } => (entity_id, value),
                other => {
                    return Err(NodexError::invalid_argument(format!(
                        "population only accepts added entries, got {other:?}"
                    )));
                }
            };
            match &mut self.unique {
                Some(checker) => {
                    if checker.check(&self.index, entity_id, &value)? {
                        self.index
                            .add_population_documents(vec![ValueCodec::document(entity_id, &value)])?;
                    }
                }
                None => docs.push(ValueCodec::document(entity_id, &value)),
            }
        }
        if !docs.is_empty() {
            self.index.add_population_documents(docs)?;
        }
        Ok(())
    }

    /// Full uniqueness check over everything populated so far.
    pub fn verify_deferred_constraints(&self) -> Result<()> {
        if self.unique.is_none() {
            return Ok(());
        }
        self.index.refresh()?;
        verify_deferred_constraints(&self.index.acquire_searchers()?)
    }

    /// Updater for changes that happen while population is running. Adds
    /// replace any entry the scan already wrote for the same entity.
    pub fn new_populating_updater(&self) -> Result<Box<dyn IndexUpdater>> {
        self.index.check_writable()?;
        Ok(Box::new(PartitionedIndexUpdater::new(
            Arc::clone(&self.index),
            IndexUpdateMode::Recovery,
            self.unique.is_some(),
        )))
    }

    /// Sample the populated entries.
    pub fn sample_result(&self) -> Result<IndexSample> {
        let task = self.index.tasks().new_task()?;
        self.index.refresh()?;
        let reader = new_reader(self.index.acquire_searchers()?, self.unique.is_some());
        reader.sampler().sample(&task)
    }

    pub fn mark_as_failed(&self, failure: &str) -> Result<()> {
        self.index.mark_failed(failure)
    }

    /// Finish population. A successful one is committed and marked online
    /// before the index is closed.
    pub fn close(&mut self, populated: bool) -> Result<()> {
        if populated {
            self.index.flush(false)?;
            self.index.mark_online()?;
        }
        self.index.close()
    }

    pub fn drop(&self) -> Result<()> {
        self.index.drop_index()
    }
}
