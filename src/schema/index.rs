//! Property index facade.
//!
//! A [`SchemaIndex`] ties one index descriptor to its folder under the
//! index root, `<root>/<index id>/`, and hands out the populator used to
//! build it and the accessor used once it is online.

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::IndexConfig;
use crate::error::Result;
use crate::partition::index::{IndexState, PartitionedIndex};
use crate::partition::store::PartitionStore;
use crate::schema::accessor::IndexAccessor;
use crate::schema::populator::IndexPopulator;
use crate::schema::reader::new_reader;
use crate::schema::sampler::IndexSample;
use crate::storage::{DirectoryFactory, FileDirectoryFactory};

/// Identity and kind of a property index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub id: u64,
    pub unique: bool,
}

impl IndexDescriptor {
    pub fn general(id: u64) -> Self {
        IndexDescriptor { id, unique: false }
    }

    pub fn unique(id: u64) -> Self {
        IndexDescriptor { id, unique: true }
    }
}

#[derive(Debug, Clone)]
pub struct SchemaIndex {
    descriptor: IndexDescriptor,
    index: Arc<PartitionedIndex>,
}

impl SchemaIndex {
    /// An index on the local filesystem below `index_root`.
    pub fn new<P: AsRef<Path>>(index_root: P, descriptor: IndexDescriptor, config: IndexConfig) -> Self {
        let factory = Arc::new(FileDirectoryFactory::new(config.sync_on_commit));
        Self::with_factory(index_root, descriptor, factory, config)
    }

    pub fn with_factory<P: AsRef<Path>>(
        index_root: P,
        descriptor: IndexDescriptor,
        factory: Arc<dyn DirectoryFactory>,
        config: IndexConfig,
    ) -> Self {
        let folder: PathBuf = index_root.as_ref().join(descriptor.id.to_string());
        SchemaIndex {
            descriptor,
            index: Arc::new(PartitionedIndex::new(PartitionStore::new(folder, factory), config)),
        }
    }

    pub fn descriptor(&self) -> IndexDescriptor {
        self.descriptor
    }

    pub fn index(&self) -> &Arc<PartitionedIndex> {
        &self.index
    }

    pub fn state(&self) -> IndexState {
        self.index.state()
    }

    pub fn exists(&self) -> Result<bool> {
        self.index.exists()
    }

    pub fn is_valid(&self) -> bool {
        self.index.is_valid()
    }

    pub fn is_online(&self) -> bool {
        self.index.is_online()
    }

    pub fn open(&self) -> Result<()> {
        self.index.open()
    }

    /// Populator for a new index. Call [`IndexPopulator::create`] first.
    pub fn populator(&self) -> IndexPopulator {
        IndexPopulator::new(Arc::clone(&self.index), self.descriptor.unique)
    }

    /// Accessor over the index, opening it if needed.
    pub fn accessor(&self) -> Result<IndexAccessor> {
        if !self.index.is_open() {
            self.index.open()?;
        }
        Ok(IndexAccessor::new(Arc::clone(&self.index), self.descriptor.unique))
    }

    /// Sample the current contents as a cancellable background task.
    pub fn sample(&self) -> Result<IndexSample> {
        let task = self.index.tasks().new_task()?;
        let reader = new_reader(self.index.acquire_searchers()?, self.descriptor.unique);
        let sample = reader.sampler().sample(&task)?;
        log::debug!(
            "sampled index {}: {} entries, {} distinct",
            self.descriptor.id,
            sample.index_size,
            sample.unique_values
        );
        Ok(sample)
    }

    pub fn failure(&self) -> Result<Option<String>> {
        self.index.failure()
    }

    pub fn mark_failed(&self, failure: &str) -> Result<()> {
        self.index.mark_failed(failure)
    }

    pub fn close(&self) -> Result<()> {
        self.index.close()
    }

    pub fn drop(&self) -> Result<()> {
        self.index.drop_index()
    }
}
