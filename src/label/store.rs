//! Label-scan store.
//!
//! Wraps a [`PartitionedIndex`] holding range documents. A store that was
//! just created, or whose previous rebuild never completed, reports that it
//! needs a rebuild; the caller feeds every node's labels through a writer
//! and then calls [`LabelScanStore::mark_rebuilt`].

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::LabelScanConfig;
use crate::error::{NodexError, Result};
use crate::label::reader::LabelScanReader;
use crate::label::writer::LabelScanWriter;
use crate::partition::index::{IndexState, PartitionedIndex, SnapshotFiles};
use crate::partition::store::PartitionStore;
use crate::storage::{DirectoryFactory, FileDirectoryFactory};

#[derive(Debug)]
pub struct LabelScanStore {
    index: Arc<PartitionedIndex>,
    config: LabelScanConfig,
}

impl LabelScanStore {
    /// A store in `folder` on the local filesystem.
    pub fn new<P: Into<PathBuf>>(folder: P, config: LabelScanConfig) -> Self {
        let factory = Arc::new(FileDirectoryFactory::new(config.index.sync_on_commit));
        Self::with_factory(folder, factory, config)
    }

    pub fn with_factory<P: Into<PathBuf>>(
        folder: P,
        factory: Arc<dyn DirectoryFactory>,
        config: LabelScanConfig,
    ) -> Self {
        let store = PartitionStore::new(folder, factory);
        LabelScanStore {
            index: Arc::new(PartitionedIndex::new(store, config.index.clone())),
            config,
        }
    }

    pub fn index(&self) -> &Arc<PartitionedIndex> {
        &self.index
    }

    /// Open the store, creating it first if it does not exist. Returns
    /// whether it has to be rebuilt from the graph.
    ///
    /// A store that recorded a failure cannot be rebuilt in place: `init`
    /// reports the failure and the store has to be dropped first.
    pub fn init(&self) -> Result<bool> {
        let created = if self.index.exists()? {
            false
        } else {
            self.index.create()?;
            true
        };
        self.index.open()?;
        if self.index.state() == IndexState::Failed {
            let failure = self.index.failure()?.unwrap_or_default();
            return Err(NodexError::illegal_state(format!(
                "label scan store at {:?} failed and must be dropped: {failure}",
                self.index.folder()
            )));
        }
        let needs_rebuild = created || !self.index.is_online();
        if needs_rebuild {
            log::info!("label scan store at {:?} needs a rebuild", self.index.folder());
        }
        Ok(needs_rebuild)
    }

    /// Record a completed rebuild.
    pub fn mark_rebuilt(&self) -> Result<()> {
        self.index.flush(false)?;
        self.index.mark_online()
    }

    pub fn new_writer(&self) -> Result<LabelScanWriter> {
        self.index.check_writable()?;
        Ok(LabelScanWriter::new(Arc::clone(&self.index), &self.config))
    }

    pub fn new_reader(&self) -> Result<LabelScanReader> {
        Ok(LabelScanReader::new(
            self.index.acquire_searchers()?,
            self.config.page_size,
        ))
    }

    /// Whether no range document exists.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.new_reader()?.all_node_labels().next().is_none())
    }

    /// Commit everything written so far.
    pub fn force(&self) -> Result<()> {
        self.index.flush(false)
    }

    pub fn is_valid(&self) -> bool {
        self.index.is_valid()
    }

    pub fn snapshot_files(&self) -> Result<SnapshotFiles> {
        self.index.snapshot_files()
    }

    pub fn shutdown(&self) -> Result<()> {
        self.index.close()
    }

    pub fn drop(&self) -> Result<()> {
        self.index.drop_index()
    }
}
