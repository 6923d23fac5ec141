//! Online access to a populated property index.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::codec::value::{Value, ValueCodec};
use crate::error::{NodexError, Result};
use crate::partition::index::{PartitionedIndex, SnapshotFiles};
use crate::schema::reader::{IndexReader, new_reader};
use crate::schema::unique::{find_other_holder, verify_deferred_constraints, verify_values};
use crate::schema::update::IndexUpdate;

/// How updates are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexUpdateMode {
    /// Normal transaction processing.
    Online,
    /// Replay after a crash. Updates may already be applied, so adds
    /// replace any document of the same entity.
    Recovery,
}

/// Applies a stream of updates to an index.
pub trait IndexUpdater: Send {
    fn process(&mut self, update: IndexUpdate) -> Result<()>;

    /// Make processed updates visible. Unique indexes verify the values
    /// touched by this updater and report a `ConstraintConflict`.
    fn close(&mut self) -> Result<()>;
}

/// Updater writing straight into a partitioned index.
///
/// On a unique index an online updater refuses a value another entity
/// already holds before writing it. A conflict with a concurrent updater
/// can only be seen on `close`; the entries this updater wrote for the
/// conflicting value are then deleted again before the error is returned.
#[derive(Debug)]
pub struct PartitionedIndexUpdater {
    index: Arc<PartitionedIndex>,
    mode: IndexUpdateMode,
    unique: bool,
    touched: Vec<(u64, Value)>,
    /// Writes not yet visible to searchers.
    dirty: bool,
    closed: bool,
}

impl PartitionedIndexUpdater {
    pub fn new(index: Arc<PartitionedIndex>, mode: IndexUpdateMode, unique: bool) -> Self {
        PartitionedIndexUpdater {
            index,
            mode,
            unique,
            touched: Vec::new(),
            dirty: false,
            closed: false,
        }
    }

    fn touch(&mut self, entity_id: u64, value: Value) {
        if self.unique {
            self.touched.push((entity_id, value));
        }
    }

    /// `Err(ConstraintConflict)` if another entity holds `value`.
    fn check_free(&mut self, entity_id: u64, value: &Value) -> Result<()> {
        if !self.unique || self.mode != IndexUpdateMode::Online {
            return Ok(());
        }
        if self.dirty {
            self.index.refresh()?;
            self.dirty = false;
        }
        let searchers = self.index.acquire_searchers()?;
        match find_other_holder(&searchers, value, entity_id)? {
            Some(existing) => Err(NodexError::ConstraintConflict {
                value: value.clone(),
                existing_entity: existing,
                conflicting_entity: entity_id,
            }),
            None => Ok(()),
        }
    }

    /// Delete the entries this updater wrote for `value`.
    fn roll_back(&self, value: &Value) -> Result<()> {
        for (entity_id, _) in self.touched.iter().filter(|(_, v)| v == value) {
            self.index
                .delete_by_query(&ValueCodec::entity_value_query(*entity_id, value))?;
        }
        self.index.refresh()?;
        log::warn!(
            "rolled back updates to {value} in {:?} after a uniqueness conflict",
            self.index.folder()
        );
        Ok(())
    }
}

impl IndexUpdater for PartitionedIndexUpdater {
    fn process(&mut self, update: IndexUpdate) -> Result<()> {
        if self.closed {
            return Err(NodexError::illegal_state("index updater is closed"));
        }
        match update {
            IndexUpdate::Added { entity_id, value } => {
                self.check_free(entity_id, &value)?;
                let doc = ValueCodec::document(entity_id, &value);
                match self.mode {
                    IndexUpdateMode::Online => self.index.add_documents(vec![doc])?,
                    IndexUpdateMode::Recovery => self
                        .index
                        .update_document(&ValueCodec::id_term(entity_id), doc)?,
                }
                self.touch(entity_id, value);
            }
            IndexUpdate::Changed {
                entity_id, after, ..
            } => {
                self.check_free(entity_id, &after)?;
                self.index.update_document(
                    &ValueCodec::id_term(entity_id),
                    ValueCodec::document(entity_id, &after),
                )?;
                self.touch(entity_id, after);
            }
            IndexUpdate::Removed { entity_id, .. } => {
                self.index.delete_documents(&ValueCodec::id_term(entity_id))?;
            }
        }
        self.dirty = true;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.index.refresh()?;
        self.dirty = false;
        if self.touched.is_empty() {
            return Ok(());
        }

        let values: Vec<Value> = self.touched.iter().map(|(_, v)| v.clone()).collect();
        let result = verify_values(&self.index.acquire_searchers()?, &values);
        if let Err(NodexError::ConstraintConflict { value, .. }) = &result {
            self.roll_back(value)?;
        }
        self.touched.clear();
        result
    }
}

/// Updates, reads and maintenance of an online index.
#[derive(Debug, Clone)]
pub struct IndexAccessor {
    index: Arc<PartitionedIndex>,
    unique: bool,
}

impl IndexAccessor {
    pub fn new(index: Arc<PartitionedIndex>, unique: bool) -> Self {
        IndexAccessor { index, unique }
    }

    pub fn new_updater(&self, mode: IndexUpdateMode) -> Result<Box<dyn IndexUpdater>> {
        self.index.check_writable()?;
        Ok(Box::new(PartitionedIndexUpdater::new(
            Arc::clone(&self.index),
            mode,
            self.unique,
        )))
    }

    /// A reader pinned to the current state of every partition.
    pub fn new_reader(&self) -> Result<Box<dyn IndexReader>> {
        Ok(new_reader(self.index.acquire_searchers()?, self.unique))
    }

    /// Commit all partitions.
    pub fn force(&self) -> Result<()> {
        self.index.flush(false)
    }

    pub fn refresh(&self) -> Result<()> {
        self.index.refresh()
    }

    /// Re-check uniqueness of the whole index.
    pub fn verify_deferred_constraints(&self) -> Result<()> {
        if !self.unique {
            return Ok(());
        }
        self.index.refresh()?;
        verify_deferred_constraints(&self.index.acquire_searchers()?)
    }

    pub fn snapshot_files(&self) -> Result<SnapshotFiles> {
        self.index.snapshot_files()
    }

    pub fn close(&self) -> Result<()> {
        self.index.close()
    }

    pub fn drop(&self) -> Result<()> {
        self.index.drop_index()
    }
}
