//! A single partition: one directory with its writer, searchers and
//! capacity guard.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::IndexConfig;
use crate::error::Result;
use crate::lexical::commit::{CommitPoint, check_integrity};
use crate::lexical::core::document::Document;
use crate::lexical::core::term::Term;
use crate::lexical::query::Query;
use crate::lexical::searcher::IndexSearcher;
use crate::lexical::writer::{IndexWriter, WriterStats};
use crate::partition::capacity::CapacityGuard;
use crate::partition::searcher::{SearcherGuard, SearcherManager};
use crate::partition::store::PartitionHandle;
use crate::storage::Storage;

#[derive(Debug)]
pub struct IndexPartition {
    number: u32,
    path: PathBuf,
    writer: Mutex<IndexWriter>,
    searchers: Arc<SearcherManager>,
    capacity: Arc<CapacityGuard>,
}

impl IndexPartition {
    pub fn open(handle: PartitionHandle, config: &IndexConfig) -> Result<Self> {
        let mut writer = IndexWriter::open(
            handle.storage,
            config.writer.clone(),
            config.sync_on_commit,
        )?;
        let searcher = IndexSearcher::new(writer.snapshot());
        Ok(IndexPartition {
            number: handle.number,
            path: handle.path,
            writer: Mutex::new(writer),
            searchers: Arc::new(SearcherManager::new(searcher)),
            capacity: Arc::new(CapacityGuard::new(config.max_partition_docs)),
        })
    }

    /// Verify the on-disk state of a partition that is not open.
    pub fn check_integrity(storage: &dyn Storage) -> Result<CommitPoint> {
        check_integrity(storage)
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn acquire_searcher(&self) -> SearcherGuard {
        self.searchers.acquire()
    }

    pub fn maybe_refresh(&self) -> bool {
        self.searchers.maybe_refresh(&self.writer)
    }

    pub fn refresh(&self) -> bool {
        self.searchers.refresh(&self.writer)
    }

    pub fn capacity(&self) -> &Arc<CapacityGuard> {
        &self.capacity
    }

    /// Add a batch under a capacity reservation.
    pub fn add_documents(&self, docs: Vec<Document>) -> Result<()> {
        let _reservation = self.capacity.reserve(&self.writer, docs.len() as u64)?;
        self.writer.lock().add_documents(docs)
    }

    /// Add a batch after a plain ceiling check. Population only.
    pub fn add_population_documents(&self, docs: Vec<Document>) -> Result<()> {
        let mut writer = self.writer.lock();
        self.capacity.check(writer.max_doc(), docs.len() as u64)?;
        writer.add_documents(docs)
    }

    /// Atomically replace the documents holding `term`.
    pub fn update_document(&self, term: &Term, doc: Document) -> Result<()> {
        let _reservation = self.capacity.reserve(&self.writer, 1)?;
        self.writer.lock().update_document(term, doc)
    }

    pub fn delete_documents(&self, term: &Term) -> Result<u64> {
        self.writer.lock().delete_documents(term)
    }

    pub fn delete_by_query(&self, query: &Query) -> Result<u64> {
        self.writer.lock().delete_by_query(query)
    }

    pub fn commit(&self, user_data: Option<BTreeMap<String, String>>) -> Result<u64> {
        self.writer.lock().commit(user_data)
    }

    pub fn force_merge(&self) -> Result<u64> {
        self.writer.lock().force_merge()
    }

    /// Metadata of the last commit.
    pub fn commit_user_data(&self) -> BTreeMap<String, String> {
        self.writer.lock().commit_user_data().clone()
    }

    pub fn max_doc(&self) -> u64 {
        self.writer.lock().max_doc()
    }

    pub fn num_docs(&self) -> u64 {
        self.writer.lock().num_docs()
    }

    /// Pin the current commit and list its files as absolute paths.
    pub fn pin_commit(&self) -> Result<(u64, Vec<PathBuf>)> {
        let mut writer = self.writer.lock();
        let (generation, files) = writer.pin_commit()?;
        let storage = Arc::clone(writer.storage());
        Ok((
            generation,
            files.iter().map(|f| storage.file_path(f)).collect(),
        ))
    }

    pub fn unpin_commit(&self, generation: u64) -> Result<()> {
        self.writer.lock().unpin_commit(generation)
    }

    pub fn close(&self, commit: bool) -> Result<()> {
        self.writer.lock().close(commit)
    }

    /// Writer counters, merge invocations included.
    pub fn writer_stats(&self) -> WriterStats {
        self.writer.lock().stats().clone()
    }
}
