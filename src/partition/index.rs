//! Partitioned index lifecycle.
//!
//! A [`PartitionedIndex`] owns every partition of one logical index and
//! moves through these states:
//!
//! ```text
//! Closed --create--> Created --open--> Open --mark_online--> Online
//!    ^                                   |  \--mark_failed--> Failed
//!    +-------------- close --------------+
//! any --drop--> Dropped
//! ```
//!
//! Inserts go to the last partition. Reads and deletes visit all of them.
//! The partition list is copy-on-write so a query iterating it never sees
//! a partition half added. Structural operations serialize on the state
//! lock; document writes and reads do not hold it while they run.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::config::IndexConfig;
use crate::error::{NodexError, Result};
use crate::lexical::core::document::Document;
use crate::lexical::core::term::Term;
use crate::lexical::query::Query;
use crate::maintenance::coordinator::TaskCoordinator;
use crate::partition::index_partition::IndexPartition;
use crate::partition::searcher::SearcherGuard;
use crate::partition::store::PartitionStore;

/// Commit metadata key marking a completed population.
pub const ONLINE_KEY: &str = "status";
pub const ONLINE_VALUE: &str = "online";

/// Lifecycle state of a partitioned index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexState {
    /// Not opened by this process.
    Closed,
    /// Folders allocated, not yet opened.
    Created,
    /// Opened; population or updates in progress.
    Open,
    /// Population completed.
    Online,
    /// Population failed or a constraint was violated.
    Failed,
    /// Files deleted. Terminal.
    Dropped,
}

impl IndexState {
    fn is_open(self) -> bool {
        matches!(self, IndexState::Open | IndexState::Online | IndexState::Failed)
    }
}

impl fmt::Display for IndexState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

type PartitionList = Arc<Vec<Arc<IndexPartition>>>;

#[derive(Debug)]
pub struct PartitionedIndex {
    store: PartitionStore,
    config: IndexConfig,
    partitions: RwLock<PartitionList>,
    state: Mutex<IndexState>,
    tasks: Arc<TaskCoordinator>,
}

impl PartitionedIndex {
    pub fn new(store: PartitionStore, config: IndexConfig) -> Self {
        PartitionedIndex {
            store,
            config,
            partitions: RwLock::new(Arc::new(Vec::new())),
            state: Mutex::new(IndexState::Closed),
            tasks: Arc::new(TaskCoordinator::new()),
        }
    }

    pub fn state(&self) -> IndexState {
        *self.state.lock()
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn folder(&self) -> &Path {
        self.store.folder()
    }

    pub fn tasks(&self) -> &Arc<TaskCoordinator> {
        &self.tasks
    }

    pub fn is_read_only(&self) -> bool {
        self.config.read_only
    }

    pub fn exists(&self) -> Result<bool> {
        self.store.exists()
    }

    pub fn is_open(&self) -> bool {
        self.state().is_open()
    }

    pub fn is_online(&self) -> bool {
        self.state() == IndexState::Online
    }

    fn require_mutable(&self) -> Result<()> {
        if self.config.read_only {
            return Err(NodexError::illegal_state(format!(
                "index at {:?} is read-only",
                self.folder()
            )));
        }
        Ok(())
    }

    fn require_state(&self, state: IndexState, allowed: &[IndexState], op: &str) -> Result<()> {
        if allowed.contains(&state) {
            Ok(())
        } else {
            Err(NodexError::illegal_state(format!(
                "cannot {op} index at {:?} while it is {state}",
                self.folder()
            )))
        }
    }

    /// `Err(IllegalState)` unless documents may be written now.
    pub fn check_writable(&self) -> Result<()> {
        self.require_mutable()?;
        self.require_state(
            self.state(),
            &[IndexState::Open, IndexState::Online],
            "write to",
        )
    }

    pub fn check_readable(&self) -> Result<()> {
        self.require_state(self.state(), &[IndexState::Open, IndexState::Online], "read")
    }

    /// Allocate the index folder, the failure marker and the first partition.
    pub fn create(&self) -> Result<()> {
        let mut state = self.state.lock();
        self.require_state(*state, &[IndexState::Closed], "create")?;
        self.require_mutable()?;

        self.store.create()?;
        self.store.add_partition_folder()?;
        *state = IndexState::Created;
        log::info!("created index at {:?}", self.folder());
        Ok(())
    }

    /// Open every partition found on disk.
    pub fn open(&self) -> Result<()> {
        let mut state = self.state.lock();
        self.require_state(*state, &[IndexState::Closed, IndexState::Created], "open")?;

        let handles = self.store.open()?;
        if handles.is_empty() {
            return Err(NodexError::illegal_state(format!(
                "index at {:?} has no partitions",
                self.folder()
            )));
        }
        let opened = handles
            .into_iter()
            .map(|handle| IndexPartition::open(handle, &self.config).map(Arc::new))
            .collect::<Result<Vec<_>>>();
        let partitions = match opened {
            Ok(partitions) => partitions,
            Err(e @ NodexError::CorruptIndex(_)) => {
                // Corruption is never repaired in place; the index must be rebuilt.
                if !self.config.read_only {
                    self.store.failure_storage().store(&e.to_string())?;
                }
                *state = IndexState::Failed;
                log::warn!("index at {:?} is corrupt: {e}", self.folder());
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let online = partitions[0]
            .commit_user_data()
            .get(ONLINE_KEY)
            .is_some_and(|v| v == ONLINE_VALUE);
        let failed = self.store.failure_storage().load()?.is_some();

        let count = partitions.len();
        *self.partitions.write() = Arc::new(partitions);
        // A recorded failure outranks the online flag; only a rebuild clears it.
        *state = if failed {
            IndexState::Failed
        } else if online {
            IndexState::Online
        } else {
            IndexState::Open
        };
        log::info!(
            "opened index at {:?} with {count} partitions, {}",
            self.folder(),
            *state
        );
        Ok(())
    }

    /// Whether the index can be used as is. An open index is presumed
    /// valid; otherwise every partition's latest commit is verified.
    pub fn is_valid(&self) -> bool {
        if self.is_open() {
            return true;
        }
        let handles = match self.store.open() {
            Ok(handles) => handles,
            Err(e) => {
                log::warn!("index at {:?} is not valid: {e}", self.folder());
                return false;
            }
        };
        if handles.is_empty() {
            return false;
        }
        handles.iter().all(|handle| {
            match IndexPartition::check_integrity(handle.storage.as_ref()) {
                Ok(_) => true,
                Err(e) => {
                    log::warn!("partition {:?} failed its integrity check: {e}", handle.path);
                    false
                }
            }
        })
    }

    /// Cancel background tasks, wait for them, then delete every file.
    pub fn drop_index(&self) -> Result<()> {
        self.tasks.cancel();
        self.tasks.await_completion();

        let mut state = self.state.lock();
        if *state == IndexState::Dropped {
            return Ok(());
        }
        let partitions = std::mem::take(&mut *self.partitions.write());
        for partition in partitions.iter() {
            partition.close(false)?;
        }
        self.store.cleanup()?;
        *state = IndexState::Dropped;
        log::info!("dropped index at {:?}", self.folder());
        Ok(())
    }

    /// Commit every partition, merging each into one segment first if asked.
    pub fn flush(&self, merge: bool) -> Result<()> {
        let state = self.state.lock();
        self.require_mutable()?;
        self.require_state(*state, &[IndexState::Open, IndexState::Online], "flush")?;

        for partition in self.partitions().iter() {
            if merge {
                partition.force_merge()?;
            }
            partition.commit(None)?;
            partition.maybe_refresh();
        }
        Ok(())
    }

    /// Commit (unless read-only) and close every partition.
    pub fn close(&self) -> Result<()> {
        let mut state = self.state.lock();
        match *state {
            IndexState::Closed | IndexState::Created => return Ok(()),
            IndexState::Dropped => {
                return Err(NodexError::illegal_state(format!(
                    "index at {:?} was dropped",
                    self.folder()
                )));
            }
            _ => {}
        }

        let partitions = std::mem::take(&mut *self.partitions.write());
        let commit = !self.config.read_only;
        for partition in partitions.iter() {
            partition.close(commit)?;
        }
        *state = IndexState::Closed;
        log::debug!("closed index at {:?}", self.folder());
        Ok(())
    }

    /// Record a completed population in partition 1's commit metadata.
    pub fn mark_online(&self) -> Result<()> {
        let mut state = self.state.lock();
        self.require_state(*state, &[IndexState::Open, IndexState::Online], "mark online")?;
        self.require_mutable()?;
        if *state == IndexState::Online {
            return Ok(());
        }

        let partitions = self.partitions();
        for (i, partition) in partitions.iter().enumerate() {
            if i == 0 {
                let mut user_data = partition.commit_user_data();
                user_data.insert(ONLINE_KEY.to_string(), ONLINE_VALUE.to_string());
                partition.commit(Some(user_data))?;
            } else {
                partition.commit(None)?;
            }
        }
        self.store.failure_storage().clear()?;
        *state = IndexState::Online;
        log::info!("index at {:?} is online", self.folder());
        Ok(())
    }

    /// Persist failure text. An index that is not open keeps its state and
    /// opens as failed.
    pub fn mark_failed(&self, failure: &str) -> Result<()> {
        let mut state = self.state.lock();
        if *state == IndexState::Dropped {
            return Err(NodexError::illegal_state(format!(
                "cannot mark dropped index at {:?} as failed",
                self.folder()
            )));
        }
        self.store.failure_storage().store(failure)?;
        if matches!(
            *state,
            IndexState::Created | IndexState::Open | IndexState::Online
        ) {
            *state = IndexState::Failed;
        }
        Ok(())
    }

    /// Stored failure text, if the index ever failed.
    pub fn failure(&self) -> Result<Option<String>> {
        self.store.failure_storage().load()
    }

    /// Grow the index by one partition. Later inserts go to the new one.
    pub fn add_partition(&self) -> Result<Arc<IndexPartition>> {
        let state = self.state.lock();
        self.require_state(*state, &[IndexState::Open, IndexState::Online], "add a partition to")?;
        self.require_mutable()?;

        let handle = self.store.add_partition_folder()?;
        let partition = Arc::new(IndexPartition::open(handle, &self.config)?);

        let mut partitions = self.partitions.write();
        let mut next = Vec::with_capacity(partitions.len() + 1);
        next.extend(partitions.iter().cloned());
        next.push(Arc::clone(&partition));
        *partitions = Arc::new(next);

        log::info!(
            "added partition {} to index at {:?}",
            partition.number(),
            self.folder()
        );
        Ok(partition)
    }

    /// Snapshot of the partition list.
    pub fn partitions(&self) -> PartitionList {
        Arc::clone(&self.partitions.read())
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.read().len()
    }

    /// The partition new documents are added to.
    pub fn insertion_partition(&self) -> Result<Arc<IndexPartition>> {
        self.partitions()
            .last()
            .cloned()
            .ok_or_else(|| NodexError::illegal_state("index has no open partitions"))
    }

    /// Insert documents under a capacity reservation.
    pub fn add_documents(&self, docs: Vec<Document>) -> Result<()> {
        self.check_writable()?;
        self.insertion_partition()?.add_documents(docs)
    }

    /// Insert documents during population, with a plain ceiling check.
    pub fn add_population_documents(&self, docs: Vec<Document>) -> Result<()> {
        self.check_writable()?;
        self.insertion_partition()?.add_population_documents(docs)
    }

    /// Replace the documents holding `term` wherever they live with one
    /// document in the insertion partition.
    pub fn update_document(&self, term: &Term, doc: Document) -> Result<()> {
        self.check_writable()?;
        let partitions = self.partitions();
        let (last, others) = partitions
            .split_last()
            .ok_or_else(|| NodexError::illegal_state("index has no open partitions"))?;
        for partition in others {
            partition.delete_documents(term)?;
        }
        last.update_document(term, doc)
    }

    pub fn delete_documents(&self, term: &Term) -> Result<u64> {
        self.check_writable()?;
        let mut deleted = 0;
        for partition in self.partitions().iter() {
            deleted += partition.delete_documents(term)?;
        }
        Ok(deleted)
    }

    pub fn delete_by_query(&self, query: &Query) -> Result<u64> {
        self.check_writable()?;
        let mut deleted = 0;
        for partition in self.partitions().iter() {
            deleted += partition.delete_by_query(query)?;
        }
        Ok(deleted)
    }

    /// Refresh stale searchers without waiting on a concurrent refresh.
    pub fn maybe_refresh(&self) -> Result<bool> {
        self.check_readable()?;
        let mut refreshed = false;
        for partition in self.partitions().iter() {
            refreshed |= partition.maybe_refresh();
        }
        Ok(refreshed)
    }

    /// Make every write issued so far visible to new searchers.
    pub fn refresh(&self) -> Result<()> {
        self.check_readable()?;
        for partition in self.partitions().iter() {
            partition.refresh();
        }
        Ok(())
    }

    /// One pinned searcher per partition, in partition order.
    pub fn acquire_searchers(&self) -> Result<Vec<SearcherGuard>> {
        self.check_readable()?;
        Ok(self
            .partitions()
            .iter()
            .map(|p| p.acquire_searcher())
            .collect())
    }

    /// Addressed documents across partitions, deleted ones included.
    pub fn max_doc(&self) -> u64 {
        self.partitions().iter().map(|p| p.max_doc()).sum()
    }

    pub fn num_docs(&self) -> u64 {
        self.partitions().iter().map(|p| p.num_docs()).sum()
    }

    /// Pin the last commit of every partition and list its files for backup.
    pub fn snapshot_files(&self) -> Result<SnapshotFiles> {
        self.check_readable()?;
        let mut snapshot = SnapshotFiles {
            pins: Vec::new(),
            files: Vec::new(),
        };
        for partition in self.partitions().iter() {
            let (generation, files) = partition.pin_commit()?;
            snapshot.pins.push((Arc::clone(partition), generation));
            snapshot.files.extend(files);
        }
        Ok(snapshot)
    }
}

/// Files of pinned commits. They stay on disk until this is dropped.
#[derive(Debug)]
pub struct SnapshotFiles {
    pins: Vec<(Arc<IndexPartition>, u64)>,
    files: Vec<PathBuf>,
}

impl SnapshotFiles {
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

impl Drop for SnapshotFiles {
    fn drop(&mut self) {
        for (partition, generation) in &self.pins {
            if let Err(e) = partition.unpin_commit(*generation) {
                log::warn!(
                    "failed to release snapshot of partition {:?}: {e}",
                    partition.path()
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FileDirectoryFactory;
    use tempfile::TempDir;

    fn new_index(dir: &TempDir, config: IndexConfig) -> PartitionedIndex {
        let store = PartitionStore::new(
            dir.path().join("1"),
            Arc::new(FileDirectoryFactory::new(false)),
        );
        PartitionedIndex::new(store, config)
    }

    fn test_config() -> IndexConfig {
        IndexConfig {
            sync_on_commit: false,
            ..IndexConfig::default()
        }
    }

    fn doc(id: i64) -> Document {
        Document::new().with_long("id", id)
    }

    #[test]
    fn test_lifecycle_transitions() {
        let dir = TempDir::new().unwrap();
        let index = new_index(&dir, test_config());
        assert_eq!(index.state(), IndexState::Closed);
        assert!(matches!(index.mark_online(), Err(NodexError::IllegalState(_))));

        index.create().unwrap();
        assert_eq!(index.state(), IndexState::Created);
        assert!(index.add_documents(vec![doc(1)]).is_err());

        index.open().unwrap();
        assert_eq!(index.state(), IndexState::Open);
        index.add_documents(vec![doc(1)]).unwrap();
        index.mark_online().unwrap();
        assert!(index.is_online());
        index.close().unwrap();
        assert_eq!(index.state(), IndexState::Closed);
        assert!(index.is_valid());

        let reopened = new_index(&dir, test_config());
        reopened.open().unwrap();
        assert_eq!(reopened.state(), IndexState::Online);
        assert_eq!(reopened.num_docs(), 1);
    }

    #[test]
    fn test_failure_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let index = new_index(&dir, test_config());
        index.create().unwrap();
        index.open().unwrap();
        index.mark_failed("population failed").unwrap();
        assert_eq!(index.state(), IndexState::Failed);
        assert!(index.add_documents(vec![doc(1)]).is_err());
        index.close().unwrap();

        let reopened = new_index(&dir, test_config());
        reopened.open().unwrap();
        assert_eq!(reopened.state(), IndexState::Failed);
        assert_eq!(
            reopened.failure().unwrap().as_deref(),
            Some("population failed")
        );
    }

    #[test]
    fn test_failure_outranks_online_flag_on_reopen() {
        let dir = TempDir::new().unwrap();
        let index = new_index(&dir, test_config());
        index.create().unwrap();
        index.open().unwrap();
        index.add_documents(vec![doc(1)]).unwrap();
        index.mark_online().unwrap();
        index.mark_failed("corruption detected").unwrap();
        assert_eq!(index.state(), IndexState::Failed);
        index.close().unwrap();

        let reopened = new_index(&dir, test_config());
        reopened.open().unwrap();
        assert_eq!(reopened.state(), IndexState::Failed);
        assert!(reopened.add_documents(vec![doc(2)]).is_err());
        assert!(reopened.acquire_searchers().is_err());
    }

    #[test]
    fn test_update_moves_document_to_insertion_partition() {
        let dir = TempDir::new().unwrap();
        let index = new_index(&dir, test_config());
        index.create().unwrap();
        index.open().unwrap();
        index.add_documents(vec![doc(1), doc(2)]).unwrap();
        let second = index.add_partition().unwrap();
        assert_eq!(second.number(), 2);
        assert_eq!(index.partition_count(), 2);

        index
            .update_document(&Term::long("id", 1), doc(1).with_text("v", "new"))
            .unwrap();
        index.refresh().unwrap();

        let searchers = index.acquire_searchers().unwrap();
        assert_eq!(searchers[0].count(&Query::term("id", "1")), 0);
        assert_eq!(searchers[1].count(&Query::term("id", "1")), 1);
        assert_eq!(index.num_docs(), 2);
    }

    #[test]
    fn test_drop_deletes_folder() {
        let dir = TempDir::new().unwrap();
        let index = new_index(&dir, test_config());
        index.create().unwrap();
        index.open().unwrap();
        index.add_documents(vec![doc(1)]).unwrap();
        index.drop_index().unwrap();
        assert_eq!(index.state(), IndexState::Dropped);
        assert!(!index.folder().exists());
        assert!(!index.exists().unwrap());
        index.drop_index().unwrap();
        assert!(index.open().is_err());
    }

    #[test]
    fn test_read_only_rejects_mutation() {
        let dir = TempDir::new().unwrap();
        {
            let index = new_index(&dir, test_config());
            index.create().unwrap();
            index.open().unwrap();
            index.add_documents(vec![doc(1)]).unwrap();
            index.close().unwrap();
        }
        let index = new_index(&dir, test_config().into_read_only());
        index.open().unwrap();
        assert!(matches!(
            index.add_documents(vec![doc(2)]),
            Err(NodexError::IllegalState(_))
        ));
        assert!(index.delete_documents(&Term::long("id", 1)).is_err());
        assert!(index.add_partition().is_err());
        assert_eq!(index.acquire_searchers().unwrap()[0].num_docs(), 1);
    }

    #[test]
    fn test_corrupt_partition_is_not_valid() {
        let dir = TempDir::new().unwrap();
        let index = new_index(&dir, test_config());
        index.create().unwrap();
        index.open().unwrap();
        index.add_documents(vec![doc(1)]).unwrap();
        index.close().unwrap();
        assert!(index.is_valid());

        let partition = dir.path().join("1").join("partition-1");
        for entry in std::fs::read_dir(&partition).unwrap() {
            let path = entry.unwrap().path();
            if path.extension().is_some_and(|e| e == "seg") {
                std::fs::write(&path, b"garbage").unwrap();
            }
        }
        assert!(!index.is_valid());

        assert!(matches!(index.open(), Err(NodexError::CorruptIndex(_))));
        assert_eq!(index.state(), IndexState::Failed);
        assert!(index.failure().unwrap().is_some());
    }

    #[test]
    fn test_snapshot_files_are_pinned() {
        let dir = TempDir::new().unwrap();
        let index = new_index(&dir, test_config());
        index.create().unwrap();
        index.open().unwrap();
        index.add_documents(vec![doc(1)]).unwrap();
        index.flush(false).unwrap();

        let snapshot = index.snapshot_files().unwrap();
        assert!(!snapshot.files().is_empty());
        index.delete_documents(&Term::long("id", 1)).unwrap();
        index.add_documents(vec![doc(2)]).unwrap();
        index.flush(true).unwrap();
        for file in snapshot.files() {
            assert!(file.exists(), "{file:?} was deleted while pinned");
        }
        let pinned: Vec<PathBuf> = snapshot.files().to_vec();
        drop(snapshot);
        assert!(pinned.iter().any(|f| !f.exists()));
    }
}
