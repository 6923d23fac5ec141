//! Index writer.
//!
//! The writer buffers added documents in memory, cuts them into immutable
//! segments, applies deletions as copy-on-write bitmaps, and publishes
//! durable state through [`CommitPoint`]s. It is not safe for concurrent
//! mutation; callers serialize access (the partition layer keeps it behind
//! a mutex).
//!
//! Uncommitted changes become searchable through [`IndexWriter::snapshot`],
//! which flushes the buffer and returns an immutable view without writing
//! anything to disk.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use bit_vec::BitVec;
use chrono::Utc;

use crate::config::WriterConfig;
use crate::error::{NodexError, Result};
use crate::lexical::commit::CommitPoint;
use crate::lexical::core::document::Document;
use crate::lexical::core::term::Term;
use crate::lexical::query::Query;
use crate::lexical::searcher::{IndexSnapshot, SegmentView};
use crate::lexical::segment::{SegmentData, SegmentInfo, read_deletions, write_deletions};
use crate::storage::Storage;

/// Statistics about the writing process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriterStats {
    pub docs_added: u64,
    pub docs_deleted: u64,
    /// Buffers cut into in-memory segments.
    pub flushes: u64,
    pub commits: u64,
    pub force_merge_deletes_calls: u64,
    pub force_merge_calls: u64,
    /// Deleted documents physically removed by merges.
    pub docs_reclaimed: u64,
}

#[derive(Debug)]
struct SegmentEntry {
    info: SegmentInfo,
    data: Arc<SegmentData>,
    deleted: Arc<BitVec>,
    persisted: bool,
    deletes_dirty: bool,
}

impl SegmentEntry {
    fn deleted_count(&self) -> u32 {
        self.deleted.iter().filter(|d| *d).count() as u32
    }

    fn live_docs(&self) -> impl Iterator<Item = &Document> {
        self.data
            .docs()
            .iter()
            .enumerate()
            .filter(|(i, _)| !self.deleted.get(*i).unwrap_or(false))
            .map(|(_, d)| d)
    }
}

#[derive(Debug)]
struct PinnedCommit {
    count: usize,
    files: Vec<String>,
}

/// Single-threaded writer over one directory.
#[derive(Debug)]
pub struct IndexWriter {
    storage: Arc<dyn Storage>,
    config: WriterConfig,
    sync: bool,
    segments: Vec<SegmentEntry>,
    buffered: Vec<Document>,
    next_segment: u64,
    last_commit: CommitPoint,
    /// Bumped on every change visible to a snapshot.
    version: u64,
    committed_version: u64,
    pinned: BTreeMap<u64, PinnedCommit>,
    stats: WriterStats,
    closed: bool,
}

impl IndexWriter {
    /// Open a writer, creating an empty initial commit if the directory has
    /// none, and discard files no commit references.
    pub fn open(storage: Arc<dyn Storage>, config: WriterConfig, sync: bool) -> Result<Self> {
        let last_commit = match CommitPoint::read_latest(storage.as_ref())? {
            Some(commit) => commit,
            None => {
                let commit = CommitPoint::initial();
                commit.write(storage.as_ref(), sync)?;
                commit
            }
        };

        let mut segments = Vec::with_capacity(last_commit.segments.len());
        for info in &last_commit.segments {
            segments.push(SegmentEntry {
                data: Arc::new(SegmentData::read(storage.as_ref(), info)?),
                deleted: read_deletions(storage.as_ref(), info)?,
                info: info.clone(),
                persisted: true,
                deletes_dirty: false,
            });
        }

        let writer = IndexWriter {
            storage,
            config,
            sync,
            segments,
            buffered: Vec::new(),
            next_segment: last_commit.next_segment,
            last_commit,
            version: 0,
            committed_version: 0,
            pinned: BTreeMap::new(),
            stats: WriterStats::default(),
            closed: false,
        };
        writer.delete_unreferenced_files()?;

        log::debug!(
            "opened index writer at {:?}: generation {}, {} segments, {} docs",
            writer.storage.root(),
            writer.last_commit.generation,
            writer.segments.len(),
            writer.max_doc()
        );
        Ok(writer)
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            Err(NodexError::illegal_state("index writer is closed"))
        } else {
            Ok(())
        }
    }

    /// Add a document.
    pub fn add_document(&mut self, doc: Document) -> Result<()> {
        self.check_open()?;
        self.buffered.push(doc);
        self.version += 1;
        self.stats.docs_added += 1;
        if self.buffered.len() >= self.config.max_buffered_docs {
            self.flush_buffer();
        }
        Ok(())
    }

    pub fn add_documents<I: IntoIterator<Item = Document>>(&mut self, docs: I) -> Result<()> {
        for doc in docs {
            self.add_document(doc)?;
        }
        Ok(())
    }

    /// Atomically replace every document holding `term` with `doc`.
    ///
    /// No snapshot can observe the state between the delete and the add,
    /// since snapshots are taken through the same exclusive borrow.
    pub fn update_document(&mut self, term: &Term, doc: Document) -> Result<()> {
        self.check_open()?;
        self.delete_documents(term)?;
        self.add_document(doc)
    }

    /// Delete every document holding `term`. Returns how many were deleted.
    pub fn delete_documents(&mut self, term: &Term) -> Result<u64> {
        self.delete_by_query(&Query::Term(term.clone()))
    }

    /// Delete every document matching `query`. Returns how many were deleted.
    pub fn delete_by_query(&mut self, query: &Query) -> Result<u64> {
        self.check_open()?;

        let before = self.buffered.len();
        self.buffered.retain(|d| !query.matches_document(d));
        let mut deleted = (before - self.buffered.len()) as u64;

        for entry in &mut self.segments {
            let hits: Vec<u32> = query
                .matching_docs(&entry.data)
                .into_iter()
                .filter(|d| !entry.deleted.get(*d as usize).unwrap_or(false))
                .collect();
            if hits.is_empty() {
                continue;
            }
            let bits = Arc::make_mut(&mut entry.deleted);
            for doc in &hits {
                bits.set(*doc as usize, true);
            }
            entry.deletes_dirty = true;
            deleted += hits.len() as u64;
        }

        if deleted > 0 {
            self.version += 1;
            self.stats.docs_deleted += deleted;
        }
        Ok(deleted)
    }

    /// Cut the buffered documents into an in-memory segment.
    fn flush_buffer(&mut self) {
        if self.buffered.is_empty() {
            return;
        }
        let docs = std::mem::take(&mut self.buffered);
        self.push_segment(docs);
        self.stats.flushes += 1;
    }

    fn push_segment(&mut self, docs: Vec<Document>) {
        let name = format!("_{:06}", self.next_segment);
        self.next_segment += 1;
        let doc_count = docs.len() as u32;
        self.segments.push(SegmentEntry {
            info: SegmentInfo {
                name: name.clone(),
                doc_count,
                checksum: 0,
                del_gen: 0,
                del_count: 0,
                del_checksum: 0,
            },
            data: Arc::new(SegmentData::build(name, docs)),
            deleted: Arc::new(BitVec::from_elem(doc_count as usize, false)),
            persisted: false,
            deletes_dirty: false,
        });
    }

    /// A read view of everything written so far, committed or not.
    pub fn snapshot(&mut self) -> Arc<IndexSnapshot> {
        self.flush_buffer();
        let views = self
            .segments
            .iter()
            .map(|e| SegmentView {
                data: Arc::clone(&e.data),
                deleted: Arc::clone(&e.deleted),
            })
            .collect();
        Arc::new(IndexSnapshot::new(views, self.version))
    }

    /// Change counter; differs from a snapshot's version when the snapshot
    /// is stale.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn has_uncommitted_changes(&self) -> bool {
        self.version != self.committed_version
    }

    /// Documents addressed by this writer, deleted-but-unmerged included.
    pub fn max_doc(&self) -> u64 {
        self.segments
            .iter()
            .map(|e| e.info.doc_count as u64)
            .sum::<u64>()
            + self.buffered.len() as u64
    }

    /// Live documents.
    pub fn num_docs(&self) -> u64 {
        self.segments
            .iter()
            .map(|e| (e.info.doc_count - e.deleted_count()) as u64)
            .sum::<u64>()
            + self.buffered.len() as u64
    }

    /// Durably publish every change. `user_data` replaces the commit
    /// metadata; `None` carries the previous metadata forward.
    ///
    /// Returns the generation of the resulting commit.
    pub fn commit(&mut self, user_data: Option<BTreeMap<String, String>>) -> Result<u64> {
        self.check_open()?;
        self.flush_buffer();

        let metadata_changed = user_data
            .as_ref()
            .is_some_and(|d| *d != self.last_commit.user_data);
        if !self.has_uncommitted_changes() && !metadata_changed {
            return Ok(self.last_commit.generation);
        }

        // Segments without live documents are dropped rather than persisted.
        self.segments
            .retain(|e| e.deleted_count() < e.info.doc_count);

        let storage = Arc::clone(&self.storage);
        for entry in &mut self.segments {
            if !entry.persisted {
                entry.info.checksum = entry.data.write(storage.as_ref(), self.sync)?;
                entry.persisted = true;
            }
            if entry.deletes_dirty {
                entry.info.del_gen += 1;
                entry.info.del_count = entry.deleted_count();
                entry.info.del_checksum = write_deletions(
                    storage.as_ref(),
                    &entry.info.name,
                    entry.info.del_gen,
                    &entry.deleted,
                    self.sync,
                )?;
                entry.deletes_dirty = false;
            }
        }

        let commit = CommitPoint {
            generation: self.last_commit.generation + 1,
            segments: self.segments.iter().map(|e| e.info.clone()).collect(),
            user_data: user_data.unwrap_or_else(|| self.last_commit.user_data.clone()),
            next_segment: self.next_segment,
            committed_at: Utc::now(),
        };
        commit.write(storage.as_ref(), self.sync)?;

        log::debug!(
            "committed generation {} at {:?}: {} segments, {} docs",
            commit.generation,
            storage.root(),
            commit.segments.len(),
            commit.max_doc()
        );

        self.last_commit = commit;
        self.committed_version = self.version;
        self.stats.commits += 1;
        self.delete_unreferenced_files()?;
        Ok(self.last_commit.generation)
    }

    /// Rewrite every segment holding deletions into one segment of live
    /// documents. Returns the number of documents reclaimed.
    pub fn force_merge_deletes(&mut self) -> Result<u64> {
        self.check_open()?;
        self.stats.force_merge_deletes_calls += 1;
        self.flush_buffer();

        if !self.segments.iter().any(|e| e.deleted_count() > 0) {
            return Ok(0);
        }
        let (dirty, clean): (Vec<_>, Vec<_>) = std::mem::take(&mut self.segments)
            .into_iter()
            .partition(|e| e.deleted_count() > 0);
        self.segments = clean;
        Ok(self.merge_into_new_segment(dirty))
    }

    /// Merge the whole directory into a single segment without deletions.
    /// Returns the number of documents reclaimed.
    pub fn force_merge(&mut self) -> Result<u64> {
        self.check_open()?;
        self.stats.force_merge_calls += 1;
        self.flush_buffer();

        let has_deletions = self.segments.iter().any(|e| e.deleted_count() > 0);
        if self.segments.len() <= 1 && !has_deletions {
            return Ok(0);
        }
        let all = std::mem::take(&mut self.segments);
        Ok(self.merge_into_new_segment(all))
    }

    fn merge_into_new_segment(&mut self, merged: Vec<SegmentEntry>) -> u64 {
        let before: u64 = merged.iter().map(|e| e.info.doc_count as u64).sum();
        let live: Vec<Document> = merged
            .iter()
            .flat_map(|e| e.live_docs().cloned())
            .collect();
        let reclaimed = before - live.len() as u64;
        let merged_count = merged.len();
        if !live.is_empty() {
            self.push_segment(live);
        }

        self.version += 1;
        self.stats.docs_reclaimed += reclaimed;
        log::debug!(
            "merged {merged_count} segments at {:?}, reclaimed {reclaimed} deleted documents",
            self.storage.root()
        );
        reclaimed
    }

    /// Keep the files of the current commit on disk until
    /// [`unpin_commit`](Self::unpin_commit) is called with the returned
    /// generation. Returns the generation and its file names.
    pub fn pin_commit(&mut self) -> Result<(u64, Vec<String>)> {
        self.check_open()?;
        let generation = self.last_commit.generation;
        let files = self.last_commit.files();
        let pin = self
            .pinned
            .entry(generation)
            .or_insert_with(|| PinnedCommit {
                count: 0,
                files: files.clone(),
            });
        pin.count += 1;
        Ok((generation, files))
    }

    pub fn unpin_commit(&mut self, generation: u64) -> Result<()> {
        let released = match self.pinned.get_mut(&generation) {
            Some(pin) => {
                pin.count -= 1;
                pin.count == 0
            }
            None => false,
        };
        if released {
            self.pinned.remove(&generation);
            if !self.closed {
                self.delete_unreferenced_files()?;
            }
        }
        Ok(())
    }

    /// Remove engine files neither the current commit nor a pinned commit
    /// references. Files the engine did not create are left alone.
    fn delete_unreferenced_files(&self) -> Result<()> {
        let mut keep: HashSet<String> = self.last_commit.files().into_iter().collect();
        for pin in self.pinned.values() {
            keep.extend(pin.files.iter().cloned());
        }

        for file in self.storage.list_files()? {
            let ours = file.starts_with("commit_") || file.starts_with('_');
            if ours && !keep.contains(&file) {
                self.storage.delete_file(&file)?;
            }
        }
        Ok(())
    }

    /// Close the writer, committing pending changes first if asked to.
    pub fn close(&mut self, commit: bool) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        if commit {
            self.commit(None)?;
        }
        self.buffered.clear();
        self.closed = true;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn last_commit(&self) -> &CommitPoint {
        &self.last_commit
    }

    /// Metadata of the last commit.
    pub fn commit_user_data(&self) -> &BTreeMap<String, String> {
        &self.last_commit.user_data
    }

    pub fn stats(&self) -> &WriterStats {
        &self.stats
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexical::searcher::IndexSearcher;
    use crate::storage::{FileStorage, FileStorageConfig};
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> IndexWriter {
        let storage =
            FileStorage::open(FileStorageConfig::new(dir.path()).with_sync_writes(false)).unwrap();
        IndexWriter::open(Arc::new(storage), WriterConfig::default(), false).unwrap()
    }

    fn doc(id: i64, value: &str) -> Document {
        Document::new().with_long("id", id).with_text("string", value)
    }

    #[test]
    fn test_snapshot_is_isolated_from_later_writes() {
        let dir = TempDir::new().unwrap();
        let mut writer = open(&dir);
        writer.add_document(doc(1, "a")).unwrap();
        let before = IndexSearcher::new(writer.snapshot());

        writer
            .update_document(&Term::long("id", 1), doc(1, "b"))
            .unwrap();
        let after = IndexSearcher::new(writer.snapshot());

        assert_eq!(before.count(&Query::term("string", "a")), 1);
        assert_eq!(before.count(&Query::term("string", "b")), 0);
        assert_eq!(after.count(&Query::term("string", "a")), 0);
        assert_eq!(after.count(&Query::term("string", "b")), 1);
        assert!(after.snapshot().version() > before.snapshot().version());
    }

    #[test]
    fn test_buffered_documents_are_deleted_eagerly() {
        let dir = TempDir::new().unwrap();
        let mut writer = open(&dir);
        writer.add_document(doc(1, "a")).unwrap();
        writer.add_document(doc(2, "a")).unwrap();
        assert_eq!(writer.delete_documents(&Term::long("id", 1)).unwrap(), 1);
        assert_eq!(writer.max_doc(), 1);
        assert_eq!(writer.num_docs(), 1);
    }

    #[test]
    fn test_commit_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let mut writer = open(&dir);
            writer.add_document(doc(1, "a")).unwrap();
            writer.add_document(doc(2, "b")).unwrap();
            writer.commit(None).unwrap();
            writer.delete_documents(&Term::long("id", 1)).unwrap();
            let mut data = BTreeMap::new();
            data.insert("status".to_string(), "online".to_string());
            writer.commit(Some(data)).unwrap();
            // Uncommitted work is lost on close without commit.
            writer.add_document(doc(3, "c")).unwrap();
            writer.close(false).unwrap();
        }

        let mut writer = open(&dir);
        assert_eq!(
            writer.commit_user_data().get("status").map(String::as_str),
            Some("online")
        );
        let searcher = IndexSearcher::new(writer.snapshot());
        assert_eq!(searcher.num_docs(), 1);
        assert_eq!(searcher.max_doc(), 2);
        assert_eq!(searcher.count(&Query::term("string", "b")), 1);
    }

    #[test]
    fn test_force_merge_deletes_reclaims_slots() {
        let dir = TempDir::new().unwrap();
        let mut writer = open(&dir);
        for i in 0..10 {
            writer.add_document(doc(i, "v")).unwrap();
        }
        writer.commit(None).unwrap();
        for i in 0..4 {
            writer.delete_documents(&Term::long("id", i)).unwrap();
        }
        assert_eq!(writer.max_doc(), 10);

        assert_eq!(writer.force_merge_deletes().unwrap(), 4);
        assert_eq!(writer.max_doc(), 6);
        assert_eq!(writer.num_docs(), 6);
        assert_eq!(writer.stats().force_merge_deletes_calls, 1);

        // Nothing left to reclaim.
        assert_eq!(writer.force_merge_deletes().unwrap(), 0);
        assert_eq!(writer.stats().force_merge_deletes_calls, 2);
    }

    #[test]
    fn test_force_merge_collapses_segments() {
        let dir = TempDir::new().unwrap();
        let mut writer = open(&dir);
        for i in 0..3 {
            writer.add_document(doc(i, "v")).unwrap();
            writer.commit(None).unwrap();
        }
        writer.force_merge().unwrap();
        writer.commit(None).unwrap();
        assert_eq!(writer.last_commit().segments.len(), 1);
        assert_eq!(writer.num_docs(), 3);
    }

    #[test]
    fn test_pinned_commit_files_are_kept() {
        let dir = TempDir::new().unwrap();
        let mut writer = open(&dir);
        writer.add_document(doc(1, "a")).unwrap();
        writer.commit(None).unwrap();
        let (generation, files) = writer.pin_commit().unwrap();

        writer.force_merge_deletes().unwrap();
        writer.delete_documents(&Term::long("id", 1)).unwrap();
        writer.add_document(doc(2, "b")).unwrap();
        writer.commit(None).unwrap();

        for file in &files {
            assert!(writer.storage().file_exists(file), "{file} was deleted");
        }
        writer.unpin_commit(generation).unwrap();
        assert!(!writer.storage().file_exists(&CommitPoint::file_name(generation)));
    }

    #[test]
    fn test_closed_writer_rejects_writes() {
        let dir = TempDir::new().unwrap();
        let mut writer = open(&dir);
        writer.close(true).unwrap();
        assert!(matches!(
            writer.add_document(doc(1, "a")),
            Err(NodexError::IllegalState(_))
        ));
    }
}
