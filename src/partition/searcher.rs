//! Reference-counted searcher generations.
//!
//! A [`SearcherManager`] keeps an arena of searcher generations keyed by a
//! monotonically increasing id. [`acquire`](SearcherManager::acquire) pins
//! the current generation and returns a guard; dropping the guard releases
//! it. A generation is freed once nobody holds it and a newer one has
//! become current.
//!
//! Readers only ever take the short arena lock. Refreshing takes the
//! writer lock long enough to cut a snapshot, never while a reader waits.

use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::lexical::searcher::IndexSearcher;
use crate::lexical::writer::IndexWriter;

#[derive(Debug)]
struct Generation {
    searcher: Arc<IndexSearcher>,
    refs: usize,
}

#[derive(Debug)]
struct Generations {
    current: u64,
    current_searcher: Arc<IndexSearcher>,
    entries: HashMap<u64, Generation>,
}

#[derive(Debug)]
pub struct SearcherManager {
    generations: Mutex<Generations>,
    refresh_lock: Mutex<()>,
}

impl SearcherManager {
    pub fn new(searcher: IndexSearcher) -> Self {
        let searcher = Arc::new(searcher);
        let mut entries = HashMap::new();
        entries.insert(
            0,
            Generation {
                searcher: Arc::clone(&searcher),
                refs: 0,
            },
        );
        SearcherManager {
            generations: Mutex::new(Generations {
                current: 0,
                current_searcher: searcher,
                entries,
            }),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Pin the current generation.
    pub fn acquire(self: &Arc<Self>) -> SearcherGuard {
        let mut generations = self.generations.lock();
        let current = generations.current;
        let searcher = Arc::clone(&generations.current_searcher);
        generations
            .entries
            .entry(current)
            .or_insert_with(|| Generation {
                searcher: Arc::clone(&searcher),
                refs: 0,
            })
            .refs += 1;
        SearcherGuard {
            manager: Arc::clone(self),
            generation: current,
            searcher,
        }
    }

    fn release(&self, generation: u64) {
        let mut generations = self.generations.lock();
        let current = generations.current;
        let freed = match generations.entries.get_mut(&generation) {
            Some(entry) => {
                entry.refs -= 1;
                entry.refs == 0 && generation != current
            }
            None => false,
        };
        if freed {
            generations.entries.remove(&generation);
        }
    }

    /// Install a new generation if the writer changed since the current
    /// one was cut. Returns `false` without waiting when another thread is
    /// already refreshing.
    pub fn maybe_refresh(&self, writer: &Mutex<IndexWriter>) -> bool {
        match self.refresh_lock.try_lock() {
            Some(_refreshing) => self.refresh_locked(writer),
            None => false,
        }
    }

    /// Like [`maybe_refresh`](Self::maybe_refresh), but waits for a
    /// concurrent refresh so that every write made before the call is
    /// visible to searchers acquired after it returns.
    pub fn refresh(&self, writer: &Mutex<IndexWriter>) -> bool {
        let _refreshing = self.refresh_lock.lock();
        self.refresh_locked(writer)
    }

    fn refresh_locked(&self, writer: &Mutex<IndexWriter>) -> bool {
        let current_version = self
            .generations
            .lock()
            .current_searcher
            .snapshot()
            .version();

        let snapshot = {
            let mut writer = writer.lock();
            if writer.version() == current_version {
                return false;
            }
            writer.snapshot()
        };

        let mut generations = self.generations.lock();
        let previous = generations.current;
        let next = previous + 1;
        let searcher = Arc::new(IndexSearcher::new(snapshot));
        generations.entries.insert(
            next,
            Generation {
                searcher: Arc::clone(&searcher),
                refs: 0,
            },
        );
        generations.current = next;
        generations.current_searcher = searcher;
        if generations.entries.get(&previous).is_some_and(|g| g.refs == 0) {
            generations.entries.remove(&previous);
        }
        true
    }

    /// Id of the generation handed out by `acquire`.
    pub fn current_generation(&self) -> u64 {
        self.generations.lock().current
    }

    /// Generations still held in the arena, the current one included.
    pub fn live_generations(&self) -> usize {
        self.generations.lock().entries.len()
    }
}

/// A pinned searcher generation, released on drop.
#[derive(Debug)]
pub struct SearcherGuard {
    manager: Arc<SearcherManager>,
    generation: u64,
    searcher: Arc<IndexSearcher>,
}

impl SearcherGuard {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Deref for SearcherGuard {
    type Target = IndexSearcher;

    fn deref(&self) -> &IndexSearcher {
        &self.searcher
    }
}

impl Drop for SearcherGuard {
    fn drop(&mut self) {
        self.manager.release(self.generation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WriterConfig;
    use crate::lexical::core::document::Document;
    use crate::lexical::query::Query;
    use crate::storage::{FileStorage, FileStorageConfig};
    use std::thread;
    use tempfile::TempDir;

    fn setup(dir: &TempDir) -> (Mutex<IndexWriter>, Arc<SearcherManager>) {
        let storage =
            FileStorage::open(FileStorageConfig::new(dir.path()).with_sync_writes(false)).unwrap();
        let mut writer =
            IndexWriter::open(Arc::new(storage), WriterConfig::default(), false).unwrap();
        let manager = Arc::new(SearcherManager::new(IndexSearcher::new(writer.snapshot())));
        (Mutex::new(writer), manager)
    }

    #[test]
    fn test_old_generation_freed_after_last_release() {
        let dir = TempDir::new().unwrap();
        let (writer, manager) = setup(&dir);

        let old = manager.acquire();
        writer
            .lock()
            .add_document(Document::new().with_long("id", 1))
            .unwrap();
        assert!(manager.maybe_refresh(&writer));
        assert_eq!(manager.live_generations(), 2);

        let new = manager.acquire();
        assert_eq!(old.count(&Query::MatchAll), 0);
        assert_eq!(new.count(&Query::MatchAll), 1);

        drop(old);
        assert_eq!(manager.live_generations(), 1);
        drop(new);
        assert_eq!(manager.live_generations(), 1);
    }

    #[test]
    fn test_refresh_without_changes_is_noop() {
        let dir = TempDir::new().unwrap();
        let (writer, manager) = setup(&dir);
        assert!(!manager.refresh(&writer));
        assert_eq!(manager.current_generation(), 0);
    }

    #[test]
    fn test_concurrent_acquire_and_refresh() {
        let dir = TempDir::new().unwrap();
        let (writer, manager) = setup(&dir);

        thread::scope(|scope| {
            scope.spawn(|| {
                for i in 0..200 {
                    writer
                        .lock()
                        .add_document(Document::new().with_long("id", i))
                        .unwrap();
                    manager.maybe_refresh(&writer);
                }
                manager.refresh(&writer);
            });
            for _ in 0..4 {
                scope.spawn(|| {
                    let mut last = 0;
                    for _ in 0..200 {
                        let searcher = manager.acquire();
                        let count = searcher.count(&Query::MatchAll);
                        assert!(count >= last);
                        last = count;
                    }
                });
            }
        });

        assert_eq!(manager.acquire().count(&Query::MatchAll), 200);
        assert_eq!(manager.live_generations(), 1);
    }
}
