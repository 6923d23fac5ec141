//! Document-count ceiling of a partition.
//!
//! The document engine addresses at most [`MAX_PARTITION_DOCS`] documents
//! per directory, deleted-but-unmerged ones included. Concurrent inserters
//! reserve room before writing; a request that does not fit first tries to
//! reclaim deleted documents, then a full merge, and only then fails.
//!
//! [`MAX_PARTITION_DOCS`]: crate::config::MAX_PARTITION_DOCS

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::{NodexError, Result};
use crate::lexical::writer::IndexWriter;

/// Reservation counter against a fixed ceiling.
#[derive(Debug)]
pub struct CapacityGuard {
    max_docs: u64,
    reserved: AtomicU64,
}

impl CapacityGuard {
    pub fn new(max_docs: u64) -> Self {
        CapacityGuard {
            max_docs,
            reserved: AtomicU64::new(0),
        }
    }

    pub fn max_docs(&self) -> u64 {
        self.max_docs
    }

    /// Documents reserved but not yet released.
    pub fn reserved(&self) -> u64 {
        self.reserved.load(Ordering::Acquire)
    }

    fn try_reserve(&self, max_doc: u64, n: u64) -> bool {
        let mut current = self.reserved.load(Ordering::Acquire);
        loop {
            if current + max_doc + n > self.max_docs {
                return false;
            }
            match self.reserved.compare_exchange_weak(
                current,
                current + n,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Reserve room for `n` documents in the partition `writer` belongs to.
    ///
    /// The writer lock is held from reading `max_doc` until the counter is
    /// updated, so no other holder can turn its reservation into documents
    /// in between. The returned [`Reservation`] gives the room back when
    /// dropped, on the success and the failure path alike.
    pub fn reserve(self: &Arc<Self>, writer: &Mutex<IndexWriter>, n: u64) -> Result<Reservation> {
        let mut writer = writer.lock();
        if self.try_reserve(writer.max_doc(), n) {
            return Ok(self.reservation(n));
        }

        let reclaimed = writer.force_merge_deletes()?;
        log::info!(
            "partition at {:?} near its ceiling of {}, merged away {reclaimed} deleted documents",
            writer.storage().root(),
            self.max_docs
        );
        if self.try_reserve(writer.max_doc(), n) {
            return Ok(self.reservation(n));
        }

        let reclaimed = writer.force_merge()?;
        log::warn!(
            "partition at {:?} still full after merging deletes, full merge reclaimed {reclaimed}",
            writer.storage().root()
        );
        if self.try_reserve(writer.max_doc(), n) {
            return Ok(self.reservation(n));
        }

        Err(NodexError::CapacityExceeded {
            max_docs: self.max_docs,
            current_docs: writer.max_doc() + self.reserved(),
            requested: n,
        })
    }

    fn reservation(self: &Arc<Self>, count: u64) -> Reservation {
        Reservation {
            guard: Arc::clone(self),
            count,
        }
    }

    fn release(&self, n: u64) {
        self.reserved.fetch_sub(n, Ordering::AcqRel);
    }

    /// Ceiling check without reservation bookkeeping, for single-writer
    /// population.
    pub fn check(&self, max_doc: u64, n: u64) -> Result<()> {
        if max_doc + n > self.max_docs {
            return Err(NodexError::CapacityExceeded {
                max_docs: self.max_docs,
                current_docs: max_doc,
                requested: n,
            });
        }
        Ok(())
    }
}

/// Reserved room for a batch of documents.
#[derive(Debug)]
pub struct Reservation {
    guard: Arc<CapacityGuard>,
    count: u64,
}

impl Reservation {
    pub fn count(&self) -> u64 {
        self.count
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.guard.release(self.count);
    }
}
