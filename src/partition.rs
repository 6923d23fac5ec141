//! Partitioned index storage.
//!
//! One logical index spans one or more partitions, each a self-contained
//! directory with its own writer and searchers.
//!
//! - `store`: folder layout and partition allocation
//! - `failure`: the reserved failure marker file
//! - `capacity`: the per-partition document ceiling
//! - `searcher`: reference-counted searcher generations
//! - `index_partition`: one open partition
//! - `index`: lifecycle of the whole index

pub mod capacity;
pub mod failure;
pub mod index;
pub mod index_partition;
pub mod searcher;
pub mod store;

pub use capacity::{CapacityGuard, Reservation};
pub use failure::FailureStorage;
pub use index::{IndexState, PartitionedIndex, SnapshotFiles};
pub use index_partition::IndexPartition;
pub use searcher::{SearcherGuard, SearcherManager};
pub use store::{PartitionHandle, PartitionStore};
