//! # Nodex
//!
//! Property and label-scan index backend for an embedded graph database.
//!
//! ## Features
//!
//! - Partitioned indexes with online / failed lifecycle tracking
//! - Order-preserving value encoding with numeric ranges and suffix search
//! - Bitmap-packed node label storage
//! - Per-partition document ceiling with merge-before-fail reservations
//! - Reference-counted, non-blocking searcher refresh
//! - Uniqueness verification during population and online updates

pub mod codec;
pub mod config;
mod error;
pub mod label;
pub mod lexical;
pub mod maintenance;
pub mod partition;
pub mod schema;
pub mod storage;

// Re-exports for the public API
pub use codec::{ArrayValue, Value, ValueCodec};
pub use config::{IndexConfig, LabelScanConfig, WriterConfig};
pub use error::{NodexError, Result};
pub use label::{LabelScanReader, LabelScanStore, LabelScanWriter, NodeLabelUpdate};
pub use partition::{IndexState, PartitionedIndex, SnapshotFiles};
pub use schema::{
    IndexAccessor, IndexDescriptor, IndexPopulator, IndexQuery, IndexReader, IndexSample,
    IndexUpdate, IndexUpdateMode, IndexUpdater, SchemaIndex,
};
pub use storage::{DirectoryFactory, FileDirectoryFactory, Storage};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
