//! Property (schema) indexes.
//!
//! - `update`: update records applied to an index
//! - `reader`: point-in-time readers and the queries they answer
//! - `unique`: uniqueness checks for unique indexes
//! - `populator`: bulk population of a new index
//! - `accessor`: online updates and reads
//! - `sampler`: value distribution samples
//! - `index`: the per-index facade

pub mod accessor;
pub mod index;
pub mod populator;
pub mod reader;
pub mod sampler;
pub mod unique;
pub mod update;

pub use accessor::{IndexAccessor, IndexUpdateMode, IndexUpdater};
pub use index::{IndexDescriptor, SchemaIndex};
pub use populator::IndexPopulator;
pub use reader::{IndexQuery, IndexReader, PartitionedIndexReader, SimpleIndexReader};
pub use sampler::{IndexSample, IndexSampler};
pub use update::IndexUpdate;
