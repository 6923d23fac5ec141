//! Label-scan index.
//!
//! Node-to-label membership packed into one document per node-id range,
//! holding one bitmap per label present in that range.
//!
//! - `bitmap`: range and bit arithmetic
//! - `format`: range documents and their queries
//! - `writer`: ordered, batched application of label changes
//! - `reader`: lazy scans over range documents
//! - `store`: the label-scan store over a partitioned index

pub mod bitmap;
pub mod format;
pub mod reader;
pub mod store;
pub mod writer;

pub use format::RangeDocument;
pub use reader::{LabelScanReader, NodeLabelRange};
pub use store::LabelScanStore;
pub use writer::{LabelScanWriter, NodeLabelUpdate};
