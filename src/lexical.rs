//! Embedded document-index engine.
//!
//! A small inverted-index engine the partition layer is built on. It
//! offers schema-less documents of untokenized fields, term, prefix,
//! range and field-existence queries, immutable segments with per-commit
//! deletion bitmaps, and near-real-time snapshots of uncommitted writes.
//!
//! # Module Structure
//!
//! - `core`: documents, fields and terms
//! - `query`: query model and per-segment evaluation
//! - `segment`: immutable segment files and deletion bitmaps
//! - `commit`: durable commit points and integrity checking
//! - `writer`: the single-threaded index writer
//! - `searcher`: point-in-time snapshots and query execution

pub mod commit;
pub mod core;
pub mod query;
pub mod searcher;
pub mod segment;
pub mod writer;

pub use commit::{CommitPoint, check_integrity};
pub use core::document::Document;
pub use core::field::{Field, FieldValue};
pub use core::term::Term;
pub use query::{BooleanQuery, Query, TermRange};
pub use searcher::{DocAddress, IndexSearcher, IndexSnapshot, TermStats};
pub use writer::{IndexWriter, WriterStats};
