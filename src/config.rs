use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Highest number of documents one partition may address.
///
/// The underlying document engine counts documents with a signed 32-bit
/// integer and keeps 128 slots of headroom.
pub const MAX_PARTITION_DOCS: u64 = (i32::MAX as u64) - 128;

/// Configuration of the per-partition document writer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Documents buffered in memory before they are cut into a segment.
    #[serde(default = "default_max_buffered_docs")]
    pub max_buffered_docs: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        WriterConfig {
            max_buffered_docs: default_max_buffered_docs(),
        }
    }
}

fn default_max_buffered_docs() -> usize {
    10_000
}

/// Configuration of one logical index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default)]
    pub writer: WriterConfig,

    /// Document ceiling per partition. Lowered in tests to exercise the
    /// capacity guard.
    #[serde(default = "default_max_partition_docs")]
    pub max_partition_docs: u64,

    /// Bound of the in-memory value map used while populating a unique index.
    #[serde(default = "default_unique_batch_size")]
    pub unique_batch_size: usize,

    /// Reject every mutation.
    #[serde(default)]
    pub read_only: bool,

    /// fsync files written by a commit.
    #[serde(default = "default_true")]
    pub sync_on_commit: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig {
            writer: WriterConfig::default(),
            max_partition_docs: default_max_partition_docs(),
            unique_batch_size: default_unique_batch_size(),
            read_only: false,
            sync_on_commit: true,
        }
    }
}

impl IndexConfig {
    /// Parse a configuration embedded in a host's settings.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// A copy of this configuration that rejects mutations.
    pub fn into_read_only(mut self) -> Self {
        self.read_only = true;
        self
    }
}

fn default_max_partition_docs() -> u64 {
    MAX_PARTITION_DOCS
}

fn default_unique_batch_size() -> usize {
    1024
}

fn default_true() -> bool {
    true
}

/// Configuration of a label-scan store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelScanConfig {
    #[serde(default)]
    pub index: IndexConfig,

    /// Dirty ranges held before a flush is forced.
    #[serde(default = "default_max_batch_ranges")]
    pub max_batch_ranges: usize,

    /// Pending node updates held before a flush is forced.
    #[serde(default = "default_max_batch_updates")]
    pub max_batch_updates: usize,

    /// Range documents fetched per search round-trip when scanning.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for LabelScanConfig {
    fn default() -> Self {
        LabelScanConfig {
            index: IndexConfig::default(),
            max_batch_ranges: default_max_batch_ranges(),
            max_batch_updates: default_max_batch_updates(),
            page_size: default_page_size(),
        }
    }
}

fn default_max_batch_ranges() -> usize {
    1000
}

fn default_max_batch_updates() -> usize {
    10_000
}

fn default_page_size() -> usize {
    4096
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = IndexConfig::from_json(r#"{"max_partition_docs": 100}"#).unwrap();
        assert_eq!(config.max_partition_docs, 100);
        assert_eq!(config.unique_batch_size, 1024);
        assert_eq!(config.writer.max_buffered_docs, 10_000);
        assert!(!config.read_only);
        assert!(config.sync_on_commit);
    }

    #[test]
    fn test_default_ceiling() {
        assert_eq!(IndexConfig::default().max_partition_docs, 2_147_483_519);
    }
}
