//! Directory abstraction the document engine reads and writes through.
//!
//! A [`Storage`] is a flat namespace of named files. Every index partition
//! owns exactly one.

pub mod file;

use std::fmt::Debug;
use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::Result;

pub use file::{FileStorage, FileStorageConfig};

/// Readable file handle.
pub trait StorageInput: Read + Seek + Send + Debug {
    /// Total length of the file in bytes.
    fn size(&self) -> Result<u64>;
}

/// Writable file handle.
pub trait StorageOutput: Write + Send + Debug {
    /// Flush buffered bytes and force them to stable storage.
    fn flush_and_sync(&mut self) -> Result<()>;
}

/// A flat directory of named files.
pub trait Storage: Send + Sync + Debug {
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>>;

    /// Create (or truncate) a file for writing.
    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>>;

    fn file_exists(&self, name: &str) -> bool;

    fn delete_file(&self, name: &str) -> Result<()>;

    /// Atomically replace `to` with `from`.
    fn rename(&self, from: &str, to: &str) -> Result<()>;

    fn list_files(&self) -> Result<Vec<String>>;

    /// Force directory metadata to stable storage.
    fn sync(&self) -> Result<()>;

    /// Root location, used to report absolute file paths for backups.
    fn root(&self) -> &Path;

    /// Absolute path of a file in this storage.
    fn file_path(&self, name: &str) -> PathBuf {
        self.root().join(name)
    }
}

/// Creates the storage backing one partition directory.
pub trait DirectoryFactory: Send + Sync + Debug {
    fn open(&self, path: &Path) -> Result<Arc<dyn Storage>>;
}

/// Opens partitions as plain directories on the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct FileDirectoryFactory {
    pub sync_writes: bool,
}

impl FileDirectoryFactory {
    pub fn new(sync_writes: bool) -> Self {
        FileDirectoryFactory { sync_writes }
    }
}

impl DirectoryFactory for FileDirectoryFactory {
    fn open(&self, path: &Path) -> Result<Arc<dyn Storage>> {
        let config = FileStorageConfig::new(path).with_sync_writes(self.sync_writes);
        Ok(Arc::new(FileStorage::open(config)?))
    }
}
