//! On-disk layout of one logical index.
//!
//! ```text
//! <index folder>/
//!     failure                     reserved failure marker
//!     partition-1/ .. partition-N/
//! ```
//!
//! Partition folders are numbered from 1 without gaps.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{NodexError, Result};
use crate::partition::failure::FailureStorage;
use crate::storage::{DirectoryFactory, Storage};

const PARTITION_PREFIX: &str = "partition-";

/// One partition folder together with its opened storage.
#[derive(Debug, Clone)]
pub struct PartitionHandle {
    pub number: u32,
    pub path: PathBuf,
    pub storage: Arc<dyn Storage>,
}

/// Folder management for a partitioned index.
#[derive(Debug, Clone)]
pub struct PartitionStore {
    folder: PathBuf,
    factory: Arc<dyn DirectoryFactory>,
}

impl PartitionStore {
    pub fn new<P: Into<PathBuf>>(folder: P, factory: Arc<dyn DirectoryFactory>) -> Self {
        PartitionStore {
            folder: folder.into(),
            factory,
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn failure_storage(&self) -> FailureStorage {
        FailureStorage::new(&self.folder)
    }

    pub fn partition_folder(&self, number: u32) -> PathBuf {
        self.folder.join(format!("{PARTITION_PREFIX}{number}"))
    }

    /// Whether the index folder holds at least one partition.
    pub fn exists(&self) -> Result<bool> {
        Ok(!self.list_partition_folders()?.is_empty())
    }

    /// Prepare an empty index folder and reserve the failure marker.
    pub fn create(&self) -> Result<()> {
        if self.folder.exists() && fs::read_dir(&self.folder)?.next().is_some() {
            return Err(NodexError::illegal_state(format!(
                "index folder {:?} already exists and is not empty",
                self.folder
            )));
        }
        fs::create_dir_all(&self.folder)?;
        self.failure_storage().reserve()
    }

    /// Partition numbers and folders, ascending.
    pub fn list_partition_folders(&self) -> Result<Vec<(u32, PathBuf)>> {
        let entries = match fs::read_dir(&self.folder) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut folders = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let number = name
                .to_str()
                .and_then(|n| n.strip_prefix(PARTITION_PREFIX))
                .and_then(|n| n.parse::<u32>().ok());
            if let Some(number) = number {
                folders.push((number, entry.path()));
            }
        }
        folders.sort_by_key(|(number, _)| *number);

        for (expected, (number, _)) in (1u32..).zip(&folders) {
            if *number != expected {
                return Err(NodexError::corrupt(format!(
                    "partition folders of {:?} are not contiguous: found {number}, expected {expected}",
                    self.folder
                )));
            }
        }
        Ok(folders)
    }

    /// Open the storage of every existing partition.
    pub fn open(&self) -> Result<Vec<PartitionHandle>> {
        self.list_partition_folders()?
            .into_iter()
            .map(|(number, path)| self.open_partition(number, path))
            .collect()
    }

    /// Allocate the next partition folder.
    pub fn add_partition_folder(&self) -> Result<PartitionHandle> {
        let number = self.list_partition_folders()?.len() as u32 + 1;
        let path = self.partition_folder(number);
        fs::create_dir_all(&path)?;
        log::debug!("allocated partition folder {path:?}");
        self.open_partition(number, path)
    }

    fn open_partition(&self, number: u32, path: PathBuf) -> Result<PartitionHandle> {
        Ok(PartitionHandle {
            number,
            storage: self.factory.open(&path)?,
            path,
        })
    }

    /// Delete the whole index folder, failure marker included.
    pub fn cleanup(&self) -> Result<()> {
        match fs::remove_dir_all(&self.folder) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FileDirectoryFactory;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> PartitionStore {
        PartitionStore::new(
            dir.path().join("index-1"),
            Arc::new(FileDirectoryFactory::new(false)),
        )
    }

    #[test]
    fn test_partitions_are_numbered_sequentially() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert!(!store.exists().unwrap());

        store.create().unwrap();
        assert!(store.failure_storage().path().exists());
        assert_eq!(store.add_partition_folder().unwrap().number, 1);
        assert_eq!(store.add_partition_folder().unwrap().number, 2);

        let numbers: Vec<u32> = store.open().unwrap().iter().map(|h| h.number).collect();
        assert_eq!(numbers, vec![1, 2]);
        assert!(store.exists().unwrap());
    }

    #[test]
    fn test_create_refuses_non_empty_folder() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.create().unwrap();
        store.add_partition_folder().unwrap();
        assert!(matches!(store.create(), Err(NodexError::IllegalState(_))));
    }

    #[test]
    fn test_cleanup_removes_everything() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.create().unwrap();
        store.add_partition_folder().unwrap();
        store.cleanup().unwrap();
        assert!(!store.folder().exists());
        store.cleanup().unwrap();
    }

    #[test]
    fn test_gap_in_partitions_is_corruption() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.create().unwrap();
        fs::create_dir_all(store.partition_folder(2)).unwrap();
        assert!(matches!(
            store.list_partition_folders(),
            Err(NodexError::CorruptIndex(_))
        ));
    }
}
