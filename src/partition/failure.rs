//! Failure marker file.
//!
//! Each index reserves a fixed-size file of zero bytes when it is created.
//! A failed population writes its failure text into it; all-zero content
//! means no failure. The file on disk is the only record of the failure.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Size of the reserved failure file.
pub const MAX_FAILURE_SIZE: usize = 16 * 1024;

/// File name of the failure marker inside an index folder.
pub const FAILURE_FILE_NAME: &str = "failure";

#[derive(Debug, Clone)]
pub struct FailureStorage {
    path: PathBuf,
}

impl FailureStorage {
    pub fn new(index_folder: &Path) -> Self {
        FailureStorage {
            path: index_folder.join(FAILURE_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the zero-filled file, replacing any previous content.
    pub fn reserve(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = File::create(&self.path)?;
        file.write_all(&[0u8; MAX_FAILURE_SIZE])?;
        file.sync_all()?;
        Ok(())
    }

    /// The stored failure text, if any. A missing file reads as no failure.
    pub fn load(&self) -> Result<Option<String>> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut bytes = Vec::with_capacity(MAX_FAILURE_SIZE);
        file.read_to_end(&mut bytes)?;

        let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
        if end == 0 {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&bytes[..end]).into_owned()))
    }

    /// Persist failure text, truncated so a terminating zero byte always fits.
    pub fn store(&self, failure: &str) -> Result<()> {
        let bytes = truncate_utf8(failure, MAX_FAILURE_SIZE - 1);
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)?;
        let mut buffer = vec![0u8; MAX_FAILURE_SIZE];
        buffer[..bytes.len()].copy_from_slice(bytes);
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&buffer)?;
        file.sync_all()?;
        log::warn!("index at {:?} marked as failed", self.path.parent());
        Ok(())
    }

    /// Zero the file, keeping it reserved.
    pub fn clear(&self) -> Result<()> {
        self.reserve()
    }
}

/// Longest prefix of `text` within `max` bytes that ends on a char boundary.
fn truncate_utf8(text: &str, max: usize) -> &[u8] {
    if text.len() <= max {
        return text.as_bytes();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text.as_bytes()[..end]
}
