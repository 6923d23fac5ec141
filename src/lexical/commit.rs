//! Commit points.
//!
//! A commit point names the exact set of segment and deletion files that
//! make up one durable state of a directory, plus free-form user metadata.
//! Commit files are written to a temporary name and renamed into place, so
//! a crash leaves either the previous or the new commit visible. The
//! highest generation present wins on open.

use std::collections::BTreeMap;
use std::io::{Read, Write};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{NodexError, Result};
use crate::lexical::segment::{SegmentData, SegmentInfo, read_deletions};
use crate::storage::Storage;

const COMMIT_PREFIX: &str = "commit_";
const COMMIT_SUFFIX: &str = ".json";

/// One durable state of a directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitPoint {
    pub generation: u64,
    pub segments: Vec<SegmentInfo>,
    #[serde(default)]
    pub user_data: BTreeMap<String, String>,
    /// Next free segment number.
    pub next_segment: u64,
    pub committed_at: DateTime<Utc>,
}

impl CommitPoint {
    /// The first commit of an empty directory.
    pub fn initial() -> Self {
        CommitPoint {
            generation: 1,
            segments: Vec::new(),
            user_data: BTreeMap::new(),
            next_segment: 1,
            committed_at: Utc::now(),
        }
    }

    pub fn file_name(generation: u64) -> String {
        format!("{COMMIT_PREFIX}{generation}{COMMIT_SUFFIX}")
    }

    /// Parse the generation out of a commit file name.
    pub fn parse_generation(file_name: &str) -> Option<u64> {
        file_name
            .strip_prefix(COMMIT_PREFIX)?
            .strip_suffix(COMMIT_SUFFIX)?
            .parse()
            .ok()
    }

    /// Highest commit generation present in the directory.
    pub fn latest_generation(storage: &dyn Storage) -> Result<Option<u64>> {
        Ok(storage
            .list_files()?
            .iter()
            .filter_map(|f| Self::parse_generation(f))
            .max())
    }

    pub fn read(storage: &dyn Storage, generation: u64) -> Result<Self> {
        let mut input = storage.open_input(&Self::file_name(generation))?;
        let mut json = Vec::new();
        input.read_to_end(&mut json)?;
        let commit: CommitPoint = serde_json::from_slice(&json).map_err(|e| {
            NodexError::corrupt(format!("commit {generation} is unreadable: {e}"))
        })?;
        if commit.generation != generation {
            return Err(NodexError::corrupt(format!(
                "commit file {generation} claims generation {}",
                commit.generation
            )));
        }
        Ok(commit)
    }

    pub fn read_latest(storage: &dyn Storage) -> Result<Option<Self>> {
        match Self::latest_generation(storage)? {
            Some(generation) => Ok(Some(Self::read(storage, generation)?)),
            None => Ok(None),
        }
    }

    /// Durably publish this commit.
    pub fn write(&self, storage: &dyn Storage, sync: bool) -> Result<()> {
        let name = Self::file_name(self.generation);
        let tmp = format!("{name}.tmp");
        let json = serde_json::to_vec_pretty(self)?;

        let mut output = storage.create_output(&tmp)?;
        output.write_all(&json)?;
        if sync {
            output.flush_and_sync()?;
        } else {
            output.flush()?;
        }
        drop(output);

        storage.rename(&tmp, &name)?;
        if sync {
            storage.sync()?;
        }
        Ok(())
    }

    /// Every file this commit needs, itself included.
    pub fn files(&self) -> Vec<String> {
        let mut files = vec![Self::file_name(self.generation)];
        for segment in &self.segments {
            files.extend(segment.files());
        }
        files
    }

    pub fn max_doc(&self) -> u64 {
        self.segments.iter().map(|s| s.doc_count as u64).sum()
    }

    pub fn num_docs(&self) -> u64 {
        self.segments.iter().map(|s| s.live_count() as u64).sum()
    }
}

/// Verify the latest commit of a directory and every file it references.
///
/// Returns the verified commit. Any missing file, checksum mismatch or
/// inconsistent count is reported as [`NodexError::CorruptIndex`].
pub fn check_integrity(storage: &dyn Storage) -> Result<CommitPoint> {
    let commit = CommitPoint::read_latest(storage)?
        .ok_or_else(|| NodexError::corrupt("no commit point found"))?;

    for info in &commit.segments {
        for file in info.files() {
            if !storage.file_exists(&file) {
                return Err(NodexError::corrupt(format!(
                    "commit {} references missing file {file}",
                    commit.generation
                )));
            }
        }
        SegmentData::read(storage, info)?;
        let deleted = read_deletions(storage, info)?;
        let counted = deleted.iter().filter(|d| *d).count() as u32;
        if counted != info.del_count {
            return Err(NodexError::corrupt(format!(
                "segment {} has {counted} deletions, commit says {}",
                info.name, info.del_count
            )));
        }
    }
    Ok(commit)
}
