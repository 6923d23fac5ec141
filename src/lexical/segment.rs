//! Immutable index segments.
//!
//! A segment is written once and never modified. Deletions against a
//! persisted segment are recorded in a separate bitmap file whose name
//! carries a deletion generation, so an older commit keeps pointing at the
//! bitmap it was taken with.
//!
//! File format (little endian):
//!
//! ```text
//! segment:   [u32 magic "NXSG"][u32 version][u32 doc_count]
//!            ([u32 len][json document])*[u32 crc32]
//! deletions: [u32 magic "NXDL"][u32 version][u32 bit_len][u32 byte_len]
//!            [bytes][u32 crc32]
//! ```
//!
//! The term dictionary is not persisted; it is rebuilt from the stored
//! documents when the segment is loaded.

use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};
use std::ops::Bound;
use std::sync::Arc;

use ahash::AHashMap;
use bit_vec::BitVec;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};

use crate::error::{NodexError, Result};
use crate::lexical::core::document::Document;
use crate::storage::Storage;

/// Magic number for segment files "NXSG".
pub const SEGMENT_MAGIC: u32 = 0x4753_584E;

/// Magic number for deletion bitmap files "NXDL".
pub const DELETES_MAGIC: u32 = 0x4C44_584E;

pub const FORMAT_VERSION: u32 = 1;

/// Metadata about one segment, recorded in every commit point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentInfo {
    /// Segment name, unique within the directory.
    pub name: String,

    /// Number of documents in the segment, deleted ones included.
    pub doc_count: u32,

    /// CRC32 of the segment file body.
    pub checksum: u32,

    /// Deletion generation; 0 means no deletion file.
    #[serde(default)]
    pub del_gen: u64,

    #[serde(default)]
    pub del_count: u32,

    #[serde(default)]
    pub del_checksum: u32,
}

impl SegmentInfo {
    pub fn file_name(&self) -> String {
        segment_file_name(&self.name)
    }

    pub fn deletes_file_name(&self) -> Option<String> {
        if self.del_gen == 0 {
            None
        } else {
            Some(deletes_file_name(&self.name, self.del_gen))
        }
    }

    /// Every file this segment needs on disk.
    pub fn files(&self) -> Vec<String> {
        let mut files = vec![self.file_name()];
        files.extend(self.deletes_file_name());
        files
    }

    pub fn live_count(&self) -> u32 {
        self.doc_count - self.del_count
    }
}

pub fn segment_file_name(name: &str) -> String {
    format!("{name}.seg")
}

pub fn deletes_file_name(name: &str, del_gen: u64) -> String {
    format!("{name}_{del_gen}.del")
}

/// The loaded, searchable contents of a segment.
#[derive(Debug)]
pub struct SegmentData {
    name: String,
    docs: Vec<Document>,
    /// field -> term text -> ascending local doc ids
    terms: BTreeMap<String, BTreeMap<String, Vec<u32>>>,
    /// field -> ascending local doc ids of documents carrying the field
    fields: AHashMap<String, Vec<u32>>,
}

impl SegmentData {
    /// Index a batch of documents in memory.
    pub fn build(name: impl Into<String>, docs: Vec<Document>) -> Self {
        let mut terms: BTreeMap<String, BTreeMap<String, Vec<u32>>> = BTreeMap::new();
        let mut fields: AHashMap<String, Vec<u32>> = AHashMap::new();

        for (doc_id, doc) in docs.iter().enumerate() {
            let doc_id = doc_id as u32;
            for name in doc.field_names() {
                fields.entry(name.to_string()).or_default().push(doc_id);
            }
            for (field, text) in doc.indexed_terms() {
                terms
                    .entry(field.to_string())
                    .or_default()
                    .entry(text)
                    .or_default()
                    .push(doc_id);
            }
        }

        SegmentData {
            name: name.into(),
            docs,
            terms,
            fields,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_doc(&self) -> u32 {
        self.docs.len() as u32
    }

    pub fn doc(&self, doc_id: u32) -> Option<&Document> {
        self.docs.get(doc_id as usize)
    }

    pub fn docs(&self) -> &[Document] {
        &self.docs
    }

    pub fn postings(&self, field: &str, text: &str) -> &[u32] {
        self.terms
            .get(field)
            .and_then(|t| t.get(text))
            .map(|p| p.as_slice())
            .unwrap_or(&[])
    }

    /// Iterate the terms of a field between two bounds, in term order.
    pub fn term_range<'a>(
        &'a self,
        field: &str,
        lower: Bound<&'a str>,
        upper: Bound<&'a str>,
    ) -> Box<dyn Iterator<Item = (&'a str, &'a [u32])> + 'a> {
        if let (Bound::Included(l) | Bound::Excluded(l), Bound::Included(u) | Bound::Excluded(u)) =
            (lower, upper)
        {
            // BTreeMap::range panics on inverted or empty-exclusive bounds.
            if l > u || (l == u && !matches!((lower, upper), (Bound::Included(_), Bound::Included(_)))) {
                return Box::new(std::iter::empty());
            }
        }
        match self.terms.get(field) {
            Some(dict) => Box::new(
                dict.range::<str, _>((lower, upper))
                    .map(|(t, p)| (t.as_str(), p.as_slice())),
            ),
            None => Box::new(std::iter::empty()),
        }
    }

    /// All terms of a field in order.
    pub fn terms(&self, field: &str) -> Box<dyn Iterator<Item = (&str, &[u32])> + '_> {
        self.term_range(field, Bound::Unbounded, Bound::Unbounded)
    }

    pub fn field_docs(&self, field: &str) -> &[u32] {
        self.fields.get(field).map(|p| p.as_slice()).unwrap_or(&[])
    }

    /// Persist the segment, returning its checksum.
    pub fn write(&self, storage: &dyn Storage, sync: bool) -> Result<u32> {
        let mut body = Vec::new();
        body.write_u32::<LittleEndian>(SEGMENT_MAGIC)?;
        body.write_u32::<LittleEndian>(FORMAT_VERSION)?;
        body.write_u32::<LittleEndian>(self.max_doc())?;
        for doc in &self.docs {
            let json = serde_json::to_vec(doc)?;
            body.write_u32::<LittleEndian>(json.len() as u32)?;
            body.write_all(&json)?;
        }
        write_checked(storage, &segment_file_name(&self.name), body, sync)
    }

    /// Load and verify a persisted segment.
    pub fn read(storage: &dyn Storage, info: &SegmentInfo) -> Result<Self> {
        let (body, checksum) = read_checked(storage, &info.file_name())?;
        if checksum != info.checksum {
            return Err(NodexError::corrupt(format!(
                "segment {} checksum {checksum:08x} does not match commit ({:08x})",
                info.name, info.checksum
            )));
        }

        let mut cursor = Cursor::new(body.as_slice());
        check_header(&mut cursor, SEGMENT_MAGIC, &info.name)?;
        let doc_count = cursor.read_u32::<LittleEndian>()?;
        if doc_count != info.doc_count {
            return Err(NodexError::corrupt(format!(
                "segment {} holds {doc_count} documents, commit says {}",
                info.name, info.doc_count
            )));
        }

        let mut docs = Vec::with_capacity(doc_count as usize);
        for _ in 0..doc_count {
            let len = cursor.read_u32::<LittleEndian>()? as usize;
            let mut json = vec![0u8; len];
            cursor.read_exact(&mut json)?;
            docs.push(serde_json::from_slice(&json)?);
        }

        Ok(SegmentData::build(info.name.clone(), docs))
    }
}

/// Persist a deletion bitmap, returning its checksum.
pub fn write_deletions(
    storage: &dyn Storage,
    name: &str,
    del_gen: u64,
    deleted: &BitVec,
    sync: bool,
) -> Result<u32> {
    let bytes = deleted.to_bytes();
    let mut body = Vec::with_capacity(bytes.len() + 16);
    body.write_u32::<LittleEndian>(DELETES_MAGIC)?;
    body.write_u32::<LittleEndian>(FORMAT_VERSION)?;
    body.write_u32::<LittleEndian>(deleted.len() as u32)?;
    body.write_u32::<LittleEndian>(bytes.len() as u32)?;
    body.write_all(&bytes)?;
    write_checked(storage, &deletes_file_name(name, del_gen), body, sync)
}

/// Load the deletion bitmap of a segment; all-live if it has none.
pub fn read_deletions(storage: &dyn Storage, info: &SegmentInfo) -> Result<Arc<BitVec>> {
    let Some(file) = info.deletes_file_name() else {
        return Ok(Arc::new(BitVec::from_elem(info.doc_count as usize, false)));
    };

    let (body, checksum) = read_checked(storage, &file)?;
    if checksum != info.del_checksum {
        return Err(NodexError::corrupt(format!(
            "deletion file {file} checksum {checksum:08x} does not match commit ({:08x})",
            info.del_checksum
        )));
    }

    let mut cursor = Cursor::new(body.as_slice());
    check_header(&mut cursor, DELETES_MAGIC, &file)?;
    let bit_len = cursor.read_u32::<LittleEndian>()? as usize;
    let byte_len = cursor.read_u32::<LittleEndian>()? as usize;
    let mut bytes = vec![0u8; byte_len];
    cursor.read_exact(&mut bytes)?;

    let mut deleted = BitVec::from_bytes(&bytes);
    deleted.truncate(bit_len);
    if deleted.len() != info.doc_count as usize {
        return Err(NodexError::corrupt(format!(
            "deletion file {file} covers {} documents, segment has {}",
            deleted.len(),
            info.doc_count
        )));
    }
    Ok(Arc::new(deleted))
}

fn check_header(cursor: &mut Cursor<&[u8]>, magic: u32, name: &str) -> Result<()> {
    let found = cursor.read_u32::<LittleEndian>()?;
    if found != magic {
        return Err(NodexError::corrupt(format!("{name}: bad magic {found:08x}")));
    }
    let version = cursor.read_u32::<LittleEndian>()?;
    if version != FORMAT_VERSION {
        return Err(NodexError::corrupt(format!(
            "{name}: unsupported format version {version}"
        )));
    }
    Ok(())
}

fn write_checked(storage: &dyn Storage, name: &str, mut body: Vec<u8>, sync: bool) -> Result<u32> {
    let checksum = crc32fast::hash(&body);
    body.write_u32::<LittleEndian>(checksum)?;

    let mut output = storage.create_output(name)?;
    output.write_all(&body)?;
    if sync {
        output.flush_and_sync()?;
    } else {
        output.flush()?;
    }
    Ok(checksum)
}

/// Read a whole file and verify its trailing checksum.
fn read_checked(storage: &dyn Storage, name: &str) -> Result<(Vec<u8>, u32)> {
    let mut input = storage.open_input(name)?;
    let mut bytes = Vec::new();
    input.read_to_end(&mut bytes)?;

    if bytes.len() < 4 {
        return Err(NodexError::corrupt(format!("{name} is truncated")));
    }
    let split = bytes.len() - 4;
    let stored = (&bytes[split..]).read_u32::<LittleEndian>()?;
    bytes.truncate(split);
    let actual = crc32fast::hash(&bytes);
    if stored != actual {
        return Err(NodexError::corrupt(format!(
            "{name} checksum mismatch: stored {stored:08x}, computed {actual:08x}"
        )));
    }
    Ok((bytes, actual))
}
