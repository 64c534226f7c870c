//! Core types for the segment-based index

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub use crate::models::DocumentId;

/// Segment identifier (monotonically increasing per index)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SegmentId(pub u64);

impl SegmentId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "segment_{}", self.0)
    }
}

/// Dense document number within a segment (0..max_doc)
/// This is used internally for efficient posting list storage
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocNo(pub u32);

impl DocNo {
    pub const MAX: DocNo = DocNo(u32::MAX);

    pub fn new(n: u32) -> Self {
        Self(n)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }

    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// Writer-wide sequence number assigned to every added document
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version(pub u64);

impl Version {
    pub fn new(v: u64) -> Self {
        Self(v)
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

/// Separator between field name and token in term dictionary keys
pub const TERM_SEPARATOR: char = '\0';

/// Build the dictionary key of a `(field, token)` term
pub fn term_key(field: &str, token: &str) -> String {
    let mut key = String::with_capacity(field.len() + token.len() + 1);
    key.push_str(field);
    key.push(TERM_SEPARATOR);
    key.push_str(token);
    key
}

/// Key prefix shared by every term of a field
pub fn field_prefix(field: &str) -> String {
    term_key(field, "")
}

/// Split a dictionary key back into `(field, token)`
pub fn split_term_key(key: &str) -> Option<(&str, &str)> {
    key.split_once(TERM_SEPARATOR)
}

/// A single posting entry within a posting list
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    /// Dense document number within the segment
    pub docno: DocNo,
    /// Term frequency in this document
    pub term_frequency: u32,
    /// Ascending word positions, one per occurrence
    pub positions: Vec<u32>,
}

impl Posting {
    pub fn new(docno: DocNo, positions: Vec<u32>) -> Self {
        Self {
            docno,
            term_frequency: positions.len() as u32,
            positions,
        }
    }
}

/// Block of postings
/// 128 docs per block
pub const BLOCK_SIZE: usize = 128;

/// A block of postings with skip data
#[derive(Clone, Debug, Default)]
pub struct PostingBlock {
    /// Document numbers (delta-encoded when serialized)
    pub docnos: Vec<DocNo>,
    /// Term frequencies
    pub term_frequencies: Vec<u32>,
    /// Positions of every posting, concatenated
    pub positions: Vec<u32>,
    /// Maximum document number in this block (for skip data)
    pub max_docno: DocNo,
}

impl PostingBlock {
    pub fn new() -> Self {
        Self {
            docnos: Vec::with_capacity(BLOCK_SIZE),
            term_frequencies: Vec::with_capacity(BLOCK_SIZE),
            positions: Vec::new(),
            max_docno: DocNo(0),
        }
    }

    pub fn is_full(&self) -> bool {
        self.docnos.len() >= BLOCK_SIZE
    }

    pub fn is_empty(&self) -> bool {
        self.docnos.is_empty()
    }

    pub fn len(&self) -> usize {
        self.docnos.len()
    }

    pub fn push(&mut self, posting: Posting) {
        if posting.docno > self.max_docno {
            self.max_docno = posting.docno;
        }
        self.docnos.push(posting.docno);
        self.term_frequencies.push(posting.term_frequency);
        self.positions.extend(posting.positions);
    }
}

/// Posting list metadata stored next to the term dictionary
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PostingListMeta {
    /// Offset in the postings file
    pub offset: u64,
    /// Length in bytes
    pub length: u64,
    /// Document frequency (number of documents containing this term)
    pub doc_frequency: u32,
    /// Total term frequency across all documents
    pub total_term_frequency: u64,
}

/// Entry in the document number mapping
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocNoEntry {
    /// External document ID
    pub doc_id: DocumentId,
    /// Document version
    pub version: Version,
}

impl DocNoEntry {
    pub fn new(doc_id: DocumentId, version: Version) -> Self {
        Self { doc_id, version }
    }
}

/// Version cutoffs of deleted documents
///
/// Every entry of a document whose version is at or below the cutoff is dead.
/// A document re-added later gets a higher version and stays live.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tombstones(BTreeMap<DocumentId, Version>);

impl Tombstones {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a cutoff, keeping the highest one per document
    pub fn insert(&mut self, doc_id: DocumentId, cutoff: Version) {
        let entry = self.0.entry(doc_id).or_insert(cutoff);
        if cutoff > *entry {
            *entry = cutoff;
        }
    }

    pub fn cutoff(&self, doc_id: DocumentId) -> Option<Version> {
        self.0.get(&doc_id).copied()
    }

    pub fn is_dead(&self, entry: &DocNoEntry) -> bool {
        self.0
            .get(&entry.doc_id)
            .map_or(false, |cutoff| entry.version <= *cutoff)
    }

    /// Fold every cutoff of `other` into this set
    pub fn extend(&mut self, other: &Tombstones) {
        for (doc_id, cutoff) in &other.0 {
            self.insert(*doc_id, *cutoff);
        }
    }

    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(DocumentId, Version) -> bool,
    {
        self.0.retain(|doc_id, cutoff| keep(*doc_id, *cutoff));
    }

    pub fn iter(&self) -> impl Iterator<Item = (DocumentId, Version)> + '_ {
        self.0.iter().map(|(d, v)| (*d, *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}
