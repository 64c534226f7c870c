//! Immutable segment reader
//!
//! A segment is fully loaded into memory on open. Each reader provides access
//! to postings, the term dictionary, the docno map, field-length statistics,
//! stored fields and numeric docvalues.

use std::io;

use serde::{Deserialize, Serialize};

use crate::models::StoredFields;

use super::docno_map::DocNoMap;
use super::docvalues::DocValues;
use super::postings::{PostingIterator, PostingsReader};
use super::statistics::SegmentStatistics;
use super::stored::StoredFieldsTable;
use super::term_dict::TermDictionary;
use super::types::{DocNo, DocumentId, PostingListMeta, SegmentId, Version};

/// Metadata for a segment stored in the manifest
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SegmentMeta {
    /// Unique segment identifier
    pub id: SegmentId,
    /// Number of documents in the segment, dead entries included
    pub doc_count: u32,
    /// Size in bytes (all segment files combined)
    pub size_bytes: u64,
    /// Highest document version in the segment
    pub max_version: Version,
    /// Creation timestamp (seconds since the epoch)
    pub created_at: u64,
}

pub const POSTINGS_FILE: &str = "postings.bin";
pub const TERMS_FST_FILE: &str = "terms.fst";
pub const TERMS_META_FILE: &str = "terms.meta";
pub const DOCS_FILE: &str = "docs.bin";
pub const STATS_FILE: &str = "stats.bin";
pub const STORED_FILE: &str = "stored.bin";
pub const DOCVALUES_FILE: &str = "docvalues.bin";

/// Serialized segment artifacts, one buffer per file
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SegmentFiles {
    pub postings: Vec<u8>,
    pub terms_fst: Vec<u8>,
    pub terms_meta: Vec<u8>,
    pub docs: Vec<u8>,
    pub stats: Vec<u8>,
    pub stored: Vec<u8>,
    pub docvalues: Vec<u8>,
}

impl SegmentFiles {
    /// `(file name, contents)` pairs in checksum order
    pub fn entries(&self) -> [(&'static str, &[u8]); 7] {
        [
            (POSTINGS_FILE, self.postings.as_slice()),
            (TERMS_FST_FILE, self.terms_fst.as_slice()),
            (TERMS_META_FILE, self.terms_meta.as_slice()),
            (DOCS_FILE, self.docs.as_slice()),
            (STATS_FILE, self.stats.as_slice()),
            (STORED_FILE, self.stored.as_slice()),
            (DOCVALUES_FILE, self.docvalues.as_slice()),
        ]
    }

    /// Mutable slot of a file by name
    pub fn slot_mut(&mut self, name: &str) -> Option<&mut Vec<u8>> {
        match name {
            POSTINGS_FILE => Some(&mut self.postings),
            TERMS_FST_FILE => Some(&mut self.terms_fst),
            TERMS_META_FILE => Some(&mut self.terms_meta),
            DOCS_FILE => Some(&mut self.docs),
            STATS_FILE => Some(&mut self.stats),
            STORED_FILE => Some(&mut self.stored),
            DOCVALUES_FILE => Some(&mut self.docvalues),
            _ => None,
        }
    }

    /// Checksum over all persisted segment artifacts.
    ///
    /// Algorithm: crc32fast (CRC32), in `entries()` order. The manifest
    /// checksum must match this value for both flush and merge paths.
    pub fn checksum(&self) -> u64 {
        let mut hasher = crc32fast::Hasher::new();
        for (_, data) in self.entries() {
            hasher.update(data);
        }
        hasher.finalize() as u64
    }

    pub fn size_bytes(&self) -> u64 {
        self.entries().iter().map(|(_, d)| d.len() as u64).sum()
    }
}

fn invalid_data<E>(e: E) -> io::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    io::Error::new(io::ErrorKind::InvalidData, e)
}

/// Immutable segment reader backed by in-memory data
pub struct SegmentReader {
    meta: SegmentMeta,
    terms: TermDictionary,
    postings: PostingsReader,
    docno_map: DocNoMap,
    stats: SegmentStatistics,
    stored: StoredFieldsTable,
    docvalues: DocValues,
}

impl std::fmt::Debug for SegmentReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentReader")
            .field("meta", &self.meta)
            .field("terms", &self.terms.len())
            .finish()
    }
}

impl SegmentReader {
    /// Create a segment reader from in-memory data
    pub fn from_memory(
        meta: SegmentMeta,
        terms: TermDictionary,
        postings: PostingsReader,
        docno_map: DocNoMap,
        stats: SegmentStatistics,
        stored: StoredFieldsTable,
        docvalues: DocValues,
    ) -> Self {
        Self {
            meta,
            terms,
            postings,
            docno_map,
            stats,
            stored,
            docvalues,
        }
    }

    /// Decode a segment from its serialized files
    pub fn from_files(meta: SegmentMeta, files: SegmentFiles) -> io::Result<Self> {
        let term_meta: Vec<PostingListMeta> =
            bincode::deserialize(&files.terms_meta).map_err(invalid_data)?;
        let terms = TermDictionary::new(files.terms_fst, term_meta)?;
        let docno_map = DocNoMap::deserialize(&files.docs)?;
        let stats: SegmentStatistics = bincode::deserialize(&files.stats).map_err(invalid_data)?;
        let stored = StoredFieldsTable::deserialize(&files.stored)?;
        let docvalues = DocValues::deserialize(&files.docvalues)?;

        if docno_map.len() != meta.doc_count as usize
            || stats.doc_count != meta.doc_count
            || stored.len() != meta.doc_count as usize
        {
            return Err(invalid_data(format!(
                "{} document counts disagree with manifest ({})",
                meta.id, meta.doc_count
            )));
        }

        Ok(Self::from_memory(
            meta,
            terms,
            PostingsReader::new(files.postings),
            docno_map,
            stats,
            stored,
            docvalues,
        ))
    }

    pub fn meta(&self) -> &SegmentMeta {
        &self.meta
    }

    pub fn id(&self) -> SegmentId {
        self.meta.id
    }

    /// Get the term dictionary
    pub fn terms(&self) -> &TermDictionary {
        &self.terms
    }

    /// Posting iterator for a dictionary entry of this segment
    pub fn postings(&self, meta: &PostingListMeta) -> io::Result<PostingIterator<'_>> {
        self.postings.get_postings(meta)
    }

    /// Posting iterator for a term key, if the term exists
    pub fn get_postings(&self, key: &str) -> io::Result<Option<PostingIterator<'_>>> {
        match self.terms.get(key) {
            Some(meta) => Ok(Some(self.postings.get_postings(meta)?)),
            None => Ok(None),
        }
    }

    pub fn docno_map(&self) -> &DocNoMap {
        &self.docno_map
    }

    pub fn get_doc_id(&self, docno: DocNo) -> Option<DocumentId> {
        self.docno_map.get_doc_id(docno)
    }

    /// Get segment statistics
    pub fn stats(&self) -> &SegmentStatistics {
        &self.stats
    }

    pub fn stored_fields(&self, docno: DocNo) -> Option<&StoredFields> {
        self.stored.get(docno)
    }

    pub fn stored(&self) -> &StoredFieldsTable {
        &self.stored
    }

    pub fn docvalues(&self) -> &DocValues {
        &self.docvalues
    }

    /// Get the number of documents (including dead entries)
    pub fn doc_count(&self) -> u32 {
        self.meta.doc_count
    }

    /// Get the number of unique terms
    pub fn term_count(&self) -> usize {
        self.terms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldValue;
    use crate::segment::{Posting, PostingsWriter, TermDictionaryBuilder};
    use crate::segment::types::term_key;

    fn create_test_files() -> (SegmentMeta, SegmentFiles) {
        let mut postings_writer = PostingsWriter::new();
        let mut term_builder = TermDictionaryBuilder::new();

        postings_writer.start_posting_list();
        postings_writer.add_posting(Posting::new(DocNo(0), vec![0, 3]));
        postings_writer.add_posting(Posting::new(DocNo(2), vec![1]));
        term_builder.add(term_key("body", "hello"), postings_writer.finish_posting_list(2, 3));

        postings_writer.start_posting_list();
        postings_writer.add_posting(Posting::new(DocNo(1), vec![0]));
        term_builder.add(term_key("body", "world"), postings_writer.finish_posting_list(1, 1));

        let terms = term_builder.build().unwrap();

        let docno_map = DocNoMap::from_entries(vec![
            crate::segment::DocNoEntry::new(100, Version(1)),
            crate::segment::DocNoEntry::new(200, Version(2)),
            crate::segment::DocNoEntry::new(300, Version(3)),
        ]);

        let mut stats = SegmentStatistics::new();
        let mut stored = StoredFieldsTable::new();
        let mut docvalues = DocValues::new();
        for (i, len) in [4u32, 1, 2].into_iter().enumerate() {
            let docno = stats.add_document([("body", len)]);
            let mut fields = StoredFields::new();
            fields.push("title", FieldValue::Text(format!("doc {}", i)));
            stored.push(fields);
            docvalues.set("rank", docno, i as f64);
        }

        let files = SegmentFiles {
            postings: postings_writer.into_data(),
            terms_fst: terms.fst_bytes().to_vec(),
            terms_meta: bincode::serialize(terms.metadata()).unwrap(),
            docs: docno_map.serialize(),
            stats: bincode::serialize(&stats).unwrap(),
            stored: stored.serialize().unwrap(),
            docvalues: docvalues.serialize().unwrap(),
        };
        let meta = SegmentMeta {
            id: SegmentId::new(1),
            doc_count: 3,
            size_bytes: files.size_bytes(),
            max_version: Version(3),
            created_at: 0,
        };
        (meta, files)
    }

    #[test]
    fn test_segment_reader_from_files() {
        let (meta, files) = create_test_files();
        let reader = SegmentReader::from_files(meta, files).unwrap();

        assert_eq!(reader.id(), SegmentId::new(1));
        assert_eq!(reader.doc_count(), 3);
        assert_eq!(reader.term_count(), 2);
        assert_eq!(reader.get_doc_id(DocNo(1)), Some(200));
        assert_eq!(reader.stats().field_length("body", DocNo(0)), 4);
        assert_eq!(reader.docvalues().get("rank", DocNo(2)), Some(2.0));
        assert_eq!(
            reader.stored_fields(DocNo(0)).unwrap().get("title"),
            Some(&FieldValue::Text("doc 0".into()))
        );

        let postings: Vec<_> = reader
            .get_postings(&term_key("body", "hello"))
            .unwrap()
            .unwrap()
            .collect();
        assert_eq!(postings, vec![(DocNo(0), 2), (DocNo(2), 1)]);
        assert!(reader.get_postings(&term_key("body", "missing")).unwrap().is_none());
    }

    #[test]
    fn test_checksum_covers_every_file() {
        let (_, files) = create_test_files();
        let original = files.checksum();

        for (name, _) in files.entries() {
            let mut changed = files.clone();
            if let Some(slot) = changed.slot_mut(name) {
                slot.push(0xFF);
            }
            assert_ne!(changed.checksum(), original, "{} not covered", name);
        }
    }

    #[test]
    fn test_mismatched_doc_count_is_rejected() {
        let (mut meta, files) = create_test_files();
        meta.doc_count = 5;
        let err = SegmentReader::from_files(meta, files).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
