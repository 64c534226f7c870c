//! Segment writer for creating new immutable segments
//!
//! A segment is written either from the mutable buffer on commit or from a
//! set of existing segments on merge. Both paths drop dead entries, renumber
//! the surviving documents densely and keep their versions, stored fields and
//! docvalues.

use std::collections::{BTreeMap, BTreeSet};
use std::io;

use roaring::RoaringBitmap;

use crate::error::{Result, SearchError};

use super::buffer::MutableBuffer;
use super::docno_map::DocNoMap;
use super::docvalues::DocValues;
use super::postings::{PostingsReader, PostingsWriter};
use super::reader::{SegmentFiles, SegmentMeta, SegmentReader};
use super::statistics::SegmentStatistics;
use super::stored::StoredFieldsTable;
use super::term_dict::TermDictionaryBuilder;
use super::types::{DocNo, DocNoEntry, Posting, SegmentId, Version};

/// How often (in terms) a merge checks for cancellation
const CANCEL_CHECK_INTERVAL: usize = 1024;

/// Result of writing a segment
pub struct SegmentWriteResult {
    /// The created segment reader
    pub reader: SegmentReader,
    /// Serialized files to persist
    pub files: SegmentFiles,
}

impl SegmentWriteResult {
    /// Checksum recorded in the manifest for this segment
    pub fn checksum(&self) -> u64 {
        self.files.checksum()
    }

    pub fn meta(&self) -> &SegmentMeta {
        self.reader.meta()
    }
}

/// Documents collected for a new segment, in docno order
#[derive(Default)]
struct SegmentParts {
    terms: BTreeMap<String, Vec<Posting>>,
    entries: Vec<DocNoEntry>,
    stats: SegmentStatistics,
    stored: StoredFieldsTable,
    docvalues: DocValues,
}

impl SegmentParts {
    /// Copy one document's per-doc data and return its new docno
    fn copy_document(
        &mut self,
        entry: DocNoEntry,
        old: DocNo,
        stats: &SegmentStatistics,
        stored: &StoredFieldsTable,
        docvalues: &DocValues,
    ) -> DocNo {
        let lengths: Vec<(&str, u32)> = stats
            .fields()
            .map(|field| (field, stats.field_length(field, old)))
            .collect();
        let docno = self.stats.add_document(lengths);
        self.entries.push(entry);
        self.stored
            .push(stored.get(old).cloned().unwrap_or_default());
        for field in docvalues.field_names() {
            if let Some(value) = docvalues.get(field, old) {
                self.docvalues.set(field, docno, value);
            }
        }
        docno
    }
}

/// Writer for creating new segments
pub struct SegmentWriter {
    segment_id: SegmentId,
}

impl SegmentWriter {
    pub fn new(segment_id: SegmentId) -> Self {
        Self { segment_id }
    }

    /// Write a segment from the live documents of a mutable buffer
    pub fn write_from_buffer(
        &self,
        buffer: &MutableBuffer,
        deleted: &RoaringBitmap,
    ) -> io::Result<SegmentWriteResult> {
        let mut parts = SegmentParts::default();
        let mut remap: Vec<Option<DocNo>> = Vec::with_capacity(buffer.entries().len());

        for (i, entry) in buffer.entries().iter().enumerate() {
            let old = DocNo::new(i as u32);
            if deleted.contains(old.as_u32()) {
                remap.push(None);
                continue;
            }
            let new = parts.copy_document(
                *entry,
                old,
                buffer.stats(),
                buffer.stored(),
                buffer.docvalues(),
            );
            remap.push(Some(new));
        }

        for (key, postings) in buffer.all_postings() {
            let live: Vec<Posting> = postings
                .iter()
                .filter_map(|p| {
                    remap
                        .get(p.docno.as_usize())
                        .copied()
                        .flatten()
                        .map(|docno| Posting::new(docno, p.positions.clone()))
                })
                .collect();
            if !live.is_empty() {
                parts.terms.insert(key.clone(), live);
            }
        }

        self.build(parts)
    }

    /// Merge the live documents of several segments into a new segment
    ///
    /// `sources` pairs each segment with its deleted docnos. Documents keep
    /// their relative order: all of the first segment, then the second, and
    /// so on.
    pub fn merge_segments<F>(
        &self,
        sources: &[(&SegmentReader, &RoaringBitmap)],
        is_cancelled: F,
    ) -> Result<SegmentWriteResult>
    where
        F: Fn() -> bool,
    {
        if sources.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "No segments to merge").into());
        }

        let mut parts = SegmentParts::default();
        let mut remaps: Vec<Vec<Option<DocNo>>> = Vec::with_capacity(sources.len());

        for (segment, deleted) in sources {
            let mut remap = vec![None; segment.doc_count() as usize];
            for (old, entry) in segment.docno_map().live_docs(deleted) {
                let new = parts.copy_document(
                    *entry,
                    old,
                    segment.stats(),
                    segment.stored(),
                    segment.docvalues(),
                );
                if let Some(slot) = remap.get_mut(old.as_usize()) {
                    *slot = Some(new);
                }
            }
            remaps.push(remap);
        }

        if is_cancelled() {
            return Err(SearchError::Cancelled);
        }

        let mut all_terms = BTreeSet::new();
        for (segment, _) in sources {
            for (key, _) in segment.terms().iter_terms() {
                all_terms.insert(key);
            }
        }

        for (n, key) in all_terms.into_iter().enumerate() {
            if n % CANCEL_CHECK_INTERVAL == 0 && is_cancelled() {
                return Err(SearchError::Cancelled);
            }

            let mut merged = Vec::new();
            for ((segment, _), remap) in sources.iter().zip(&remaps) {
                let Some(mut iter) = segment.get_postings(&key)? else {
                    continue;
                };
                while let Some((old, _)) = iter.next() {
                    if let Some(new) = remap.get(old.as_usize()).copied().flatten() {
                        merged.push(Posting::new(new, iter.positions()?.to_vec()));
                    }
                }
            }
            if !merged.is_empty() {
                parts.terms.insert(key, merged);
            }
        }

        Ok(self.build(parts)?)
    }

    fn build(&self, parts: SegmentParts) -> io::Result<SegmentWriteResult> {
        let mut postings_writer = PostingsWriter::new();
        let mut term_builder = TermDictionaryBuilder::with_capacity(parts.terms.len());

        for (key, postings) in parts.terms {
            postings_writer.start_posting_list();
            let doc_frequency = postings.len() as u32;
            let total_term_frequency = postings.iter().map(|p| p.term_frequency as u64).sum();
            for posting in postings {
                postings_writer.add_posting(posting);
            }
            let meta = postings_writer.finish_posting_list(doc_frequency, total_term_frequency);
            term_builder.add(key, meta);
        }

        let term_dict = term_builder.build()?;
        let max_version = parts
            .entries
            .iter()
            .map(|e| e.version)
            .max()
            .unwrap_or(Version::default());
        let doc_count = parts.entries.len() as u32;
        let docno_map = DocNoMap::from_entries(parts.entries);

        let files = SegmentFiles {
            postings: postings_writer.into_data(),
            terms_fst: term_dict.fst_bytes().to_vec(),
            terms_meta: bincode::serialize(term_dict.metadata())
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?,
            docs: docno_map.serialize(),
            stats: bincode::serialize(&parts.stats)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?,
            stored: parts.stored.serialize()?,
            docvalues: parts.docvalues.serialize()?,
        };

        let meta = SegmentMeta {
            id: self.segment_id,
            doc_count,
            size_bytes: files.size_bytes(),
            max_version,
            created_at: current_timestamp(),
        };

        let reader = SegmentReader::from_memory(
            meta,
            term_dict,
            PostingsReader::new(files.postings.clone()),
            docno_map,
            parts.stats,
            parts.stored,
            parts.docvalues,
        );

        Ok(SegmentWriteResult { reader, files })
    }
}

fn current_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
