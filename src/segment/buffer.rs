//! Mutable buffer for in-memory writes
//!
//! Documents are analyzed into the buffer on add and become visible only
//! once a commit flushes the buffer into an immutable segment.

use std::collections::HashMap;

use roaring::RoaringBitmap;

use crate::models::{FieldValue, StoredFields};
use crate::schema::{FieldKind, ResolvedDocument};
use crate::tokenizer::Analyzer;

use super::docvalues::DocValues;
use super::statistics::SegmentStatistics;
use super::stored::StoredFieldsTable;
use super::types::{term_key, DocNo, DocNoEntry, DocumentId, Posting, Tombstones, Version};

/// Configuration for buffer flush triggers
#[derive(Clone, Debug)]
pub struct BufferConfig {
    /// Commit when document count reaches this
    pub max_docs: usize,
    /// Commit when the approximate buffer size reaches this (bytes)
    pub max_bytes: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_docs: 10_000,
            // 64MB
            max_bytes: 64 * 1024 * 1024,
        }
    }
}

impl BufferConfig {
    pub fn with_max_docs(mut self, max_docs: usize) -> Self {
        self.max_docs = max_docs;
        self
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }
}

/// Single term emitted for a keyword value
fn keyword_token(value: &FieldValue) -> String {
    match value {
        FieldValue::Text(s) | FieldValue::Keyword(s) => s.clone(),
        FieldValue::Number(n) => format!("{}", n),
    }
}

/// In-memory mutable buffer for recent writes
///
/// This holds indexed data before it is flushed to an immutable segment.
#[derive(Debug, Default)]
pub struct MutableBuffer {
    /// Term key to postings, in docno order
    terms: HashMap<String, Vec<Posting>>,
    /// DocNo to (doc_id, version)
    entries: Vec<DocNoEntry>,
    /// Document ID to the docnos holding it
    by_doc_id: HashMap<DocumentId, Vec<DocNo>>,
    stats: SegmentStatistics,
    stored: StoredFieldsTable,
    docvalues: DocValues,
    /// Approximate size in bytes
    size_bytes: usize,
}

impl MutableBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Analyze a resolved document into the buffer
    ///
    /// Returns the assigned DocNo for this document.
    pub fn index_document(
        &mut self,
        doc: &ResolvedDocument,
        analyzer: &Analyzer,
        version: Version,
    ) -> DocNo {
        let mut field_terms: Vec<(&str, HashMap<String, Vec<u32>>)> = Vec::new();
        let mut lengths: Vec<(&str, u32)> = Vec::new();
        let mut numbers: Vec<(&str, f64)> = Vec::new();
        let mut stored = StoredFields::new();

        for field in &doc.fields {
            if field.usage.is_indexed() {
                match field.kind {
                    FieldKind::Text => {
                        let text = field.value.as_str().unwrap_or_default();
                        let (positions, length) = analyzer.term_positions(text);
                        lengths.push((field.name.as_str(), length));
                        field_terms.push((field.name.as_str(), positions));
                    }
                    FieldKind::Keyword => {
                        let mut positions = HashMap::with_capacity(1);
                        positions.insert(keyword_token(&field.value), vec![0]);
                        lengths.push((field.name.as_str(), 1));
                        field_terms.push((field.name.as_str(), positions));
                    }
                    FieldKind::Numeric => {
                        if let Some(n) = field.value.as_number() {
                            numbers.push((field.name.as_str(), n));
                        }
                    }
                }
            }
            if field.usage.is_stored() {
                self.size_bytes += field.name.len() + std::mem::size_of::<FieldValue>();
                if let Some(s) = field.value.as_str() {
                    self.size_bytes += s.len();
                }
                stored.push(field.name.clone(), field.value.clone());
            }
        }

        let docno = self.stats.add_document(lengths);
        self.entries.push(DocNoEntry::new(doc.id, version));
        self.by_doc_id.entry(doc.id).or_default().push(docno);
        self.stored.push(stored);

        for (field, n) in numbers {
            self.size_bytes += std::mem::size_of::<f64>();
            self.docvalues.set(field, docno, n);
        }

        for (field, positions) in field_terms {
            for (token, positions) in positions {
                let key = term_key(field, &token);
                self.size_bytes +=
                    std::mem::size_of::<Posting>() + key.len() + positions.len() * 4;
                self.terms
                    .entry(key)
                    .or_default()
                    .push(Posting::new(docno, positions));
            }
        }

        docno
    }

    /// Entries buffered for `doc_id`
    pub fn entries_of(&self, doc_id: DocumentId) -> impl Iterator<Item = &DocNoEntry> + '_ {
        self.by_doc_id
            .get(&doc_id)
            .into_iter()
            .flatten()
            .filter_map(move |docno| self.entries.get(docno.as_usize()))
    }

    /// Whether any buffered entry for `doc_id` has a version at or below `cutoff`
    pub fn has_version_at_most(&self, doc_id: DocumentId, cutoff: Version) -> bool {
        self.entries_of(doc_id).any(|e| e.version <= cutoff)
    }

    /// Docnos killed by the tombstone set
    pub fn deleted_by(&self, tombstones: &Tombstones) -> RoaringBitmap {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| tombstones.is_dead(entry))
            .map(|(i, _)| i as u32)
            .collect()
    }

    /// Get postings for a term key
    pub fn get_postings(&self, key: &str) -> Option<&[Posting]> {
        self.terms.get(key).map(|p| p.as_slice())
    }

    /// Get all postings in the buffer (for segment writing)
    pub fn all_postings(&self) -> &HashMap<String, Vec<Posting>> {
        &self.terms
    }

    pub fn entries(&self) -> &[DocNoEntry] {
        &self.entries
    }

    pub fn stats(&self) -> &SegmentStatistics {
        &self.stats
    }

    pub fn stored(&self) -> &StoredFieldsTable {
        &self.stored
    }

    pub fn docvalues(&self) -> &DocValues {
        &self.docvalues
    }

    pub fn doc_count(&self) -> u32 {
        self.entries.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get approximate size in bytes
    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    /// Check if buffer should be flushed
    pub fn should_flush(&self, config: &BufferConfig) -> bool {
        self.size_bytes >= config.max_bytes || self.entries.len() >= config.max_docs
    }

    /// Clear the buffer (after flush)
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalyzerConfig;
    use crate::models::Document;
    use crate::schema::Schema;

    fn resolve(doc: Document) -> ResolvedDocument {
        Schema::new().resolve(&doc).unwrap()
    }

    fn analyzer() -> Analyzer {
        Analyzer::new(&AnalyzerConfig::default()).unwrap()
    }

    #[test]
    fn test_index_document() {
        let analyzer = analyzer();
        let mut buffer = MutableBuffer::new();

        let doc = resolve(
            Document::new()
                .number("id", 1.0)
                .text("body", "the quick fox and the fox")
                .keyword("tag", "Animals")
                .number("rank", 4.0),
        );
        let docno = buffer.index_document(&doc, &analyzer, Version::new(1));

        assert_eq!(docno, DocNo::new(0));
        assert_eq!(buffer.doc_count(), 1);

        let fox = buffer.get_postings(&term_key("body", "fox")).unwrap();
        assert_eq!(fox.len(), 1);
        assert_eq!(fox[0].positions, vec![2, 5]);
        assert_eq!(fox[0].term_frequency, 2);

        // Stopwords are not indexed but still count as positions
        assert!(buffer.get_postings(&term_key("body", "the")).is_none());

        // Keywords are verbatim, ids are keywords
        assert!(buffer.get_postings(&term_key("tag", "Animals")).is_some());
        assert!(buffer.get_postings(&term_key("id", "1")).is_some());

        assert_eq!(buffer.docvalues().get("rank", docno), Some(4.0));
        assert_eq!(buffer.stats().field_length("body", docno), 3);
        assert_eq!(buffer.stats().field_length("tag", docno), 1);
        assert_eq!(
            buffer.stored().get(docno).unwrap().get("tag"),
            Some(&FieldValue::Keyword("Animals".into()))
        );
    }

    #[test]
    fn test_entries_and_tombstones() {
        let analyzer = analyzer();
        let mut buffer = MutableBuffer::new();

        for (version, id) in [(1, 7u64), (2, 8), (3, 7)] {
            let doc = resolve(Document::new().number("id", id as f64).text("body", "hello"));
            buffer.index_document(&doc, &analyzer, Version::new(version));
        }

        assert_eq!(buffer.entries_of(7).count(), 2);
        assert!(buffer.has_version_at_most(7, Version::new(1)));
        assert!(!buffer.has_version_at_most(8, Version::new(1)));

        let mut tombstones = Tombstones::new();
        tombstones.insert(7, Version::new(2));
        assert_eq!(buffer.deleted_by(&tombstones).iter().collect::<Vec<_>>(), vec![0]);

        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.entries_of(7).count(), 0);
    }

    #[test]
    fn test_should_flush() {
        let analyzer = analyzer();
        let mut buffer = MutableBuffer::new();
        let config = BufferConfig::default().with_max_docs(10);

        assert!(!buffer.should_flush(&config));

        for i in 0..10 {
            let doc = resolve(Document::new().number("id", i as f64).text("body", "term"));
            buffer.index_document(&doc, &analyzer, Version::new(i + 1));
        }

        assert!(buffer.should_flush(&config));
        assert!(buffer.should_flush(&BufferConfig::default().with_max_bytes(1)));
    }
}
