//! Field-length statistics for BM25+ scoring
//!
//! Each segment stores the analyzed length of every field per docno. Snapshots
//! aggregate the lengths of live documents only, so merging segments never
//! changes a score.

use std::collections::BTreeMap;

use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};

use super::types::DocNo;

/// BM25+ parameters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bm25Params {
    /// Term frequency saturation parameter
    pub k1: f32,
    /// Length normalization parameter
    pub b: f32,
    /// BM25+ delta parameter (avoids zero scores for high-frequency terms)
    pub delta: f32,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self {
            k1: 1.2,
            b: 0.75,
            delta: 1.0,
        }
    }
}

impl Bm25Params {
    /// Robertson-Sparck-Jones IDF, never negative
    pub fn idf(&self, doc_frequency: u64, total_docs: u64) -> f32 {
        let n = total_docs as f32;
        let df = doc_frequency as f32;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    /// Saturated term-frequency component, including delta
    pub fn tf_component(&self, tf: f32, field_len: u32, avgdl: f32) -> f32 {
        let norm = if avgdl > 0.0 {
            1.0 - self.b + self.b * (field_len as f32 / avgdl)
        } else {
            1.0
        };
        (tf * (self.k1 + 1.0)) / (tf + self.k1 * norm) + self.delta
    }

    /// BM25+ contribution of a term occurrence
    pub fn score(&self, idf: f32, tf: f32, field_len: u32, avgdl: f32) -> f32 {
        idf * self.tf_component(tf, field_len, avgdl)
    }
}

/// Analyzed lengths of one field, per docno
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldLengths {
    /// Length by docno; documents without the field have length 0
    lengths: Vec<u32>,
}

impl FieldLengths {
    pub fn get(&self, docno: DocNo) -> u32 {
        self.lengths.get(docno.as_usize()).copied().unwrap_or(0)
    }

    fn set(&mut self, docno: DocNo, length: u32) {
        let idx = docno.as_usize();
        if self.lengths.len() <= idx {
            self.lengths.resize(idx + 1, 0);
        }
        self.lengths[idx] = length;
    }
}

/// Length totals over a set of live documents
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FieldTotals {
    /// Sum of field lengths
    pub total_length: u64,
    /// Documents with a non-empty field
    pub doc_count: u64,
}

impl FieldTotals {
    pub fn add(&mut self, other: FieldTotals) {
        self.total_length += other.total_length;
        self.doc_count += other.doc_count;
    }

    /// Average field length
    pub fn avgdl(&self) -> f32 {
        if self.doc_count == 0 {
            0.0
        } else {
            (self.total_length as f64 / self.doc_count as f64) as f32
        }
    }
}

/// Statistics for a single segment
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentStatistics {
    /// Total number of documents in this segment
    pub doc_count: u32,
    fields: BTreeMap<String, FieldLengths>,
}

impl SegmentStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next docno with its per-field lengths
    pub fn add_document<'a, I>(&mut self, field_lengths: I) -> DocNo
    where
        I: IntoIterator<Item = (&'a str, u32)>,
    {
        let docno = DocNo::new(self.doc_count);
        for (field, length) in field_lengths {
            if length > 0 {
                self.fields
                    .entry(field.to_string())
                    .or_default()
                    .set(docno, length);
            }
        }
        self.doc_count += 1;
        docno
    }

    /// Length of `field` in document `docno` (0 when absent)
    pub fn field_length(&self, field: &str, docno: DocNo) -> u32 {
        self.fields.get(field).map_or(0, |f| f.get(docno))
    }

    /// Fields with at least one recorded length
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(|s| s.as_str())
    }

    /// Per-field totals over documents not in `deleted`
    pub fn live_totals(&self, deleted: &RoaringBitmap) -> BTreeMap<String, FieldTotals> {
        self.fields
            .iter()
            .map(|(name, lengths)| {
                let mut totals = FieldTotals::default();
                for (i, &len) in lengths.lengths.iter().enumerate() {
                    if len > 0 && !deleted.contains(i as u32) {
                        totals.total_length += len as u64;
                        totals.doc_count += 1;
                    }
                }
                (name.clone(), totals)
            })
            .collect()
    }
}

/// Aggregated statistics across the live documents of a snapshot
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IndexStatistics {
    /// Live documents across all segments
    pub total_docs: u64,
    fields: BTreeMap<String, FieldTotals>,
}

impl IndexStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in one segment's live document count and field totals
    pub fn add_segment(&mut self, live_docs: u64, fields: &BTreeMap<String, FieldTotals>) {
        self.total_docs += live_docs;
        for (name, totals) in fields {
            self.fields.entry(name.clone()).or_default().add(*totals);
        }
    }

    pub fn field(&self, name: &str) -> FieldTotals {
        self.fields.get(name).copied().unwrap_or_default()
    }

    /// Average length of a field over live documents having it
    pub fn avgdl(&self, field: &str) -> f32 {
        self.field(field).avgdl()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_statistics() {
        let mut stats = SegmentStatistics::new();

        let d0 = stats.add_document([("title", 3), ("body", 100)]);
        let d1 = stats.add_document([("body", 200)]);
        let d2 = stats.add_document([("title", 5), ("body", 0)]);

        assert_eq!(stats.doc_count, 3);
        assert_eq!(stats.field_length("title", d0), 3);
        assert_eq!(stats.field_length("title", d1), 0);
        assert_eq!(stats.field_length("body", d1), 200);
        assert_eq!(stats.field_length("body", d2), 0);
        assert_eq!(stats.field_length("missing", d0), 0);
    }

    #[test]
    fn test_live_totals_skip_deleted() {
        let mut stats = SegmentStatistics::new();
        stats.add_document([("body", 10)]);
        stats.add_document([("body", 20)]);
        stats.add_document([("body", 60)]);

        let mut deleted = RoaringBitmap::new();
        deleted.insert(2);

        let totals = stats.live_totals(&deleted);
        let body = totals["body"];
        assert_eq!(body.total_length, 30);
        assert_eq!(body.doc_count, 2);
        assert!((body.avgdl() - 15.0).abs() < 0.001);
    }

    #[test]
    fn test_index_statistics_aggregate() {
        let mut first = BTreeMap::new();
        first.insert("body".to_string(), FieldTotals { total_length: 100, doc_count: 2 });
        let mut second = BTreeMap::new();
        second.insert("body".to_string(), FieldTotals { total_length: 50, doc_count: 1 });

        let mut index = IndexStatistics::new();
        index.add_segment(2, &first);
        index.add_segment(1, &second);

        assert_eq!(index.total_docs, 3);
        assert!((index.avgdl("body") - 50.0).abs() < 0.001);
        assert_eq!(index.avgdl("title"), 0.0);
    }

    #[test]
    fn test_bm25_properties() {
        let params = Bm25Params::default();
        let idf = params.idf(10, 100);
        assert!(idf > 0.0);

        // Higher TF gives a higher score
        assert!(params.score(idf, 5.0, 100, 100.0) > params.score(idf, 1.0, 100, 100.0));

        // Rarer terms score higher
        assert!(params.idf(5, 100) > params.idf(50, 100));

        // Shorter fields score higher at equal tf
        assert!(params.score(idf, 2.0, 50, 100.0) > params.score(idf, 2.0, 200, 100.0));

        // Never negative, even when every document has the term
        assert!(params.idf(100, 100) > 0.0);
    }

    #[test]
    fn test_statistics_bincode() {
        let mut stats = SegmentStatistics::new();
        stats.add_document([("body", 4)]);
        let bytes = bincode::serialize(&stats).unwrap();
        let restored: SegmentStatistics = bincode::deserialize(&bytes).unwrap();
        assert_eq!(restored, stats);
    }
}
