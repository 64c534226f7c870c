//! Immutable point-in-time views of an index
//!
//! A [`Snapshot`] pins the segments of one manifest generation together with
//! the tombstones visible at the time it was published. Cloning is an `Arc`
//! bump; segment directories stay on disk until the last snapshot holding
//! them is dropped.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use roaring::RoaringBitmap;
use tracing::warn;

use crate::models::DocumentId;
use crate::schema::Schema;
use crate::segment::{
    DocNo, FieldTotals, IndexStatistics, SegmentId, SegmentReader, SegmentStore, SegmentSummary, Tombstones,
};

/// A loaded segment shared by every snapshot that contains it
///
/// Once the writer drops the segment from the manifest it marks the handle
/// obsolete. The directory is removed when the last reference goes away.
pub struct SegmentHandle {
    reader: SegmentReader,
    /// Set for handles owned by a writer; read-only readers never delete
    store: Option<SegmentStore>,
    obsolete: AtomicBool,
}

impl SegmentHandle {
    pub fn new(reader: SegmentReader, store: Option<SegmentStore>) -> Self {
        Self {
            reader,
            store,
            obsolete: AtomicBool::new(false),
        }
    }

    pub fn reader(&self) -> &SegmentReader {
        &self.reader
    }

    pub fn id(&self) -> SegmentId {
        self.reader.id()
    }

    /// Schedule the segment directory for deletion on drop
    pub fn mark_obsolete(&self) {
        self.obsolete.store(true, Ordering::Release);
    }

    pub fn is_obsolete(&self) -> bool {
        self.obsolete.load(Ordering::Acquire)
    }
}

impl Drop for SegmentHandle {
    fn drop(&mut self) {
        if !self.is_obsolete() {
            return;
        }
        if let Some(store) = &self.store {
            if let Err(e) = store.remove_segment_dir(self.reader.id()) {
                warn!(segment = %self.reader.id(), error = %e, "Failed to delete obsolete segment");
            }
        }
    }
}

impl fmt::Debug for SegmentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentHandle")
            .field("id", &self.reader.id())
            .field("doc_count", &self.reader.doc_count())
            .field("obsolete", &self.is_obsolete())
            .finish()
    }
}

/// One segment as seen through a snapshot's tombstones
#[derive(Debug)]
pub struct SegmentView {
    handle: Arc<SegmentHandle>,
    deleted: RoaringBitmap,
    live: RoaringBitmap,
    /// Field length totals over live docnos
    totals: BTreeMap<String, FieldTotals>,
}

impl SegmentView {
    fn new(handle: Arc<SegmentHandle>, tombstones: &Tombstones) -> Self {
        let reader = handle.reader();
        let deleted = reader.docno_map().deleted_by(tombstones);
        let mut live = RoaringBitmap::new();
        live.insert_range(0..reader.doc_count());
        live -= &deleted;
        let totals = reader.stats().live_totals(&deleted);
        Self {
            handle,
            deleted,
            live,
            totals,
        }
    }

    fn holds(&self, doc_id: DocumentId) -> bool {
        self.reader().docno_map().docnos_of(doc_id).next().is_some()
    }

    pub fn reader(&self) -> &SegmentReader {
        self.handle.reader()
    }

    pub fn handle(&self) -> &Arc<SegmentHandle> {
        &self.handle
    }

    pub fn id(&self) -> SegmentId {
        self.handle.id()
    }

    /// Docnos killed by tombstones
    pub fn deleted(&self) -> &RoaringBitmap {
        &self.deleted
    }

    /// Docnos still visible
    pub fn live(&self) -> &RoaringBitmap {
        &self.live
    }

    pub fn is_live(&self, docno: DocNo) -> bool {
        self.live.contains(docno.as_u32())
    }

    pub fn live_doc_count(&self) -> u32 {
        self.live.len() as u32
    }

    pub fn summary(&self) -> SegmentSummary {
        let meta = self.reader().meta();
        SegmentSummary {
            id: meta.id,
            size_bytes: meta.size_bytes,
            doc_count: meta.doc_count,
            live_doc_count: self.live_doc_count(),
        }
    }
}

/// Shared state behind a [`Snapshot`]
#[derive(Debug)]
pub struct SnapshotInner {
    generation: u64,
    segments: Vec<Arc<SegmentView>>,
    tombstones: Tombstones,
    schema: Schema,
    statistics: IndexStatistics,
}

/// Point-in-time view of the committed index
#[derive(Clone, Debug)]
pub struct Snapshot {
    inner: Arc<SnapshotInner>,
}

impl Snapshot {
    /// Build a snapshot, resolving tombstones against every segment
    pub fn new(
        generation: u64,
        handles: &[Arc<SegmentHandle>],
        tombstones: Tombstones,
        schema: Schema,
    ) -> Self {
        let segments = handles
            .iter()
            .map(|handle| Arc::new(SegmentView::new(Arc::clone(handle), &tombstones)))
            .collect();
        Self::assemble(generation, segments, tombstones, schema)
    }

    /// The same segments with new tombstones that differ only for `doc_id`
    ///
    /// Views of segments without an entry for `doc_id` are shared with `self`.
    pub(crate) fn with_changed_doc(
        &self,
        doc_id: DocumentId,
        tombstones: Tombstones,
        schema: Schema,
    ) -> Self {
        let segments = self
            .inner
            .segments
            .iter()
            .map(|view| {
                if view.holds(doc_id) {
                    Arc::new(SegmentView::new(Arc::clone(view.handle()), &tombstones))
                } else {
                    Arc::clone(view)
                }
            })
            .collect();
        Self::assemble(self.inner.generation, segments, tombstones, schema)
    }

    fn assemble(
        generation: u64,
        segments: Vec<Arc<SegmentView>>,
        tombstones: Tombstones,
        schema: Schema,
    ) -> Self {
        let mut statistics = IndexStatistics::new();
        for view in &segments {
            statistics.add_segment(view.live_doc_count() as u64, &view.totals);
        }
        Self {
            inner: Arc::new(SnapshotInner {
                generation,
                segments,
                tombstones,
                schema,
                statistics,
            }),
        }
    }

    /// A snapshot with no segments
    pub fn empty(schema: Schema) -> Self {
        Self::new(0, &[], Tombstones::new(), schema)
    }

    pub(crate) fn from_inner(inner: Arc<SnapshotInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn into_inner(self) -> Arc<SnapshotInner> {
        self.inner
    }

    /// Manifest generation this snapshot was built from
    pub fn generation(&self) -> u64 {
        self.inner.generation
    }

    pub fn segments(&self) -> &[Arc<SegmentView>] {
        &self.inner.segments
    }

    pub fn segment(&self, id: SegmentId) -> Option<&SegmentView> {
        self.inner
            .segments
            .iter()
            .find(|s| s.id() == id)
            .map(Arc::as_ref)
    }

    pub fn segment_count(&self) -> usize {
        self.inner.segments.len()
    }

    pub fn tombstones(&self) -> &Tombstones {
        &self.inner.tombstones
    }

    pub fn schema(&self) -> &Schema {
        &self.inner.schema
    }

    /// Live document count and field length totals
    pub fn statistics(&self) -> &IndexStatistics {
        &self.inner.statistics
    }

    /// Number of live documents
    pub fn num_docs(&self) -> u64 {
        self.inner.statistics.total_docs
    }

    /// Entries stored across segments, dead ones included
    pub fn stored_entries(&self) -> u64 {
        self.inner
            .segments
            .iter()
            .map(|s| s.reader().doc_count() as u64)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.num_docs() == 0
    }

    /// Whether a live entry exists for `doc_id`
    pub fn contains(&self, doc_id: DocumentId) -> bool {
        self.inner.segments.iter().any(|segment| {
            segment
                .reader()
                .docno_map()
                .docnos_of(doc_id)
                .any(|docno| segment.is_live(docno))
        })
    }

    /// Merge-policy view of every segment
    pub fn segment_summaries(&self) -> Vec<SegmentSummary> {
        self.inner.segments.iter().map(|view| view.summary()).collect()
    }

    /// Whether two snapshots share the same state
    pub fn ptr_eq(&self, other: &Snapshot) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalyzerConfig;
    use crate::models::Document;
    use crate::segment::{MutableBuffer, SegmentWriter, Version};
    use crate::tokenizer::Analyzer;
    use tempfile::TempDir;

    fn segment(id: u64, docs: &[(u64, u64, &str)]) -> SegmentReader {
        let analyzer = Analyzer::new(&AnalyzerConfig::default()).unwrap();
        let schema = Schema::new();
        let mut buffer = MutableBuffer::new();
        for &(doc_id, version, body) in docs {
            let doc = Document::new().number("id", doc_id as f64).text("body", body);
            let resolved = schema.resolve(&doc).unwrap();
            buffer.index_document(&resolved, &analyzer, Version::new(version));
        }
        SegmentWriter::new(SegmentId::new(id))
            .write_from_buffer(&buffer, &RoaringBitmap::new())
            .unwrap()
            .reader
    }

    #[test]
    fn test_snapshot_applies_tombstones() {
        let handles = vec![
            Arc::new(SegmentHandle::new(
                segment(0, &[(1, 1, "quick fox"), (2, 2, "lazy dog")]),
                None,
            )),
            Arc::new(SegmentHandle::new(segment(1, &[(3, 3, "brown fox")]), None)),
        ];
        let mut tombstones = Tombstones::new();
        tombstones.insert(2, Version::new(2));

        let snapshot = Snapshot::new(4, &handles, tombstones, Schema::new());
        assert_eq!(snapshot.generation(), 4);
        assert_eq!(snapshot.num_docs(), 2);
        assert_eq!(snapshot.stored_entries(), 3);
        assert!(snapshot.contains(1));
        assert!(!snapshot.contains(2));
        assert!(snapshot.contains(3));

        let summaries = snapshot.segment_summaries();
        assert_eq!(summaries[0].doc_count, 2);
        assert_eq!(summaries[0].live_doc_count, 1);

        // Only the live "quick fox" document counts towards the body average
        assert_eq!(snapshot.statistics().field("body").doc_count, 2);
        assert!((snapshot.statistics().avgdl("body") - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_changed_doc_resolves_only_its_segments() {
        let handles = vec![
            Arc::new(SegmentHandle::new(
                segment(0, &[(1, 1, "quick fox"), (2, 2, "lazy dog")]),
                None,
            )),
            Arc::new(SegmentHandle::new(segment(1, &[(3, 3, "brown fox jumps")]), None)),
        ];
        let before = Snapshot::new(2, &handles, Tombstones::new(), Schema::new());

        let mut tombstones = Tombstones::new();
        tombstones.insert(3, Version::new(3));
        let after = before.with_changed_doc(3, tombstones.clone(), Schema::new());

        assert!(Arc::ptr_eq(&before.segments()[0], &after.segments()[0]));
        assert!(!Arc::ptr_eq(&before.segments()[1], &after.segments()[1]));
        assert!(!after.contains(3));
        assert!(before.contains(3));
        assert_eq!(after.generation(), 2);

        let full = Snapshot::new(2, &handles, tombstones, Schema::new());
        assert_eq!(after.num_docs(), 2);
        assert_eq!(after.statistics(), full.statistics());
        assert_eq!(after.segment_summaries(), full.segment_summaries());
    }

    #[test]
    fn test_empty_snapshot() {
        let snapshot = Snapshot::empty(Schema::new());
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.segment_count(), 0);
        assert!(snapshot.clone().ptr_eq(&snapshot));
    }

    #[test]
    fn test_obsolete_segment_deleted_on_last_drop() {
        let dir = TempDir::new().unwrap();
        let store = SegmentStore::create(dir.path()).unwrap();
        let result = SegmentWriter::new(SegmentId::new(7))
            .write_from_buffer(&MutableBuffer::new(), &RoaringBitmap::new())
            .unwrap();
        store.write_segment(&result).unwrap();
        let segment_dir = store.segment_dir(SegmentId::new(7));

        let handle = Arc::new(SegmentHandle::new(result.reader, Some(store)));
        let snapshot = Snapshot::new(1, &[Arc::clone(&handle)], Tombstones::new(), Schema::new());

        handle.mark_obsolete();
        drop(handle);
        assert!(segment_dir.exists(), "pinned by the snapshot");

        drop(snapshot);
        assert!(!segment_dir.exists());
    }
}
