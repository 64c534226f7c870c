//! Embeddable search service
//!
//! [`SearchService`] ties the writer, the background merge worker, the query
//! parser and the searcher together behind a string-query API.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::IndexConfig;
use crate::error::{Result, SearchError};
use crate::index::{IndexWriter, MergeHandle, MergeOutcome, MergeWorker, Snapshot};
use crate::models::{Document, DocumentId, FieldInput, StoredFields};
use crate::query::{
    CancellationToken, DefaultOperator, Highlighter, Occurrence, QueryStringParser, Searcher,
};
use crate::segment::TieredMergePolicy;

/// A ranked query result
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SearchHit {
    pub doc_id: DocumentId,
    pub score: f32,
    pub stored_fields: StoredFields,
    /// Where the query's terms occur in the stored fields
    pub occurrences: Vec<Occurrence>,
}

/// Index counters for monitoring and the `stats` command
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub generation: u64,
    /// Live documents visible to queries
    pub num_docs: u64,
    /// Entries held by segments, dead ones included
    pub stored_entries: u64,
    pub segments: usize,
    pub size_bytes: u64,
    pub tombstones: usize,
    /// Documents added since the last flush
    pub buffered_docs: u32,
    pub fields: Vec<String>,
}

/// Search index with background merging
///
/// All methods take `&self`; the service can be shared across threads.
pub struct SearchService {
    writer: IndexWriter,
    merger: Mutex<Option<MergeHandle>>,
    default_operator: DefaultOperator,
    closed: AtomicBool,
}

impl SearchService {
    /// Open or create the index in `dir`
    pub fn open<P: AsRef<Path>>(dir: P, config: IndexConfig) -> Result<Self> {
        let background_merge = config.background_merge;
        let threads = config.merge_threads;
        let policy = TieredMergePolicy::new(config.merge.clone());
        let writer = IndexWriter::open(dir, config)?;

        let merger = if background_merge {
            let handle = MergeWorker::start(writer.clone(), policy, threads);
            // Segments left by an earlier session may already need merging
            handle.notify();
            Some(handle)
        } else {
            None
        };

        info!(
            directory = %writer.directory().display(),
            generation = writer.generation(),
            background_merge,
            "Search service opened"
        );
        Ok(Self {
            writer,
            merger: Mutex::new(merger),
            default_operator: DefaultOperator::default(),
            closed: AtomicBool::new(false),
        })
    }

    /// Operator between adjacent clauses of query strings
    pub fn with_default_operator(mut self, operator: DefaultOperator) -> Self {
        self.default_operator = operator;
        self
    }

    pub fn writer(&self) -> &IndexWriter {
        &self.writer
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(SearchError::Closed)
        } else {
            Ok(())
        }
    }

    /// Add or replace a document; visible after the next flush
    pub fn submit_document<I, S>(&self, fields: I) -> Result<DocumentId>
    where
        I: IntoIterator<Item = (S, FieldInput)>,
        S: Into<String>,
    {
        self.ensure_open()?;
        let doc: Document = fields.into_iter().collect();
        self.writer.add_document(&doc)
    }

    /// Add or replace a prebuilt document
    pub fn add_document(&self, doc: &Document) -> Result<DocumentId> {
        self.ensure_open()?;
        self.writer.add_document(doc)
    }

    /// Returns whether a live document was deleted
    pub fn delete_document(&self, doc_id: DocumentId) -> Result<bool> {
        self.ensure_open()?;
        self.writer.delete_document(doc_id)
    }

    pub fn delete_all(&self) -> Result<()> {
        self.ensure_open()?;
        if let Some(merger) = self.merger.lock().as_ref() {
            merger.cancel();
        }
        self.writer.delete_all()
    }

    /// Commit pending changes; returns the new generation
    pub fn flush(&self) -> Result<u64> {
        self.ensure_open()?;
        let generation = self.writer.commit()?;
        if let Some(merger) = self.merger.lock().as_ref() {
            merger.notify();
        }
        Ok(generation)
    }

    /// Merge everything into a single segment
    pub fn force_merge(&self) -> Result<Option<MergeOutcome>> {
        self.ensure_open()?;
        self.writer.force_merge()
    }

    /// Replace the whole index with `docs` in one commit
    ///
    /// Readers see either the old contents or the new ones; buffer limits
    /// do not trigger commits until `docs` is exhausted.
    pub fn rebuild<I>(&self, docs: I) -> Result<u64>
    where
        I: IntoIterator<Item = Document>,
    {
        self.delete_all()?;
        let mut count = 0usize;
        for doc in docs {
            self.writer.add_document(&doc)?;
            count += 1;
        }
        let generation = self.flush()?;
        info!(docs = count, generation, "Rebuilt index");
        Ok(generation)
    }

    /// The latest published snapshot
    pub fn snapshot(&self) -> Snapshot {
        self.writer.snapshot()
    }

    /// Parse and run a query string against the latest snapshot
    pub fn query(&self, text: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        self.query_with_cancel(text, top_k, &CancellationToken::new())
    }

    pub fn query_with_cancel(
        &self,
        text: &str,
        top_k: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchHit>> {
        self.ensure_open()?;
        let snapshot = self.writer.snapshot();
        self.run_query(&snapshot, text, top_k, cancel)
    }

    /// Run a query against a pinned snapshot
    pub fn query_snapshot(
        &self,
        snapshot: &Snapshot,
        text: &str,
        top_k: usize,
    ) -> Result<Vec<SearchHit>> {
        self.ensure_open()?;
        self.run_query(snapshot, text, top_k, &CancellationToken::new())
    }

    fn run_query(
        &self,
        snapshot: &Snapshot,
        text: &str,
        top_k: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchHit>> {
        let analyzer = self.writer.analyzer();
        let schema = snapshot.schema();
        let query = QueryStringParser::new(analyzer, schema)
            .with_default_operator(self.default_operator)
            .parse(text)?;
        debug!(query = %query, "Parsed query");

        let searcher =
            Searcher::new(snapshot.clone()).with_bm25(self.writer.config().bm25.clone());
        let scored = searcher.search_with_cancel(&query, top_k, cancel)?;
        let highlighter = Highlighter::new(analyzer, schema, &query);

        Ok(scored
            .iter()
            .map(|hit| {
                let stored_fields = searcher.stored_fields(hit).cloned().unwrap_or_default();
                let occurrences = highlighter.occurrences(&stored_fields);
                SearchHit {
                    doc_id: hit.doc_id,
                    score: hit.score,
                    stored_fields,
                    occurrences,
                }
            })
            .collect())
    }

    pub fn stats(&self) -> IndexStats {
        let snapshot = self.writer.snapshot();
        IndexStats {
            generation: snapshot.generation(),
            num_docs: snapshot.num_docs(),
            stored_entries: snapshot.stored_entries(),
            segments: snapshot.segment_count(),
            size_bytes: snapshot
                .segments()
                .iter()
                .map(|s| s.reader().meta().size_bytes)
                .sum(),
            tombstones: snapshot.tombstones().len(),
            buffered_docs: self.writer.buffered_docs(),
            fields: snapshot.schema().field_names(),
        }
    }

    /// Flush pending changes and stop background merging
    ///
    /// Later calls fail with [`SearchError::Closed`]. Closing twice is a
    /// no-op.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let flushed = self.writer.commit();
        if let Some(merger) = self.merger.lock().take() {
            merger.shutdown();
        }
        match &flushed {
            Ok(generation) => info!(generation, "Search service closed"),
            Err(e) => warn!(error = %e, "Final flush failed while closing"),
        }
        flushed.map(|_| ())
    }
}

impl Drop for SearchService {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::Acquire) {
            if let Err(e) = self.close() {
                warn!(error = %e, "Failed to close search service");
            }
        }
    }
}
