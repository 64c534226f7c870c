//! Query evaluation against a snapshot
//!
//! Each segment is evaluated independently into a bitmap of matching docnos
//! with per-document scores. Term statistics (N, df, average field length)
//! come from the live documents of the whole snapshot, so a document scores
//! the same whichever segment it sits in.

use std::collections::{HashMap, HashSet};
use std::ops::Bound;

use roaring::RoaringBitmap;
use tracing::debug;

use crate::error::{Result, SearchError};
use crate::index::{SegmentView, Snapshot};
use crate::models::{DocumentId, StoredFields};
use crate::query::ast::{PhraseTerm, Query, RangeBounds};
use crate::query::cancel::CancellationToken;
use crate::schema::{FieldKind, Schema};
use crate::segment::{term_key, Bm25Params, DocNo, PostingIterator, SegmentId};

/// Postings visited between cancellation checks
const CANCEL_CHECK_INTERVAL: usize = 1024;

/// A matching document
#[derive(Clone, Debug, PartialEq)]
pub struct ScoredDoc {
    pub doc_id: DocumentId,
    pub score: f32,
    /// Segment and docno of the live entry that matched
    pub segment: SegmentId,
    pub docno: DocNo,
}

/// Runs queries against one snapshot
#[derive(Clone, Debug)]
pub struct Searcher {
    snapshot: Snapshot,
    bm25: Bm25Params,
}

impl Searcher {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            snapshot,
            bm25: Bm25Params::default(),
        }
    }

    pub fn with_bm25(mut self, bm25: Bm25Params) -> Self {
        self.bm25 = bm25;
        self
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Top `top_k` documents by score, ties broken by ascending id
    pub fn search(&self, query: &Query, top_k: usize) -> Result<Vec<ScoredDoc>> {
        self.search_with_cancel(query, top_k, &CancellationToken::new())
    }

    pub fn search_with_cancel(
        &self,
        query: &Query,
        top_k: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<ScoredDoc>> {
        validate(query, self.snapshot.schema())?;
        if self.snapshot.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let mut evaluator = Evaluator {
            snapshot: &self.snapshot,
            bm25: &self.bm25,
            cancel,
            doc_frequencies: HashMap::new(),
        };
        evaluator.load_doc_frequencies(query)?;

        let mut hits = Vec::new();
        for segment in self.snapshot.segments() {
            let matched = evaluator.eval(query, segment)?;
            let docno_map = segment.reader().docno_map();
            for docno in matched.docs.iter() {
                let docno = DocNo::new(docno);
                if let Some(doc_id) = docno_map.get_doc_id(docno) {
                    hits.push(ScoredDoc {
                        doc_id,
                        score: matched.score(docno.as_u32()),
                        segment: segment.id(),
                        docno,
                    });
                }
            }
        }
        cancel.check()?;

        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.doc_id.cmp(&b.doc_id))
        });
        let mut seen = HashSet::new();
        hits.retain(|hit| seen.insert(hit.doc_id));
        let total = hits.len();
        hits.truncate(top_k);

        debug!(
            generation = self.snapshot.generation(),
            matched = total,
            returned = hits.len(),
            "Search complete"
        );
        Ok(hits)
    }

    /// Stored fields of a hit
    pub fn stored_fields(&self, hit: &ScoredDoc) -> Option<&StoredFields> {
        self.snapshot
            .segment(hit.segment)?
            .reader()
            .stored_fields(hit.docno)
    }

    /// Number of live documents containing `term` in `field`
    pub fn doc_frequency(&self, field: &str, term: &str) -> Result<u64> {
        live_doc_frequency(&self.snapshot, &term_key(field, term))
    }
}

/// Reject trees that reference fields they cannot be evaluated on
fn validate(query: &Query, schema: &Schema) -> Result<()> {
    match query {
        Query::Term { field, .. } | Query::Phrase { field, .. } | Query::Prefix { field, .. } => {
            match check_field(field, schema)? {
                Some(FieldKind::Numeric) => Err(SearchError::query(
                    field.as_str(),
                    "numeric fields only support range queries",
                )),
                _ => Ok(()),
            }
        }
        Query::Range { field, bounds } => match (check_field(field, schema)?, bounds) {
            (Some(FieldKind::Numeric), RangeBounds::Text { .. }) => Err(SearchError::query(
                field.as_str(),
                "range bounds on a numeric field must be numbers",
            )),
            (Some(kind), RangeBounds::Numeric { .. }) if kind != FieldKind::Numeric => {
                Err(SearchError::query(
                    field.as_str(),
                    format!("numeric range on {} field", kind),
                ))
            }
            _ => Ok(()),
        },
        Query::And(children) | Query::Or(children) => {
            children.iter().try_for_each(|child| validate(child, schema))
        }
        Query::Not(query) | Query::Boost { query, .. } => validate(query, schema),
        Query::MatchAll | Query::MatchNone => Ok(()),
    }
}

/// Kind of a searchable field; `None` for an unmapped field
fn check_field(field: &str, schema: &Schema) -> Result<Option<FieldKind>> {
    if field == schema.id_field {
        return Ok(Some(FieldKind::Keyword));
    }
    match schema.get_field(field) {
        Some(mapping) if !mapping.usage.is_indexed() => {
            Err(SearchError::query(field, "field is stored but not indexed"))
        }
        Some(mapping) => Ok(Some(mapping.kind)),
        None if schema.dynamic.should_reject_unmapped() => {
            Err(SearchError::query(field, "unknown field in strict schema"))
        }
        None => Ok(None),
    }
}

fn live_doc_frequency(snapshot: &Snapshot, key: &str) -> Result<u64> {
    let mut df = 0u64;
    for segment in snapshot.segments() {
        if let Some(postings) = segment.reader().get_postings(key)? {
            df += postings
                .filter(|(docno, _)| segment.is_live(*docno))
                .count() as u64;
        }
    }
    Ok(df)
}

/// Matching docnos of one segment with their scores
#[derive(Debug, Default)]
struct DocSet {
    docs: RoaringBitmap,
    scores: HashMap<u32, f32>,
}

impl DocSet {
    fn constant(docs: RoaringBitmap, score: f32) -> Self {
        let scores = docs.iter().map(|d| (d, score)).collect();
        Self { docs, scores }
    }

    fn insert(&mut self, docno: u32, score: f32) {
        self.docs.insert(docno);
        *self.scores.entry(docno).or_insert(0.0) += score;
    }

    fn score(&self, docno: u32) -> f32 {
        self.scores.get(&docno).copied().unwrap_or(0.0)
    }
}

struct Evaluator<'s> {
    snapshot: &'s Snapshot,
    bm25: &'s Bm25Params,
    cancel: &'s CancellationToken,
    /// Live document frequency by term key
    doc_frequencies: HashMap<String, u64>,
}

impl<'s> Evaluator<'s> {
    fn load_doc_frequencies(&mut self, query: &Query) -> Result<()> {
        match query {
            Query::Term { field, term } => self.load_term(field, term),
            Query::Phrase { field, terms } => terms
                .iter()
                .try_for_each(|t| self.load_term(field, &t.term)),
            Query::And(children) | Query::Or(children) => children
                .iter()
                .try_for_each(|child| self.load_doc_frequencies(child)),
            Query::Not(query) | Query::Boost { query, .. } => self.load_doc_frequencies(query),
            Query::Prefix { .. } | Query::Range { .. } | Query::MatchAll | Query::MatchNone => {
                Ok(())
            }
        }
    }

    fn load_term(&mut self, field: &str, term: &str) -> Result<()> {
        let key = term_key(field, term);
        if !self.doc_frequencies.contains_key(&key) {
            self.cancel.check()?;
            let df = live_doc_frequency(self.snapshot, &key)?;
            self.doc_frequencies.insert(key, df);
        }
        Ok(())
    }

    fn idf(&self, key: &str) -> f32 {
        let df = self.doc_frequencies.get(key).copied().unwrap_or(0);
        self.bm25.idf(df, self.snapshot.num_docs())
    }

    fn eval(&self, query: &Query, segment: &SegmentView) -> Result<DocSet> {
        self.cancel.check()?;
        match query {
            Query::Term { field, term } => self.eval_term(field, term, segment),
            Query::Phrase { field, terms } => self.eval_phrase(field, terms, segment),
            Query::Prefix { field, prefix } => {
                let reader = segment.reader();
                let mut docs = RoaringBitmap::new();
                for (_, meta) in reader.terms().prefix_search(field, prefix) {
                    self.collect_live(reader.postings(meta)?, segment, &mut docs)?;
                }
                Ok(DocSet::constant(docs, 1.0))
            }
            Query::Range { field, bounds } => self.eval_range(field, bounds, segment),
            Query::And(children) => {
                let Some((first, rest)) = children.split_first() else {
                    return Ok(DocSet::constant(segment.live().clone(), 1.0));
                };
                let mut result = self.eval(first, segment)?;
                for child in rest {
                    if result.docs.is_empty() {
                        break;
                    }
                    let next = self.eval(child, segment)?;
                    result.docs &= &next.docs;
                    let docs = &result.docs;
                    result.scores.retain(|docno, _| docs.contains(*docno));
                    for docno in result.docs.iter() {
                        *result.scores.entry(docno).or_insert(0.0) += next.score(docno);
                    }
                }
                Ok(result)
            }
            Query::Or(children) => {
                let mut result = DocSet::default();
                for child in children {
                    let next = self.eval(child, segment)?;
                    for docno in next.docs.iter() {
                        result.insert(docno, next.score(docno));
                    }
                }
                Ok(result)
            }
            Query::Not(child) => {
                let excluded = self.eval(child, segment)?;
                Ok(DocSet {
                    docs: segment.live() - &excluded.docs,
                    scores: HashMap::new(),
                })
            }
            Query::Boost { query, boost } => {
                let mut result = self.eval(query, segment)?;
                for score in result.scores.values_mut() {
                    *score *= boost;
                }
                Ok(result)
            }
            Query::MatchAll => Ok(DocSet::constant(segment.live().clone(), 1.0)),
            Query::MatchNone => Ok(DocSet::default()),
        }
    }

    fn eval_term(&self, field: &str, term: &str, segment: &SegmentView) -> Result<DocSet> {
        let key = term_key(field, term);
        let reader = segment.reader();
        let mut result = DocSet::default();
        let Some(postings) = reader.get_postings(&key)? else {
            return Ok(result);
        };

        let idf = self.idf(&key);
        let avgdl = self.snapshot.statistics().avgdl(field);
        for (i, (docno, tf)) in postings.enumerate() {
            if i % CANCEL_CHECK_INTERVAL == 0 {
                self.cancel.check()?;
            }
            if !segment.is_live(docno) {
                continue;
            }
            let field_len = reader.stats().field_length(field, docno);
            result.insert(
                docno.as_u32(),
                self.bm25.score(idf, tf as f32, field_len, avgdl),
            );
        }
        Ok(result)
    }

    /// Documents holding every term at its offset from a common start
    fn eval_phrase(
        &self,
        field: &str,
        terms: &[PhraseTerm],
        segment: &SegmentView,
    ) -> Result<DocSet> {
        let mut result = DocSet::default();
        let Some((lead_term, rest_terms)) = terms.split_first() else {
            return Ok(result);
        };
        if rest_terms.is_empty() {
            return self.eval_term(field, &lead_term.term, segment);
        }

        let reader = segment.reader();
        let Some(mut lead) = reader.get_postings(&term_key(field, &lead_term.term))? else {
            return Ok(result);
        };
        let mut others: Vec<(u32, PostingIterator<'_>, Option<DocNo>)> =
            Vec::with_capacity(rest_terms.len());
        for term in rest_terms {
            let Some(mut postings) = reader.get_postings(&term_key(field, &term.term))? else {
                return Ok(result);
            };
            let head = postings.next().map(|(docno, _)| docno);
            others.push((term.offset - lead_term.offset, postings, head));
        }

        let idf_sum: f32 = terms
            .iter()
            .map(|t| self.idf(&term_key(field, &t.term)))
            .sum();
        let avgdl = self.snapshot.statistics().avgdl(field);

        let mut visited = 0usize;
        'lead: while let Some((docno, _)) = lead.next() {
            if visited % CANCEL_CHECK_INTERVAL == 0 {
                self.cancel.check()?;
            }
            visited += 1;
            if !segment.is_live(docno) {
                continue;
            }

            // Bring every other term onto this docno
            for (_, postings, head) in others.iter_mut() {
                while let Some(current) = *head {
                    if current >= docno {
                        break;
                    }
                    *head = postings.skip_to(docno).map(|(d, _)| d);
                }
                match *head {
                    None => break 'lead,
                    Some(current) if current > docno => continue 'lead,
                    Some(_) => {}
                }
            }

            let starts = lead.positions()?.to_vec();
            let mut frequency = 0u32;
            let mut other_positions = Vec::with_capacity(others.len());
            for (offset, postings, _) in others.iter_mut() {
                other_positions.push((*offset, postings.positions()?.to_vec()));
            }
            for start in starts {
                let aligned = other_positions.iter().all(|(offset, positions)| {
                    positions.binary_search(&(start + offset)).is_ok()
                });
                if aligned {
                    frequency += 1;
                }
            }

            if frequency > 0 {
                let field_len = reader.stats().field_length(field, docno);
                result.insert(
                    docno.as_u32(),
                    self.bm25.score(idf_sum, frequency as f32, field_len, avgdl),
                );
            }
        }
        Ok(result)
    }

    fn eval_range(&self, field: &str, bounds: &RangeBounds, segment: &SegmentView) -> Result<DocSet> {
        let reader = segment.reader();
        let docs = match bounds {
            RangeBounds::Numeric { lower, upper } => match reader.docvalues().column(field) {
                Some(column) => column.range_query(*lower, *upper) & segment.live(),
                None => RoaringBitmap::new(),
            },
            RangeBounds::Text { lower, upper } => {
                let mut docs = RoaringBitmap::new();
                for (_, meta) in reader
                    .terms()
                    .range_search(field, as_str_bound(lower), as_str_bound(upper))
                {
                    self.collect_live(reader.postings(meta)?, segment, &mut docs)?;
                }
                docs
            }
        };
        Ok(DocSet::constant(docs, 1.0))
    }

    fn collect_live(
        &self,
        postings: PostingIterator<'_>,
        segment: &SegmentView,
        docs: &mut RoaringBitmap,
    ) -> Result<()> {
        for (i, (docno, _)) in postings.enumerate() {
            if i % CANCEL_CHECK_INTERVAL == 0 {
                self.cancel.check()?;
            }
            if segment.is_live(docno) {
                docs.insert(docno.as_u32());
            }
        }
        Ok(())
    }
}

fn as_str_bound(bound: &Bound<String>) -> Bound<&str> {
    match bound {
        Bound::Included(s) => Bound::Included(s.as_str()),
        Bound::Excluded(s) => Bound::Excluded(s.as_str()),
        Bound::Unbounded => Bound::Unbounded,
    }
}
