//! Term dictionary using FST (Finite State Transducer)
//!
//! Use an FST term dictionary with per-term offsets into postings.
//! FST provides O(|key|) lookups and efficient prefix/range queries.

use std::io;
use std::ops::Bound;

use fst::{IntoStreamer, Map, MapBuilder, Streamer};

use super::types::{field_prefix, term_key, PostingListMeta, TERM_SEPARATOR};

/// Term dictionary backed by FST
///
/// Maps term keys (`field\0token`) to postings metadata. The FST stores a
/// u64 value which indexes into a metadata array.
pub struct TermDictionary {
    /// FST mapping term -> index in metadata array
    fst: Map<Vec<u8>>,
    /// Metadata for each term (parallel to FST output values)
    metadata: Vec<PostingListMeta>,
}

impl TermDictionary {
    /// Create a term dictionary from FST data and metadata
    pub fn new(fst_data: Vec<u8>, metadata: Vec<PostingListMeta>) -> io::Result<Self> {
        let fst = Map::new(fst_data).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        if fst.len() != metadata.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Term metadata does not match dictionary size",
            ));
        }
        Ok(Self { fst, metadata })
    }

    /// Look up a term key and return its postings metadata
    pub fn get(&self, key: &str) -> Option<&PostingListMeta> {
        self.fst
            .get(key.as_bytes())
            .and_then(|idx| self.metadata.get(idx as usize))
    }

    /// Look up a `(field, token)` term
    pub fn get_term(&self, field: &str, token: &str) -> Option<&PostingListMeta> {
        self.get(&term_key(field, token))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fst.contains_key(key.as_bytes())
    }

    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }

    /// Tokens of `field` starting with `prefix`
    pub fn prefix_search(&self, field: &str, prefix: &str) -> Vec<(String, &PostingListMeta)> {
        let start = term_key(field, prefix);
        let mut stream = self.fst.range().ge(start.as_bytes()).into_stream();
        let mut results = Vec::new();
        while let Some((key, idx)) = stream.next() {
            if !key.starts_with(start.as_bytes()) {
                break;
            }
            self.push_token(&mut results, key, idx);
        }
        results
    }

    /// Tokens of `field` within the given bounds, in byte order
    pub fn range_search(
        &self,
        field: &str,
        lower: Bound<&str>,
        upper: Bound<&str>,
    ) -> Vec<(String, &PostingListMeta)> {
        let field_start = field_prefix(field);
        // First key past every term of the field
        let mut field_end = field.to_string();
        field_end.push((TERM_SEPARATOR as u8 + 1) as char);

        let lower_key = match lower {
            Bound::Included(t) | Bound::Excluded(t) => term_key(field, t),
            Bound::Unbounded => field_start,
        };
        let upper_key = match upper {
            Bound::Included(t) | Bound::Excluded(t) => term_key(field, t),
            Bound::Unbounded => field_end,
        };

        let mut builder = self.fst.range();
        builder = match lower {
            Bound::Excluded(_) => builder.gt(lower_key.as_bytes()),
            _ => builder.ge(lower_key.as_bytes()),
        };
        builder = match upper {
            Bound::Included(_) => builder.le(upper_key.as_bytes()),
            _ => builder.lt(upper_key.as_bytes()),
        };

        let mut stream = builder.into_stream();
        let mut results = Vec::new();
        while let Some((key, idx)) = stream.next() {
            self.push_token(&mut results, key, idx);
        }
        results
    }

    fn push_token<'a>(
        &'a self,
        results: &mut Vec<(String, &'a PostingListMeta)>,
        key: &[u8],
        idx: u64,
    ) {
        let Ok(key) = std::str::from_utf8(key) else {
            return;
        };
        let Some((_, token)) = key.split_once(TERM_SEPARATOR) else {
            return;
        };
        if let Some(meta) = self.metadata.get(idx as usize) {
            results.push((token.to_string(), meta));
        }
    }

    /// Get the raw FST data (for serialization)
    pub fn fst_bytes(&self) -> &[u8] {
        self.fst.as_fst().as_bytes()
    }

    /// Get the metadata array (for serialization)
    pub fn metadata(&self) -> &[PostingListMeta] {
        &self.metadata
    }

    /// Iterate over all term keys in the dictionary
    pub fn iter_terms(&self) -> Vec<(String, &PostingListMeta)> {
        let mut results = Vec::new();
        let mut stream = self.fst.stream();
        while let Some((key, idx)) = stream.next() {
            if let (Ok(term), Some(meta)) =
                (std::str::from_utf8(key), self.metadata.get(idx as usize))
            {
                results.push((term.to_string(), meta));
            }
        }
        results
    }
}

/// Builder for term dictionaries
pub struct TermDictionaryBuilder {
    terms: Vec<(String, PostingListMeta)>,
}

impl TermDictionaryBuilder {
    pub fn new() -> Self {
        Self { terms: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            terms: Vec::with_capacity(capacity),
        }
    }

    /// Add a term key with its postings metadata
    pub fn add(&mut self, key: String, meta: PostingListMeta) {
        self.terms.push((key, meta));
    }

    /// Build the term dictionary
    pub fn build(mut self) -> io::Result<TermDictionary> {
        // FST requires sorted input
        self.terms.sort_by(|a, b| a.0.cmp(&b.0));

        let mut fst_builder = MapBuilder::memory();
        let mut metadata = Vec::with_capacity(self.terms.len());

        for (idx, (term, meta)) in self.terms.into_iter().enumerate() {
            fst_builder
                .insert(term.as_bytes(), idx as u64)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            metadata.push(meta);
        }

        let fst_data = fst_builder
            .into_inner()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

        TermDictionary::new(fst_data, metadata)
    }
}

impl Default for TermDictionaryBuilder {
    fn default() -> Self {
        Self::new()
    }
}
