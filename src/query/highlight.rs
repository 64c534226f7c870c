//! Term occurrences in stored fields
//!
//! Stored text is analyzed again and every token equal to a positive query
//! term (or starting with a positive prefix) is reported with its byte span.
//! Phrase words are reported only where the whole phrase occurs.

use std::collections::HashSet;

use serde::Serialize;

use crate::models::{FieldValue, StoredFields};
use crate::query::ast::{PhraseTerm, Query};
use crate::schema::{FieldKind, Schema};
use crate::tokenizer::{Analyzer, Token};

/// One matched word in a stored field
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Occurrence {
    pub field: String,
    /// Byte offsets into the stored value
    pub start: usize,
    pub end: usize,
    /// Index of the word in the value, counting dropped words
    pub word_index: u32,
}

/// Finds the occurrences of a query's terms in stored documents
pub struct Highlighter<'a> {
    analyzer: &'a Analyzer,
    schema: &'a Schema,
    terms: HashSet<(String, String)>,
    prefixes: Vec<(String, String)>,
    phrases: Vec<(String, Vec<PhraseTerm>)>,
}

impl<'a> Highlighter<'a> {
    pub fn new(analyzer: &'a Analyzer, schema: &'a Schema, query: &Query) -> Self {
        let terms = query
            .positive_terms()
            .into_iter()
            .map(|(field, term)| (field.to_string(), term.to_string()))
            .collect();
        let prefixes = query
            .positive_prefixes()
            .into_iter()
            .map(|(field, prefix)| (field.to_string(), prefix.to_string()))
            .collect();
        let phrases = query
            .positive_phrases()
            .into_iter()
            .filter(|(_, terms)| !terms.is_empty())
            .map(|(field, terms)| (field.to_string(), terms.to_vec()))
            .collect();
        Self {
            analyzer,
            schema,
            terms,
            prefixes,
            phrases,
        }
    }

    /// Whether the query has anything to highlight
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty() && self.prefixes.is_empty() && self.phrases.is_empty()
    }

    fn matches(&self, field: &str, term: &str) -> bool {
        self.terms.contains(&(field.to_string(), term.to_string()))
            || self
                .prefixes
                .iter()
                .any(|(f, prefix)| f == field && term.starts_with(prefix.as_str()))
    }

    /// Marks every token that is part of a complete phrase occurrence
    fn mark_phrases(&self, field: &str, tokens: &[Token], marked: &mut [bool]) {
        for (_, terms) in self.phrases.iter().filter(|(f, _)| f == field) {
            for start in tokens.iter().filter(|tok| tok.term == terms[0].term) {
                let Some(base) = start.position.checked_sub(terms[0].offset) else {
                    continue;
                };
                let hits: Option<Vec<usize>> = terms
                    .iter()
                    .map(|t| {
                        tokens
                            .iter()
                            .position(|tok| tok.position == base + t.offset && tok.term == t.term)
                    })
                    .collect();
                if let Some(hits) = hits {
                    for i in hits {
                        marked[i] = true;
                    }
                }
            }
        }
    }

    fn is_keyword(&self, field: &str, value: &FieldValue) -> bool {
        if field == self.schema.id_field {
            return true;
        }
        match self.schema.get_field(field) {
            Some(mapping) => mapping.kind == FieldKind::Keyword,
            None => matches!(value, FieldValue::Keyword(_)),
        }
    }

    /// Occurrences in field order, then word order
    pub fn occurrences(&self, stored: &StoredFields) -> Vec<Occurrence> {
        let mut found = Vec::new();
        if self.is_empty() {
            return found;
        }

        for (field, value) in stored.iter() {
            let Some(text) = value.as_str() else {
                continue;
            };
            if self.is_keyword(field, value) {
                if self.matches(field, text) {
                    found.push(Occurrence {
                        field: field.to_string(),
                        start: 0,
                        end: text.len(),
                        word_index: 0,
                    });
                }
                continue;
            }
            let tokens: Vec<Token> = self.analyzer.token_stream(text).collect();
            let mut marked: Vec<bool> = tokens
                .iter()
                .map(|token| self.matches(field, &token.term))
                .collect();
            self.mark_phrases(field, &tokens, &mut marked);
            for (token, _) in tokens.iter().zip(&marked).filter(|(_, m)| **m) {
                found.push(Occurrence {
                    field: field.to_string(),
                    start: token.start_offset,
                    end: token.end_offset,
                    word_index: token.position,
                });
            }
        }
        found
    }
}
