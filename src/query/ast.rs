//! Query tree
//!
//! Every query, parsed or built by hand, is a [`Query`] value. Terms in the
//! tree are already normalized: the parser runs them through the analyzer,
//! so evaluation compares them directly against indexed terms.

use std::fmt;
use std::ops::Bound;

/// One term of a phrase with its offset from the first term
///
/// Offsets follow the analyzer's word positions, so a dropped stopword
/// between two terms leaves a gap.
#[derive(Clone, Debug, PartialEq)]
pub struct PhraseTerm {
    pub term: String,
    pub offset: u32,
}

/// Bounds of a range query
#[derive(Clone, Debug, PartialEq)]
pub enum RangeBounds {
    /// Lexicographic range over the terms of a text or keyword field
    Text {
        lower: Bound<String>,
        upper: Bound<String>,
    },
    /// Range over the values of a numeric field
    Numeric { lower: Bound<f64>, upper: Bound<f64> },
}

impl RangeBounds {
    pub fn is_numeric(&self) -> bool {
        matches!(self, RangeBounds::Numeric { .. })
    }
}

/// A query over one snapshot
#[derive(Clone, Debug, PartialEq)]
pub enum Query {
    /// Documents containing `term` in `field`
    Term { field: String, term: String },
    /// Documents containing the terms at their relative offsets
    Phrase {
        field: String,
        terms: Vec<PhraseTerm>,
    },
    /// Documents with a term in `field` starting with `prefix`
    Prefix { field: String, prefix: String },
    Range { field: String, bounds: RangeBounds },
    /// Every child must match
    And(Vec<Query>),
    /// At least one child must match
    Or(Vec<Query>),
    /// Live documents the child does not match
    Not(Box<Query>),
    Boost { query: Box<Query>, boost: f32 },
    MatchAll,
    MatchNone,
}

impl Query {
    pub fn term(field: impl Into<String>, term: impl Into<String>) -> Self {
        Query::Term {
            field: field.into(),
            term: term.into(),
        }
    }

    /// Phrase of consecutive terms
    pub fn phrase<I, S>(field: impl Into<String>, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let terms = terms
            .into_iter()
            .enumerate()
            .map(|(i, term)| PhraseTerm {
                term: term.into(),
                offset: i as u32,
            })
            .collect();
        Query::Phrase {
            field: field.into(),
            terms,
        }
    }

    pub fn prefix(field: impl Into<String>, prefix: impl Into<String>) -> Self {
        Query::Prefix {
            field: field.into(),
            prefix: prefix.into(),
        }
    }

    pub fn numeric_range(field: impl Into<String>, lower: Bound<f64>, upper: Bound<f64>) -> Self {
        Query::Range {
            field: field.into(),
            bounds: RangeBounds::Numeric { lower, upper },
        }
    }

    pub fn text_range(field: impl Into<String>, lower: Bound<String>, upper: Bound<String>) -> Self {
        Query::Range {
            field: field.into(),
            bounds: RangeBounds::Text { lower, upper },
        }
    }

    /// Conjunction; a single clause is returned as is
    pub fn and(mut clauses: Vec<Query>) -> Self {
        if clauses.len() == 1 {
            clauses.remove(0)
        } else {
            Query::And(clauses)
        }
    }

    /// Disjunction; a single clause is returned as is
    pub fn or(mut clauses: Vec<Query>) -> Self {
        if clauses.len() == 1 {
            clauses.remove(0)
        } else {
            Query::Or(clauses)
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(query: Query) -> Self {
        Query::Not(Box::new(query))
    }

    pub fn boost(self, boost: f32) -> Self {
        Query::Boost {
            query: Box::new(self),
            boost,
        }
    }

    /// Whether this is a negation
    pub fn is_negative(&self) -> bool {
        matches!(self, Query::Not(_))
    }

    /// Every field the query refers to
    pub fn fields(&self) -> Vec<&str> {
        let mut fields = Vec::new();
        self.collect_fields(&mut fields);
        fields.sort_unstable();
        fields.dedup();
        fields
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Query::Term { field, .. }
            | Query::Phrase { field, .. }
            | Query::Prefix { field, .. }
            | Query::Range { field, .. } => out.push(field),
            Query::And(children) | Query::Or(children) => {
                for child in children {
                    child.collect_fields(out);
                }
            }
            Query::Not(query) | Query::Boost { query, .. } => query.collect_fields(out),
            Query::MatchAll | Query::MatchNone => {}
        }
    }

    /// Leaf clauses that can make a document match, outside any negation
    pub fn positive_clauses(&self) -> Vec<PositiveClause<'_>> {
        let mut clauses = Vec::new();
        self.collect_positive(&mut clauses);
        clauses
    }

    /// Single terms that can make a document match; phrase terms excluded
    pub fn positive_terms(&self) -> Vec<(&str, &str)> {
        self.positive_clauses()
            .into_iter()
            .filter_map(|clause| match clause {
                PositiveClause::Term { field, term } => Some((field, term)),
                _ => None,
            })
            .collect()
    }

    pub fn positive_prefixes(&self) -> Vec<(&str, &str)> {
        self.positive_clauses()
            .into_iter()
            .filter_map(|clause| match clause {
                PositiveClause::Prefix { field, prefix } => Some((field, prefix)),
                _ => None,
            })
            .collect()
    }

    pub fn positive_phrases(&self) -> Vec<(&str, &[PhraseTerm])> {
        self.positive_clauses()
            .into_iter()
            .filter_map(|clause| match clause {
                PositiveClause::Phrase { field, terms } => Some((field, terms)),
                _ => None,
            })
            .collect()
    }

    fn collect_positive<'a>(&'a self, out: &mut Vec<PositiveClause<'a>>) {
        match self {
            Query::Term { field, term } => out.push(PositiveClause::Term { field, term }),
            Query::Phrase { field, terms } => out.push(PositiveClause::Phrase { field, terms }),
            Query::Prefix { field, prefix } => out.push(PositiveClause::Prefix { field, prefix }),
            Query::And(children) | Query::Or(children) => {
                for child in children {
                    child.collect_positive(out);
                }
            }
            Query::Boost { query, .. } => query.collect_positive(out),
            Query::Not(_) | Query::Range { .. } | Query::MatchAll | Query::MatchNone => {}
        }
    }
}

/// A leaf of a query tree that is not under a negation
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PositiveClause<'a> {
    Term { field: &'a str, term: &'a str },
    Phrase { field: &'a str, terms: &'a [PhraseTerm] },
    Prefix { field: &'a str, prefix: &'a str },
}

fn write_bound<T: fmt::Display>(f: &mut fmt::Formatter<'_>, bound: &Bound<T>) -> fmt::Result {
    match bound {
        Bound::Included(v) | Bound::Excluded(v) => write!(f, "{}", v),
        Bound::Unbounded => write!(f, "*"),
    }
}

fn write_range<T: fmt::Display>(
    f: &mut fmt::Formatter<'_>,
    field: &str,
    lower: &Bound<T>,
    upper: &Bound<T>,
) -> fmt::Result {
    let open = if matches!(lower, Bound::Excluded(_)) { '{' } else { '[' };
    let close = if matches!(upper, Bound::Excluded(_)) { '}' } else { ']' };
    write!(f, "{}:{}", field, open)?;
    write_bound(f, lower)?;
    write!(f, " TO ")?;
    write_bound(f, upper)?;
    write!(f, "{}", close)
}

fn write_joined(f: &mut fmt::Formatter<'_>, children: &[Query], op: &str) -> fmt::Result {
    write!(f, "(")?;
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            write!(f, " {} ", op)?;
        }
        write!(f, "{}", child)?;
    }
    write!(f, ")")
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::Term { field, term } => write!(f, "{}:{}", field, term),
            Query::Phrase { field, terms } => {
                let words: Vec<&str> = terms.iter().map(|t| t.term.as_str()).collect();
                write!(f, "{}:\"{}\"", field, words.join(" "))
            }
            Query::Prefix { field, prefix } => write!(f, "{}:{}*", field, prefix),
            Query::Range { field, bounds } => match bounds {
                RangeBounds::Text { lower, upper } => write_range(f, field, lower, upper),
                RangeBounds::Numeric { lower, upper } => write_range(f, field, lower, upper),
            },
            Query::And(children) => write_joined(f, children, "AND"),
            Query::Or(children) => write_joined(f, children, "OR"),
            Query::Not(query) => write!(f, "NOT {}", query),
            Query::Boost { query, boost } => write!(f, "{}^{}", query, boost),
            Query::MatchAll => write!(f, "*"),
            Query::MatchNone => write!(f, "<none>"),
        }
    }
}
