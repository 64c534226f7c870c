//! Query parsing and execution
//!
//! - [`query_string`]: Lucene-style query strings into a [`Query`] tree
//! - [`Searcher`]: set-algebraic evaluation with BM25+ scoring
//! - [`Highlighter`]: term occurrences in stored fields
//!
//! # Example
//!
//! ```rust,no_run
//! use eureka_search::config::IndexConfig;
//! use eureka_search::index::IndexWriter;
//! use eureka_search::query::{QueryStringParser, Searcher};
//!
//! let writer = IndexWriter::open("/tmp/index", IndexConfig::default()).unwrap();
//! let snapshot = writer.snapshot();
//! let query = QueryStringParser::new(writer.analyzer(), snapshot.schema())
//!     .parse("body:\"quick fox\" -brown")
//!     .unwrap();
//! let hits = Searcher::new(snapshot).search(&query, 10).unwrap();
//! ```

pub mod ast;
pub mod cancel;
pub mod highlight;
pub mod query_string;
pub mod searcher;

pub use ast::{PhraseTerm, PositiveClause, Query, RangeBounds};
pub use cancel::CancellationToken;
pub use highlight::{Highlighter, Occurrence};
pub use query_string::{DefaultOperator, QueryStringParser};
pub use searcher::{ScoredDoc, Searcher};
