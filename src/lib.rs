//! Embeddable full-text search core
//!
//! Documents are analyzed into immutable segments. Readers search point-in-time
//! [`Snapshot`]s while a single [`IndexWriter`] commits new segments and
//! merges old ones in the background.

pub mod config;
pub mod error;
pub mod index;
pub mod models;
pub mod query;
pub mod schema;
pub mod segment;
pub mod service;
pub mod tokenizer;

pub use config::{AnalyzerConfig, IndexConfig, IndexSettings, PerformanceProfile};
pub use error::{Result, SearchError};
pub use index::{IndexReader, IndexWriter, MergeHandle, MergeWorker, Snapshot};
pub use models::*;
pub use query::{
    CancellationToken, DefaultOperator, Query, QueryStringParser, ScoredDoc, Searcher,
};
pub use schema::{DynamicMapping, FieldKind, FieldMapping, FieldUsage, Schema};
pub use service::{IndexStats, SearchHit, SearchService};
pub use tokenizer::Analyzer;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
