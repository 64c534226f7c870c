//! Lucene-style query string parser
//!
//! Supports syntax like:
//! - `title:rust AND tag:tutorial`
//! - `body:"exact phrase" -draft`
//! - `year:[2020 TO 2024}`
//! - `title:prog*`
//! - `(rust OR go)^2 NOT deprecated`
//!
//! # Example
//!
//! ```rust
//! use eureka_search::config::AnalyzerConfig;
//! use eureka_search::query::query_string::QueryStringParser;
//! use eureka_search::schema::{FieldMapping, Schema};
//! use eureka_search::tokenizer::Analyzer;
//!
//! let analyzer = Analyzer::new(&AnalyzerConfig::default()).unwrap();
//! let schema = Schema::new().field("title", FieldMapping::text());
//! let query = QueryStringParser::new(&analyzer, &schema)
//!     .parse("title:rust AND title:prog*")
//!     .unwrap();
//! assert_eq!(query.fields(), vec!["title"]);
//! ```

pub mod lexer;
pub mod parser;

pub use lexer::{Lexer, Spanned, Token};
pub use parser::{DefaultOperator, QueryStringParser};
