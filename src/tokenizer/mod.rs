//! Text analysis: word segmentation, case folding, stopwords and stemming.
//!
//! Index time and query time share one [`Analyzer`] built from the persisted
//! [`AnalyzerConfig`](crate::config::AnalyzerConfig), so both sides always
//! produce the same terms for the same text.

mod tokenizer;

pub use tokenizer::{Analyzer, Token, TokenStream};
