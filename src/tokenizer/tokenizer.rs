use rust_stemmers::{Algorithm, Stemmer};
use std::collections::{HashMap, HashSet};
use stop_words::{get, LANGUAGE};
use unicode_segmentation::{UnicodeSegmentation, UnicodeWordIndices};

use crate::config::AnalyzerConfig;
use crate::error::{Result, SearchError};

/// A normalized term with its position and byte offsets in the source text
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub term: String,
    /// Word index in the source text (dropped words still count)
    pub position: u32,
    pub start_offset: usize,
    pub end_offset: usize,
}

/// Text analyzer with stemming and stopword removal
pub struct Analyzer {
    config: AnalyzerConfig,
    stemmer: Option<Stemmer>,
    stopwords: HashSet<String>,
}

impl std::fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyzer")
            .field("config", &self.config)
            .field("stopwords", &self.stopwords.len())
            .finish()
    }
}

fn resolve_language(language: &str) -> Option<(Algorithm, LANGUAGE)> {
    let resolved = match language.to_lowercase().as_str() {
        "english" | "en" => (Algorithm::English, LANGUAGE::English),
        "french" | "fr" => (Algorithm::French, LANGUAGE::French),
        "german" | "de" => (Algorithm::German, LANGUAGE::German),
        "spanish" | "es" => (Algorithm::Spanish, LANGUAGE::Spanish),
        "italian" | "it" => (Algorithm::Italian, LANGUAGE::Italian),
        "portuguese" | "pt" => (Algorithm::Portuguese, LANGUAGE::Portuguese),
        "dutch" | "nl" => (Algorithm::Dutch, LANGUAGE::Dutch),
        "swedish" | "sv" => (Algorithm::Swedish, LANGUAGE::Swedish),
        "russian" | "ru" => (Algorithm::Russian, LANGUAGE::Russian),
        _ => return None,
    };
    Some(resolved)
}

impl Analyzer {
    /// Create a new analyzer from configuration
    pub fn new(config: &AnalyzerConfig) -> Result<Self> {
        let (algorithm, language) = resolve_language(&config.language).ok_or_else(|| {
            SearchError::Config(format!("unsupported analyzer language '{}'", config.language))
        })?;

        if config.min_token_length > config.max_token_length {
            return Err(SearchError::Config(format!(
                "min_token_length {} exceeds max_token_length {}",
                config.min_token_length, config.max_token_length
            )));
        }

        let stemmer = if config.stem {
            Some(Stemmer::create(algorithm))
        } else {
            None
        };

        let stopwords = if config.remove_stopwords {
            get(language)
                .into_iter()
                .map(|s| s.to_lowercase())
                .collect()
        } else {
            HashSet::new()
        };

        Ok(Self {
            config: config.clone(),
            stemmer,
            stopwords,
        })
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Lazily analyze `text`
    pub fn token_stream<'a>(&'a self, text: &'a str) -> TokenStream<'a> {
        TokenStream {
            analyzer: self,
            text,
            words: text.unicode_word_indices(),
            position: 0,
        }
    }

    /// Normalize a single word; `None` when the word is filtered out
    pub fn normalize(&self, word: &str) -> Option<String> {
        let mut token = if self.config.lowercase {
            word.to_lowercase()
        } else {
            word.to_string()
        };

        let len = token.chars().count();
        if len < self.config.min_token_length || len > self.config.max_token_length {
            return None;
        }

        if !self.stopwords.is_empty() {
            let is_stopword = if self.config.lowercase {
                self.stopwords.contains(&token)
            } else {
                self.stopwords.contains(&token.to_lowercase())
            };
            if is_stopword {
                return None;
            }
        }

        if let Some(stemmer) = &self.stemmer {
            token = stemmer.stem(&token).into_owned();
        }

        Some(token)
    }

    /// Tokenize text into a vector of terms
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        self.token_stream(text).map(|t| t.term).collect()
    }

    /// Compute term frequencies for a piece of text
    pub fn term_frequencies(&self, text: &str) -> HashMap<String, u32> {
        let mut freq = HashMap::new();
        for token in self.token_stream(text) {
            *freq.entry(token.term).or_insert(0) += 1;
        }
        freq
    }

    /// Map each term to its ascending positions in the text
    ///
    /// Also returns the number of emitted tokens, which is the field length
    /// used for length normalization.
    pub fn term_positions(&self, text: &str) -> (HashMap<String, Vec<u32>>, u32) {
        let mut positions: HashMap<String, Vec<u32>> = HashMap::new();
        let mut length = 0u32;
        for token in self.token_stream(text) {
            positions.entry(token.term).or_default().push(token.position);
            length += 1;
        }
        (positions, length)
    }
}

/// Lazy, finite, restartable sequence of tokens
pub struct TokenStream<'a> {
    analyzer: &'a Analyzer,
    text: &'a str,
    words: UnicodeWordIndices<'a>,
    position: u32,
}

impl<'a> TokenStream<'a> {
    /// Rewind to the first token
    pub fn restart(&mut self) {
        self.words = self.text.unicode_word_indices();
        self.position = 0;
    }
}

impl<'a> Iterator for TokenStream<'a> {
    type Item = Token;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (offset, word) = self.words.next()?;
            let position = self.position;
            self.position += 1;

            if let Some(term) = self.analyzer.normalize(word) {
                return Some(Token {
                    term,
                    position,
                    start_offset: offset,
                    end_offset: offset + word.len(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn plain_config() -> AnalyzerConfig {
        AnalyzerConfig {
            lowercase: true,
            remove_stopwords: false,
            stem: false,
            min_token_length: 2,
            max_token_length: 50,
            language: "english".to_string(),
        }
    }

    #[test]
    fn test_basic_tokenization() {
        let analyzer = Analyzer::new(&plain_config()).unwrap();
        let tokens = analyzer.tokenize("Hello World! This is a test.");

        assert_eq!(tokens, vec!["hello", "world", "this", "is", "test"]);
    }

    #[test]
    fn test_stopword_removal() {
        let analyzer = Analyzer::new(&plain_config().with_stopwords(true)).unwrap();
        let tokens = analyzer.tokenize("This is a compiler for the rust language");

        assert!(!tokens.contains(&"this".to_string()));
        assert!(!tokens.contains(&"is".to_string()));
        assert!(!tokens.contains(&"the".to_string()));
        assert!(tokens.contains(&"compiler".to_string()));
        assert!(tokens.contains(&"rust".to_string()));
    }

    #[test]
    fn test_stemming() {
        let analyzer = Analyzer::new(&plain_config().with_stemming(true)).unwrap();
        let tokens = analyzer.tokenize("running runs");

        assert_eq!(tokens, vec!["run", "run"]);
    }

    #[test]
    fn test_term_frequencies() {
        let analyzer = Analyzer::new(&plain_config()).unwrap();

        let freq = analyzer.term_frequencies("apple apple banana");
        assert_eq!(freq.get("apple"), Some(&2));
        assert_eq!(freq.get("banana"), Some(&1));
    }

    #[test]
    fn test_min_max_token_length() {
        let config = AnalyzerConfig {
            min_token_length: 3,
            max_token_length: 5,
            ..plain_config()
        };

        let analyzer = Analyzer::new(&config).unwrap();
        let tokens = analyzer.tokenize("a ab abc abcd abcde abcdef");

        assert_eq!(tokens, vec!["abc", "abcd", "abcde"]);
    }

    #[test]
    fn test_positions_count_dropped_words() {
        let analyzer = Analyzer::new(&plain_config().with_stopwords(true)).unwrap();
        let (positions, length) = analyzer.term_positions("rust the programming rust");

        assert_eq!(positions.get("rust"), Some(&vec![0, 3]));
        assert_eq!(positions.get("programming"), Some(&vec![2]));
        assert!(positions.get("the").is_none());
        assert_eq!(length, 3);
    }

    #[test]
    fn test_token_offsets() {
        let analyzer = Analyzer::new(&plain_config()).unwrap();
        let tokens: Vec<Token> = analyzer.token_stream("Quick, brown fox").collect();

        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].term, "quick");
        assert_eq!((tokens[0].start_offset, tokens[0].end_offset), (0, 5));
        assert_eq!(tokens[1].term, "brown");
        assert_eq!((tokens[1].start_offset, tokens[1].end_offset), (7, 12));
        assert_eq!(tokens[2].position, 2);
    }

    #[test]
    fn test_stream_restart() {
        let analyzer = Analyzer::new(&AnalyzerConfig::default()).unwrap();
        let mut stream = analyzer.token_stream("the quick brown fox");

        let first: Vec<Token> = stream.by_ref().collect();
        assert!(stream.next().is_none());

        stream.restart();
        let second: Vec<Token> = stream.collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_unsupported_language() {
        let config = AnalyzerConfig::default().with_language("klingon");
        assert!(matches!(Analyzer::new(&config), Err(SearchError::Config(_))));
    }

    #[test]
    fn test_no_lowercase_keeps_case_but_drops_stopwords() {
        let config = AnalyzerConfig {
            lowercase: false,
            ..plain_config().with_stopwords(true)
        };
        let analyzer = Analyzer::new(&config).unwrap();
        assert_eq!(analyzer.tokenize("The Rust Book"), vec!["Rust", "Book"]);
    }

    proptest! {
        #[test]
        fn prop_analysis_is_deterministic(text in "[a-zA-Z ,.!?]{0,80}") {
            let a = Analyzer::new(&AnalyzerConfig::default()).unwrap();
            let b = Analyzer::new(&AnalyzerConfig::default()).unwrap();
            let left: Vec<Token> = a.token_stream(&text).collect();
            let right: Vec<Token> = b.token_stream(&text).collect();
            prop_assert_eq!(left, right);
        }

        #[test]
        fn prop_word_reanalyzes_to_itself(word in "[a-z]{2,12}") {
            // A term that survives analysis must match when searched verbatim.
            let analyzer = Analyzer::new(&AnalyzerConfig::default()).unwrap();
            let indexed = analyzer.tokenize(&format!("prefix {} suffix", word));
            let queried = analyzer.tokenize(&word);
            for term in &queried {
                prop_assert!(indexed.contains(term));
            }
        }
    }
}
