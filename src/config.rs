use serde::{Deserialize, Serialize};

use crate::schema::Schema;
use crate::segment::{Bm25Params, BufferConfig, MergePolicyConfig};

/// Settings that must agree between index time and query time.
///
/// These are persisted in the manifest; reopening an index with different
/// settings is rejected.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexSettings {
    pub analyzer: AnalyzerConfig,
}

/// Analyzer configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    pub lowercase: bool,
    pub remove_stopwords: bool,
    pub stem: bool,
    pub min_token_length: usize,
    pub max_token_length: usize,
    pub language: String,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            lowercase: true,
            remove_stopwords: true,
            stem: true,
            min_token_length: 2,
            max_token_length: 50,
            language: "english".to_string(),
        }
    }
}

impl AnalyzerConfig {
    /// Lowercasing only: no stopwords, no stemming
    pub fn simple() -> Self {
        Self {
            remove_stopwords: false,
            stem: false,
            min_token_length: 1,
            ..Default::default()
        }
    }

    pub fn with_stopwords(mut self, remove: bool) -> Self {
        self.remove_stopwords = remove;
        self
    }

    pub fn with_stemming(mut self, stem: bool) -> Self {
        self.stem = stem;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }
}

/// Full configuration for opening an index
#[derive(Clone, Debug)]
pub struct IndexConfig {
    /// Persisted analysis settings (only used when creating a new index)
    pub settings: IndexSettings,
    /// Initial schema (merged with the persisted one on open)
    pub schema: Schema,
    /// In-memory buffer flush thresholds
    pub buffer: BufferConfig,
    /// Tiered merge policy
    pub merge: MergePolicyConfig,
    /// Scoring parameters
    pub bm25: Bm25Params,
    /// Run merges on a background worker after each flush
    pub background_merge: bool,
    /// Number of merge worker threads
    pub merge_threads: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            settings: IndexSettings::default(),
            schema: Schema::default(),
            buffer: BufferConfig::default(),
            merge: MergePolicyConfig::default(),
            bm25: Bm25Params::default(),
            background_merge: false,
            merge_threads: num_cpus::get().clamp(1, 2),
        }
    }
}

impl IndexConfig {
    pub fn with_analyzer(mut self, analyzer: AnalyzerConfig) -> Self {
        self.settings.analyzer = analyzer;
        self
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_buffer(mut self, buffer: BufferConfig) -> Self {
        self.buffer = buffer;
        self
    }

    pub fn with_merge_policy(mut self, merge: MergePolicyConfig) -> Self {
        self.merge = merge;
        self
    }

    pub fn with_background_merge(mut self, enabled: bool) -> Self {
        self.background_merge = enabled;
        self
    }

    /// Apply a performance profile to this configuration
    pub fn with_profile(mut self, profile: PerformanceProfile) -> Self {
        profile.apply_to(&mut self);
        self
    }
}

/// Configuration profiles for different workloads
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PerformanceProfile {
    /// Small buffers, frequent small segments, eager merging
    LowLatency,
    Balanced,
    /// Large buffers, lazy merging
    HighThroughput,
}

impl PerformanceProfile {
    /// Buffered documents before an automatic commit
    pub fn buffer_max_docs(&self) -> usize {
        match self {
            PerformanceProfile::LowLatency => 1_000,
            PerformanceProfile::Balanced => 10_000,
            PerformanceProfile::HighThroughput => 100_000,
        }
    }

    pub fn segments_per_tier(&self) -> usize {
        match self {
            PerformanceProfile::LowLatency => 4,
            PerformanceProfile::Balanced => 10,
            PerformanceProfile::HighThroughput => 16,
        }
    }

    pub fn apply_to(&self, config: &mut IndexConfig) {
        config.buffer.max_docs = self.buffer_max_docs();
        config.merge.segments_per_tier = self.segments_per_tier();
    }
}

impl std::str::FromStr for PerformanceProfile {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low-latency" | "low_latency" => Ok(PerformanceProfile::LowLatency),
            "balanced" => Ok(PerformanceProfile::Balanced),
            "high-throughput" | "high_throughput" => Ok(PerformanceProfile::HighThroughput),
            other => Err(format!("unknown profile '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_configs() {
        let analyzer = AnalyzerConfig::default();
        assert!(analyzer.lowercase);
        assert!(analyzer.remove_stopwords);
        assert_eq!(analyzer.language, "english");

        let config = IndexConfig::default();
        assert!(!config.background_merge);
        assert!(config.merge_threads >= 1);
    }

    #[test]
    fn test_performance_profiles() {
        let config = IndexConfig::default().with_profile(PerformanceProfile::LowLatency);
        assert_eq!(config.buffer.max_docs, 1_000);
        assert_eq!(config.merge.segments_per_tier, 4);

        assert_eq!(
            "high-throughput".parse::<PerformanceProfile>(),
            Ok(PerformanceProfile::HighThroughput)
        );
        assert!("turbo".parse::<PerformanceProfile>().is_err());
    }

    #[test]
    fn test_settings_roundtrip() {
        let settings = IndexSettings {
            analyzer: AnalyzerConfig::simple().with_language("french"),
        };
        let json = serde_json::to_string(&settings).unwrap();
        let restored: IndexSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, settings);
    }
}
