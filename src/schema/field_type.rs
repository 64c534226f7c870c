//! Field kinds and usages
//!
//! The kind decides how a value is turned into index data, the usage decides
//! whether it is searchable, retrievable, or both.

use serde::{Deserialize, Serialize};

use crate::models::FieldValue;

/// How a field's values are indexed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// Analyzed text with positions (phrase queries)
    Text,
    /// The whole value is a single verbatim term
    Keyword,
    /// Per-segment numeric column used for range queries
    Numeric,
}

impl FieldKind {
    /// Kind a dynamically mapped field gets from its first value
    pub fn detect(value: &FieldValue) -> Self {
        match value {
            FieldValue::Text(_) => FieldKind::Text,
            FieldValue::Keyword(_) => FieldKind::Keyword,
            FieldValue::Number(_) => FieldKind::Numeric,
        }
    }

    /// Whether a value can be written to a field of this kind
    ///
    /// String values are interchangeable between text and keyword fields.
    pub fn accepts(&self, value: &FieldValue) -> bool {
        matches!(
            (self, value),
            (FieldKind::Text, FieldValue::Text(_) | FieldValue::Keyword(_))
                | (FieldKind::Keyword, FieldValue::Text(_) | FieldValue::Keyword(_))
                | (FieldKind::Numeric, FieldValue::Number(_))
        )
    }

    /// Whether the field produces postings in the term dictionary
    pub fn has_terms(&self) -> bool {
        matches!(self, FieldKind::Text | FieldKind::Keyword)
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldKind::Text => write!(f, "text"),
            FieldKind::Keyword => write!(f, "keyword"),
            FieldKind::Numeric => write!(f, "numeric"),
        }
    }
}

/// Whether a field is retrievable, searchable, or both
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldUsage {
    Stored,
    Indexed,
    #[default]
    Both,
}

impl FieldUsage {
    pub fn is_stored(&self) -> bool {
        matches!(self, FieldUsage::Stored | FieldUsage::Both)
    }

    pub fn is_indexed(&self) -> bool {
        matches!(self, FieldUsage::Indexed | FieldUsage::Both)
    }
}

impl std::fmt::Display for FieldUsage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldUsage::Stored => write!(f, "stored"),
            FieldUsage::Indexed => write!(f, "indexed"),
            FieldUsage::Both => write!(f, "both"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_detection() {
        assert_eq!(FieldKind::detect(&FieldValue::Text("a".into())), FieldKind::Text);
        assert_eq!(FieldKind::detect(&FieldValue::Keyword("a".into())), FieldKind::Keyword);
        assert_eq!(FieldKind::detect(&FieldValue::Number(1.0)), FieldKind::Numeric);
    }

    #[test]
    fn test_kind_accepts() {
        assert!(FieldKind::Keyword.accepts(&FieldValue::Text("x".into())));
        assert!(FieldKind::Text.accepts(&FieldValue::Keyword("x".into())));
        assert!(!FieldKind::Text.accepts(&FieldValue::Number(1.0)));
        assert!(!FieldKind::Numeric.accepts(&FieldValue::Text("1".into())));
    }

    #[test]
    fn test_usage_flags() {
        assert!(FieldUsage::Both.is_stored() && FieldUsage::Both.is_indexed());
        assert!(FieldUsage::Stored.is_stored() && !FieldUsage::Stored.is_indexed());
        assert!(!FieldUsage::Indexed.is_stored() && FieldUsage::Indexed.is_indexed());
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&FieldKind::Numeric).unwrap();
        assert_eq!(json, "\"numeric\"");
        let usage: FieldUsage = serde_json::from_str("\"stored\"").unwrap();
        assert_eq!(usage, FieldUsage::Stored);
    }
}
