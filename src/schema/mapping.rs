//! Schema definitions
//!
//! The schema maps field names to their kind and usage. It is persisted in the
//! manifest and grows as dynamically mapped fields are first seen.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use super::field_type::{FieldKind, FieldUsage};
use crate::error::{Result, SearchError};
use crate::models::{Document, DocumentId, FieldValue};

/// Dynamic mapping behavior for unmapped fields
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DynamicMapping {
    /// Map new fields from their first value (default)
    #[default]
    True,
    /// Silently drop unmapped fields
    False,
    /// Reject documents and queries naming unmapped fields
    Strict,
}

impl DynamicMapping {
    pub fn should_auto_map(&self) -> bool {
        matches!(self, DynamicMapping::True)
    }

    pub fn should_reject_unmapped(&self) -> bool {
        matches!(self, DynamicMapping::Strict)
    }
}

/// Field mapping configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub kind: FieldKind,
    #[serde(default)]
    pub usage: FieldUsage,
    /// Reject documents missing this field
    #[serde(default)]
    pub required: bool,
}

impl FieldMapping {
    pub fn new(kind: FieldKind, usage: FieldUsage) -> Self {
        Self {
            kind,
            usage,
            required: false,
        }
    }

    pub fn text() -> Self {
        Self::new(FieldKind::Text, FieldUsage::Both)
    }

    pub fn keyword() -> Self {
        Self::new(FieldKind::Keyword, FieldUsage::Both)
    }

    pub fn numeric() -> Self {
        Self::new(FieldKind::Numeric, FieldUsage::Both)
    }

    pub fn with_usage(mut self, usage: FieldUsage) -> Self {
        self.usage = usage;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Index schema
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Field carrying the document identifier
    pub id_field: String,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldMapping>,
    #[serde(default)]
    pub dynamic: DynamicMapping,
    /// Field searched by unqualified query clauses
    #[serde(default)]
    pub default_field: Option<String>,
}

impl Default for Schema {
    fn default() -> Self {
        Self {
            id_field: "id".to_string(),
            fields: BTreeMap::new(),
            dynamic: DynamicMapping::True,
            default_field: None,
        }
    }
}

/// A document field after schema resolution
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedField {
    pub name: String,
    pub kind: FieldKind,
    pub usage: FieldUsage,
    pub value: FieldValue,
}

/// A validated document, ready to be analyzed and buffered
#[derive(Clone, Debug)]
pub struct ResolvedDocument {
    pub id: DocumentId,
    pub fields: Vec<ResolvedField>,
    /// Mappings to add to the schema for fields seen for the first time
    pub new_mappings: Vec<(String, FieldMapping)>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a schema that rejects unmapped fields
    pub fn strict() -> Self {
        Self {
            dynamic: DynamicMapping::Strict,
            ..Default::default()
        }
    }

    /// Add a field mapping
    pub fn field(mut self, name: impl Into<String>, mapping: FieldMapping) -> Self {
        self.fields.insert(name.into(), mapping);
        self
    }

    pub fn with_id_field(mut self, name: impl Into<String>) -> Self {
        self.id_field = name.into();
        self
    }

    pub fn with_dynamic(mut self, dynamic: DynamicMapping) -> Self {
        self.dynamic = dynamic;
        self
    }

    pub fn with_default_field(mut self, name: impl Into<String>) -> Self {
        self.default_field = Some(name.into());
        self
    }

    pub fn get_field(&self, name: &str) -> Option<&FieldMapping> {
        self.fields.get(name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }

    /// Fields searched by unqualified query clauses
    ///
    /// The configured default field, or every indexed text and keyword field
    /// other than the id field, in name order.
    pub fn default_fields(&self) -> Vec<String> {
        if let Some(field) = &self.default_field {
            return vec![field.clone()];
        }
        self.fields
            .iter()
            .filter(|(name, m)| {
                *name != &self.id_field && m.kind.has_terms() && m.usage.is_indexed()
            })
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Validate a document and resolve each field against the mapping
    pub fn resolve(&self, doc: &Document) -> Result<ResolvedDocument> {
        let mut seen = HashSet::new();
        let mut id = None;
        let mut fields = Vec::with_capacity(doc.fields.len());
        let mut new_mappings = Vec::new();

        for (name, input) in &doc.fields {
            if name.is_empty() || name.contains('\0') {
                return Err(SearchError::InvalidDocument(format!(
                    "invalid field name {:?}",
                    name
                )));
            }
            if !seen.insert(name.as_str()) {
                return Err(SearchError::InvalidDocument(format!(
                    "field '{}' appears more than once",
                    name
                )));
            }

            if name == &self.id_field {
                id = Some(parse_document_id(name, &input.value)?);
                let mapping = match self.fields.get(name) {
                    Some(mapping) => *mapping,
                    None => {
                        let mapping = FieldMapping::new(FieldKind::Keyword, input.usage);
                        new_mappings.push((name.clone(), mapping));
                        mapping
                    }
                };
                check_usage(name, &mapping, input.usage)?;
                fields.push(ResolvedField {
                    name: name.clone(),
                    kind: FieldKind::Keyword,
                    usage: mapping.usage,
                    value: input.value.clone(),
                });
                continue;
            }

            let mapping = match self.fields.get(name) {
                Some(mapping) => *mapping,
                None => match self.dynamic {
                    DynamicMapping::Strict => {
                        return Err(SearchError::InvalidDocument(format!(
                            "unknown field '{}' in strict schema",
                            name
                        )))
                    }
                    DynamicMapping::False => continue,
                    DynamicMapping::True => {
                        let mapping =
                            FieldMapping::new(FieldKind::detect(&input.value), input.usage);
                        new_mappings.push((name.clone(), mapping));
                        mapping
                    }
                },
            };

            if !mapping.kind.accepts(&input.value) {
                return Err(SearchError::InvalidDocument(format!(
                    "field '{}' is mapped as {} and cannot hold {:?}",
                    name, mapping.kind, input.value
                )));
            }
            check_usage(name, &mapping, input.usage)?;

            fields.push(ResolvedField {
                name: name.clone(),
                kind: mapping.kind,
                usage: mapping.usage,
                value: input.value.clone(),
            });
        }

        let id = id.ok_or_else(|| {
            SearchError::InvalidDocument(format!("missing id field '{}'", self.id_field))
        })?;

        for (name, mapping) in &self.fields {
            if mapping.required && !seen.contains(name.as_str()) {
                return Err(SearchError::InvalidDocument(format!(
                    "missing required field '{}'",
                    name
                )));
            }
        }

        Ok(ResolvedDocument {
            id,
            fields,
            new_mappings,
        })
    }

    /// Fold a configured schema into this persisted one
    ///
    /// New fields are added; redefining an existing field or the id field is
    /// a configuration error. Dynamic behavior and the default field follow
    /// the configured schema.
    pub fn reconcile(&mut self, configured: &Schema) -> Result<()> {
        if configured.id_field != self.id_field {
            return Err(SearchError::Config(format!(
                "id field '{}' does not match persisted id field '{}'",
                configured.id_field, self.id_field
            )));
        }
        for (name, mapping) in &configured.fields {
            match self.fields.get(name) {
                Some(existing) if existing != mapping => {
                    return Err(SearchError::Config(format!(
                        "field '{}' conflicts with persisted mapping",
                        name
                    )))
                }
                Some(_) => {}
                None => {
                    self.fields.insert(name.clone(), *mapping);
                }
            }
        }
        self.dynamic = configured.dynamic;
        self.default_field = configured.default_field.clone();
        Ok(())
    }
}

fn check_usage(name: &str, mapping: &FieldMapping, usage: FieldUsage) -> Result<()> {
    if mapping.usage != usage {
        return Err(SearchError::InvalidDocument(format!(
            "field '{}' is mapped as {} but was submitted as {}",
            name, mapping.usage, usage
        )));
    }
    Ok(())
}

fn parse_document_id(name: &str, value: &FieldValue) -> Result<DocumentId> {
    let invalid = || {
        SearchError::InvalidDocument(format!(
            "id field '{}' must be a non-negative integer, got {:?}",
            name, value
        ))
    };
    match value {
        FieldValue::Number(n) => {
            if n.is_finite() && *n >= 0.0 && n.fract() == 0.0 && *n <= u64::MAX as f64 {
                Ok(*n as u64)
            } else {
                Err(invalid())
            }
        }
        FieldValue::Text(s) | FieldValue::Keyword(s) => s.trim().parse().map_err(|_| invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldInput;

    fn note(id: f64, body: &str) -> Document {
        Document::new().number("id", id).text("body", body)
    }

    #[test]
    fn test_schema_builder() {
        let schema = Schema::new()
            .field("title", FieldMapping::text())
            .field("status", FieldMapping::keyword())
            .with_dynamic(DynamicMapping::Strict);

        assert_eq!(schema.fields.len(), 2);
        assert!(schema.has_field("title"));
        assert!(!schema.has_field("unknown"));
        assert!(schema.dynamic.should_reject_unmapped());
    }

    #[test]
    fn test_resolve_dynamic_fields() {
        let schema = Schema::new();
        let resolved = schema.resolve(&note(1.0, "hello")).unwrap();

        assert_eq!(resolved.id, 1);
        assert_eq!(resolved.fields.len(), 2);
        assert_eq!(resolved.new_mappings.len(), 2);
        assert!(resolved
            .new_mappings
            .contains(&("id".to_string(), FieldMapping::keyword())));
        assert!(resolved
            .new_mappings
            .contains(&("body".to_string(), FieldMapping::text())));
    }

    #[test]
    fn test_resolve_id_errors() {
        let schema = Schema::new();

        let missing = Document::new().text("body", "x");
        assert!(matches!(schema.resolve(&missing), Err(SearchError::InvalidDocument(_))));

        for bad in [-1.0, 1.5, f64::NAN] {
            assert!(matches!(
                schema.resolve(&note(bad, "x")),
                Err(SearchError::InvalidDocument(_))
            ));
        }

        let textual = Document::new().text("id", "42");
        assert_eq!(schema.resolve(&textual).unwrap().id, 42);

        let garbage = Document::new().text("id", "abc");
        assert!(schema.resolve(&garbage).is_err());
    }

    #[test]
    fn test_resolve_strict_and_ignored() {
        let strict = Schema::strict().field("body", FieldMapping::text());
        let doc = note(1.0, "x").text("extra", "y");
        assert!(matches!(strict.resolve(&doc), Err(SearchError::InvalidDocument(_))));

        let lenient = Schema::new()
            .with_dynamic(DynamicMapping::False)
            .field("body", FieldMapping::text());
        let resolved = lenient.resolve(&doc).unwrap();
        assert!(resolved.fields.iter().all(|f| f.name != "extra"));
    }

    #[test]
    fn test_resolve_conflicts() {
        let schema = Schema::new()
            .field("rank", FieldMapping::numeric())
            .field("body", FieldMapping::text().with_usage(FieldUsage::Indexed));

        let wrong_kind = Document::new().number("id", 1.0).text("rank", "high");
        assert!(schema.resolve(&wrong_kind).is_err());

        let wrong_usage = Document::new()
            .number("id", 1.0)
            .field("body", FieldInput::stored("text"));
        assert!(schema.resolve(&wrong_usage).is_err());

        let duplicate = note(1.0, "a").text("body", "b");
        assert!(schema.resolve(&duplicate).is_err());
    }

    #[test]
    fn test_required_fields() {
        let schema = Schema::new().field("title", FieldMapping::text().required());
        assert!(schema.resolve(&note(1.0, "x")).is_err());
        assert!(schema.resolve(&note(1.0, "x").text("title", "t")).is_ok());
    }

    #[test]
    fn test_default_fields() {
        let schema = Schema::new()
            .field("id", FieldMapping::keyword())
            .field("title", FieldMapping::text())
            .field("body", FieldMapping::text())
            .field("rank", FieldMapping::numeric())
            .field("raw", FieldMapping::text().with_usage(FieldUsage::Stored));

        assert_eq!(schema.default_fields(), vec!["body", "title"]);

        let schema = schema.with_default_field("title");
        assert_eq!(schema.default_fields(), vec!["title"]);
    }

    #[test]
    fn test_reconcile() {
        let mut persisted = Schema::new().field("title", FieldMapping::text());
        let configured = Schema::new()
            .field("title", FieldMapping::text())
            .field("tag", FieldMapping::keyword())
            .with_default_field("title");

        persisted.reconcile(&configured).unwrap();
        assert!(persisted.has_field("tag"));
        assert_eq!(persisted.default_field.as_deref(), Some("title"));

        let conflicting = Schema::new().field("title", FieldMapping::keyword());
        assert!(matches!(
            persisted.reconcile(&conflicting),
            Err(SearchError::Config(_))
        ));
    }

    #[test]
    fn test_serialization() {
        let schema = Schema::strict()
            .field("title", FieldMapping::text())
            .field("count", FieldMapping::numeric().required());

        let json = serde_json::to_string_pretty(&schema).unwrap();
        let restored: Schema = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, schema);
    }
}
