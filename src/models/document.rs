use serde::{Deserialize, Serialize};

use crate::schema::FieldUsage;

/// Stable external document identifier
pub type DocumentId = u64;

/// A single field value
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    /// Analyzed text
    Text(String),
    /// Verbatim string, indexed as a single term
    Keyword(String),
    Number(f64),
}

impl FieldValue {
    /// String content of text and keyword values
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) | FieldValue::Keyword(s) => Some(s),
            FieldValue::Number(_) => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Convert to a JSON value for display
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FieldValue::Text(s) | FieldValue::Keyword(s) => serde_json::Value::String(s.clone()),
            FieldValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        FieldValue::Number(value as f64)
    }
}

/// A submitted field: its value and how the index should treat it
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldInput {
    pub value: FieldValue,
    pub usage: FieldUsage,
}

impl FieldInput {
    pub fn new(value: impl Into<FieldValue>, usage: FieldUsage) -> Self {
        Self {
            value: value.into(),
            usage,
        }
    }

    pub fn stored(value: impl Into<FieldValue>) -> Self {
        Self::new(value, FieldUsage::Stored)
    }

    pub fn indexed(value: impl Into<FieldValue>) -> Self {
        Self::new(value, FieldUsage::Indexed)
    }

    pub fn both(value: impl Into<FieldValue>) -> Self {
        Self::new(value, FieldUsage::Both)
    }
}

/// An ordered set of named fields
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub fields: Vec<(String, FieldInput)>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field
    pub fn field(mut self, name: impl Into<String>, input: FieldInput) -> Self {
        self.fields.push((name.into(), input));
        self
    }

    /// Add a stored and indexed text field
    pub fn text(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.field(name, FieldInput::both(FieldValue::Text(value.into())))
    }

    /// Add a stored and indexed keyword field
    pub fn keyword(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.field(name, FieldInput::both(FieldValue::Keyword(value.into())))
    }

    /// Add a stored and indexed numeric field
    pub fn number(self, name: impl Into<String>, value: f64) -> Self {
        self.field(name, FieldInput::both(FieldValue::Number(value)))
    }

    pub fn get(&self, name: &str) -> Option<&FieldInput> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, f)| f)
    }

    /// Build a document from a flat JSON object; every field becomes `Both`
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        let object = value.as_object()?;
        let mut doc = Document::new();
        for (name, value) in object {
            let value = match value {
                serde_json::Value::String(s) => FieldValue::Text(s.clone()),
                serde_json::Value::Number(n) => FieldValue::Number(n.as_f64()?),
                serde_json::Value::Bool(b) => FieldValue::Keyword(b.to_string()),
                _ => return None,
            };
            doc.fields
                .push((name.clone(), FieldInput::both(value)));
        }
        Some(doc)
    }
}

impl<S: Into<String>> FromIterator<(S, FieldInput)> for Document {
    fn from_iter<I: IntoIterator<Item = (S, FieldInput)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(|(n, f)| (n.into(), f)).collect(),
        }
    }
}

/// Stored field values of one document, in submission order
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredFields(Vec<(String, FieldValue)>);

impl StoredFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: FieldValue) {
        self.0.push((name.into(), value));
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .0
            .iter()
            .map(|(n, v)| (n.clone(), v.to_json()))
            .collect::<serde_json::Map<_, _>>();
        serde_json::Value::Object(map)
    }
}
