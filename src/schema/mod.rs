//! Schema and field type system
//!
//! This module defines the schema system, including:
//! - Field kinds (Text, Keyword, Numeric) and usages (Stored, Indexed, Both)
//! - Field mappings and document validation
//! - Dynamic mapping behavior

mod field_type;
mod mapping;

pub use field_type::{FieldKind, FieldUsage};
pub use mapping::{DynamicMapping, FieldMapping, ResolvedDocument, ResolvedField, Schema};
