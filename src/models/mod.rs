pub mod document;

pub use document::{Document, DocumentId, FieldInput, FieldValue, StoredFields};
