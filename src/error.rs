use thiserror::Error;

/// Main error type for search core operations
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Syntax error at position {position}: {message}")]
    Syntax { position: usize, message: String },

    #[error("Query error on field '{field}': {message}")]
    Query { field: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Manifest encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Corrupt index data: {0}")]
    Corrupt(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Search service is closed")]
    Closed,
}

/// Result type alias for search core operations
pub type Result<T> = std::result::Result<T, SearchError>;

impl SearchError {
    pub fn syntax(position: usize, message: impl Into<String>) -> Self {
        SearchError::Syntax {
            position,
            message: message.into(),
        }
    }

    pub fn query(field: impl Into<String>, message: impl Into<String>) -> Self {
        SearchError::Query {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Position of a syntax error, if this is one
    pub fn position(&self) -> Option<usize> {
        match self {
            SearchError::Syntax { position, .. } => Some(*position),
            _ => None,
        }
    }

    /// Check if this error indicates a transient failure that could be retried
    pub fn is_retriable(&self) -> bool {
        matches!(self, SearchError::Io(_) | SearchError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SearchError::syntax(4, "Unterminated quoted string");
        assert_eq!(
            err.to_string(),
            "Syntax error at position 4: Unterminated quoted string"
        );
        assert_eq!(err.position(), Some(4));

        let err = SearchError::query("title", "field is not indexed");
        assert_eq!(
            err.to_string(),
            "Query error on field 'title': field is not indexed"
        );
        assert_eq!(err.position(), None);
    }

    #[test]
    fn test_retriable_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        assert!(SearchError::from(io).is_retriable());
        assert!(SearchError::Cancelled.is_retriable());
        assert!(!SearchError::InvalidDocument("missing id".into()).is_retriable());
        assert!(!SearchError::syntax(0, "empty query").is_retriable());
    }
}
