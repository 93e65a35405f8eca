//! Error types for the mapper
//!
//! Store failures pass through unchanged inside [`MapperError::Store`];
//! everything else is raised by the mapper itself.

use thiserror::Error;

use crate::core::StoreError;

/// Result type alias using the mapper's error type
pub type Result<T> = std::result::Result<T, MapperError>;

/// Main error type for the mapper
#[derive(Error, Debug)]
pub enum MapperError {
    // Unsupported query or adapter features
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(&'static str),

    // Schema declares a type with no wire coercion
    #[error("Unsupported coercion for attribute '{attribute}': {type_name}")]
    UnsupportedCoercion { attribute: String, type_name: String },

    // Value does not fit the attribute's declared type
    #[error("Cannot coerce attribute '{attribute}': expected {expected}, got {actual}")]
    Coercion {
        attribute: String,
        expected: String,
        actual: String,
    },

    // Schema or key schema invariants
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Index '{index}' not found on table '{table}'")]
    IndexNotFound { table: String, index: String },

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    // Configuration Errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Store transport errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl MapperError {
    /// Build a coercion mismatch error
    pub fn coercion(
        attribute: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        MapperError::Coercion {
            attribute: attribute.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Get DynamoDB-style error code
    #[must_use]
    pub fn dynamodb_code(&self) -> &'static str {
        match self {
            MapperError::Store(e) => e.dynamodb_code(),
            MapperError::IndexNotFound { .. } | MapperError::CollectionNotFound(_) => {
                "ResourceNotFoundException"
            }
            MapperError::UnsupportedOperation(_) => "UnsupportedOperationException",
            MapperError::UnsupportedCoercion { .. }
            | MapperError::Coercion { .. }
            | MapperError::Schema(_)
            | MapperError::Serialization(_) => "ValidationException",
            MapperError::Config(_) => "ConfigurationError",
        }
    }

    /// True when the error came from the store transport
    #[must_use]
    pub fn is_store_error(&self) -> bool {
        matches!(self, MapperError::Store(_))
    }
}

impl From<serde_json::Error> for MapperError {
    fn from(err: serde_json::Error) -> Self {
        MapperError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_store_errors_pass_through() {
        let err: MapperError = StoreError::Timeout(Duration::from_millis(5)).into();
        assert!(err.is_store_error());
        assert_eq!(err.dynamodb_code(), "RequestTimeout");
        assert!(matches!(err, MapperError::Store(StoreError::Timeout(_))));
    }

    #[test]
    fn test_error_messages() {
        let err = MapperError::coercion("subtotal", "Float", "S");
        assert_eq!(
            err.to_string(),
            "Cannot coerce attribute 'subtotal': expected Float, got S"
        );

        let err = MapperError::IndexNotFound {
            table: "purchases".into(),
            index: "by_color".into(),
        };
        assert_eq!(err.dynamodb_code(), "ResourceNotFoundException");
    }
}
