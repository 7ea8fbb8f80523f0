//! Error types for the object mapper
//!
//! Store failures are carried through unchanged in [`ModelError::Store`];
//! nothing in this crate retries or masks them.

use stash_store::StoreError;
use thiserror::Error;

/// Result type alias for model operations
pub type ModelResult<T> = Result<T, ModelError>;

/// Error types for model operations
#[derive(Error, Debug)]
pub enum ModelError {
    /// Write to an attribute the model never declared
    #[error("{model} does not have attribute {attribute}")]
    AttributeNotDefined { model: String, attribute: String },

    /// Call of a class or instance capability nobody provides
    #[error("{model} does not respond to {name}")]
    CapabilityNotDefined { model: String, name: String },

    /// Nothing stored under the given key
    #[error("Record not found for key '{0}'")]
    NotFound(String),

    /// Key generator produced an empty key
    #[error("Primary key is missing or invalid")]
    MissingPrimaryKey,

    /// Value could not be converted to the attribute's declared type
    #[error("Cannot coerce attribute '{attribute}': {message}")]
    Coercion { attribute: String, message: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A lifecycle observer rejected the operation
    #[error("Observer error: {0}")]
    Observer(String),
}

impl ModelError {
    pub fn attribute_not_defined(model: &str, attribute: &str) -> Self {
        Self::AttributeNotDefined {
            model: model.to_string(),
            attribute: attribute.to_string(),
        }
    }

    pub fn capability_not_defined(model: &str, name: &str) -> Self {
        Self::CapabilityNotDefined {
            model: model.to_string(),
            name: name.to_string(),
        }
    }

    pub fn coercion(attribute: &str, message: impl Into<String>) -> Self {
        Self::Coercion {
            attribute: attribute.to_string(),
            message: message.into(),
        }
    }

    pub fn observer(message: &str) -> Self {
        Self::Observer(message.to_string())
    }

    /// Whether this error means "nothing stored under that key"
    pub fn is_not_found(&self) -> bool {
        matches!(self, ModelError::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_not_defined_message() {
        let err = ModelError::attribute_not_defined("User", "nickname");
        assert_eq!(err.to_string(), "User does not have attribute nickname");
    }

    #[test]
    fn test_store_errors_pass_through() {
        let err: ModelError = StoreError::Backend("connection reset".to_string()).into();
        assert!(matches!(err, ModelError::Store(StoreError::Backend(ref msg)) if msg == "connection reset"));
        assert_eq!(err.to_string(), "Store error: Backend error: connection reset");
    }

    #[test]
    fn test_not_found_predicate() {
        assert!(ModelError::NotFound("users:1".to_string()).is_not_found());
        assert!(!ModelError::MissingPrimaryKey.is_not_found());
    }
}
