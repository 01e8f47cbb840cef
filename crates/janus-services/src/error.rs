//! Error types for the service model.

use thiserror::Error;

/// Result type for service model operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors raised while constructing registered services and their policies.
///
/// These are configuration errors: they surface when a definition is built or
/// deserialized, never while a request is being evaluated.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ServiceError {
    /// A regular expression failed to compile.
    #[error("invalid pattern '{pattern}': {message}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Compiler diagnostic.
        message: String,
    },

    /// A service definition is structurally unusable.
    #[error("invalid service definition: {0}")]
    InvalidService(String),
}

impl ServiceError {
    /// Create an invalid pattern error.
    pub fn invalid_pattern(pattern: impl Into<String>, message: impl ToString) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            message: message.to_string(),
        }
    }

    /// Create an invalid service error.
    pub fn invalid_service(message: impl Into<String>) -> Self {
        Self::InvalidService(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_pattern_display() {
        let err = ServiceError::invalid_pattern("^(unclosed", "unclosed group");
        let message = err.to_string();
        assert!(message.contains("^(unclosed"));
        assert!(message.contains("unclosed group"));
    }

    #[test]
    fn test_invalid_service_display() {
        let err = ServiceError::invalid_service("name must not be blank");
        assert_eq!(
            err.to_string(),
            "invalid service definition: name must not be blank"
        );
    }
}
