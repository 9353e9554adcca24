//! Application error types with stable error codes.

use thiserror::Error;

/// Application-level errors for template replication.
///
/// None of these are recovered locally. A failure partway through a
/// replication run leaves whatever was already created in place.
#[derive(Error, Debug)]
pub enum AppError {
    // Caller errors
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    // Lookup errors
    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    #[error("Relationship not found: {0}")]
    RelationshipNotFound(String),

    #[error("Unknown type: {0}")]
    UnknownType(String),

    #[error("Entity {guid} is of type {actual}, expected {expected}")]
    TypeMismatch {
        guid: String,
        expected: String,
        actual: String,
    },

    // Security errors
    #[error("User '{user_id}' is not authorized to {action}")]
    Unauthorized { user_id: String, action: String },

    #[error("Entity {0} is not visible to this caller")]
    InvisibleEntity(String),

    // Repository errors
    #[error("Repository error: {0}")]
    Repository(String),

    #[error("Template graph deeper than {max_depth} levels at {guid}")]
    DepthExceeded { max_depth: usize, guid: String },

    // Config errors
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    /// Shorthand for an [`AppError::InvalidParameter`].
    pub fn invalid(name: &str, reason: impl Into<String>) -> Self {
        AppError::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// Stable code identifying the error class.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidParameter { .. } => "INVALID_PARAMETER",
            AppError::EntityNotFound(_) => "ENTITY_NOT_FOUND",
            AppError::RelationshipNotFound(_) => "RELATIONSHIP_NOT_FOUND",
            AppError::UnknownType(_) => "UNKNOWN_TYPE",
            AppError::TypeMismatch { .. } => "TYPE_MISMATCH",
            AppError::Unauthorized { .. } => "UNAUTHORIZED",
            AppError::InvisibleEntity(_) => "INVISIBLE_ENTITY",
            AppError::Repository(_) => "REPOSITORY_ERROR",
            AppError::DepthExceeded { .. } => "DEPTH_EXCEEDED",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Whether a caller may reasonably retry the whole request.
    ///
    /// Only infrastructure failures qualify; nothing is retried here.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Repository(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_and_message() {
        let err = AppError::EntityNotFound("abc".to_string());
        assert_eq!(err.code(), "ENTITY_NOT_FOUND");
        assert_eq!(err.to_string(), "Entity not found: abc");
    }

    #[test]
    fn test_invalid_shorthand() {
        let err = AppError::invalid("template_guid", "must not be empty");
        assert_eq!(err.code(), "INVALID_PARAMETER");
        assert!(err.to_string().contains("template_guid"));
    }

    #[test]
    fn test_only_repository_errors_are_retryable() {
        assert!(AppError::Repository("down".to_string()).is_retryable());
        assert!(!AppError::Unauthorized {
            user_id: "u".to_string(),
            action: "create Port".to_string(),
        }
        .is_retryable());
    }
}
