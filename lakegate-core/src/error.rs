//! Error taxonomy for the validation engine

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, ValidationError>;

/// Errors that can occur while evaluating a change
///
/// Every variant except [`ValidationError::Configuration`] is produced by an
/// external read and ends up as a rejected verdict.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("diff unavailable between '{source_ref}' and '{destination_ref}': {reason}")]
    DiffUnavailable {
        source_ref: String,
        destination_ref: String,
        reason: String,
    },

    #[error("diff exceeds the limit of {limit} entries")]
    DiffTooLarge { limit: usize },

    #[error("listing unavailable for partition {partition}: {reason}")]
    ListingUnavailable { partition: String, reason: String },

    #[error("object unavailable: {path}: {reason}")]
    ObjectUnavailable { path: String, reason: String },

    #[error("unsupported format: {path}: {reason}")]
    UnsupportedFormat { path: String, reason: String },

    #[error("corrupt footer: {path}: {reason}")]
    CorruptFooter { path: String, reason: String },

    #[error("commit metadata unavailable for '{reference}': {reason}")]
    CommitMetadataUnavailable { reference: String, reason: String },

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl ValidationError {
    /// Shorthand for a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        ValidationError::Configuration(msg.into())
    }

    /// True for operator errors that must be reported before evaluation.
    pub fn is_configuration(&self) -> bool {
        matches!(self, ValidationError::Configuration(_))
    }

    /// The path or partition key the error is about, when there is one.
    pub fn subject(&self) -> Option<&str> {
        match self {
            ValidationError::ListingUnavailable { partition, .. } => Some(partition),
            ValidationError::ObjectUnavailable { path, .. }
            | ValidationError::UnsupportedFormat { path, .. }
            | ValidationError::CorruptFooter { path, .. } => Some(path),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_is_distinct() {
        assert!(ValidationError::config("missing 'allow'").is_configuration());
        assert!(!ValidationError::DiffTooLarge { limit: 10 }.is_configuration());
    }

    #[test]
    fn test_subject() {
        let err = ValidationError::ListingUnavailable {
            partition: "tables/dt=1/".into(),
            reason: "timeout".into(),
        };
        assert_eq!(err.subject(), Some("tables/dt=1/"));
        assert_eq!(err.to_string(), "listing unavailable for partition tables/dt=1/: timeout");
        assert_eq!(ValidationError::DiffTooLarge { limit: 1 }.subject(), None);
    }
}
