//! Rule store error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the rule store.
#[derive(Debug, Error)]
pub enum RuleStoreError {
    /// The package key was empty.
    #[error("Missing packageName")]
    EmptyPackage,

    /// The activity id was empty.
    #[error("Missing activityId")]
    EmptyActivity,

    /// The rules file exists but could not be read.
    #[error("failed to read rules from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The rules file is not a JSON object.
    #[error("failed to parse rules in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The rules could not be written back.
    #[error("failed to write rules to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RuleStoreError {
    /// Returns true for persistence faults, which never fail a request.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Read { .. } | Self::Parse { .. } | Self::Write { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_are_not_recoverable() {
        assert!(!RuleStoreError::EmptyPackage.is_recoverable());
        assert!(!RuleStoreError::EmptyActivity.is_recoverable());
    }

    #[test]
    fn test_write_error_is_recoverable() {
        let err = RuleStoreError::Write {
            path: PathBuf::from("/ro/rules.json"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
        };
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("/ro/rules.json"));
    }
}
