//! Bridge error types.
//!
//! A [`BridgeError`] always ends up as a `status: "error"` response; the
//! message is what the UI layer shows.

use thiserror::Error;

use crate::host::HostError;

/// Errors a bridge call can fail with.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// A required argument is absent or empty.
    #[error("{0}")]
    MissingArgument(&'static str),

    /// An argument is present but unusable.
    #[error("Invalid {name}: {reason}")]
    InvalidArgument { name: &'static str, reason: String },

    /// A host collaborator failed.
    #[error(transparent)]
    Host(#[from] HostError),
}

impl BridgeError {
    /// `saveAppRule` without both arguments.
    pub const MISSING_RULE: Self = Self::MissingArgument("Missing packageName or activityId");
    /// A call that needs a package name.
    pub const MISSING_PACKAGE: Self = Self::MissingArgument("Missing packageName");
    /// `showFloatingText` without text.
    pub const MISSING_TEXT: Self = Self::MissingArgument("Missing text");

    /// Returns true if the caller sent bad arguments.
    #[must_use]
    pub fn is_argument_error(&self) -> bool {
        matches!(self, Self::MissingArgument(_) | Self::InvalidArgument { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(
            BridgeError::MISSING_RULE.to_string(),
            "Missing packageName or activityId"
        );
        assert_eq!(BridgeError::MISSING_TEXT.to_string(), "Missing text");
        let err = BridgeError::InvalidArgument {
            name: "startTime",
            reason: "not a number".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid startTime: not a number");
    }

    #[test]
    fn test_host_errors_pass_through() {
        let err = BridgeError::from(HostError::PermissionDenied("usage access".into()));
        assert_eq!(err.to_string(), "permission denied: usage access");
        assert!(!err.is_argument_error());
        assert!(BridgeError::MISSING_PACKAGE.is_argument_error());
    }
}
