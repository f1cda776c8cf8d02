//! Host error types.
//!
//! Every fault raised by an OS collaborator is translated into a
//! [`HostError`] at the component boundary. None of them is fatal: callers
//! degrade (fallback label, fallback icon, empty poll) and keep running.

use thiserror::Error;

/// Errors raised by host collaborators.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HostError {
    /// A required permission (accessibility, usage access, overlay) is missing.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A package label or icon could not be resolved.
    #[error("lookup failed for '{0}'")]
    LookupFailed(String),

    /// The window manager rejected an add/update/remove.
    #[error("window manager error: {0}")]
    WindowManager(String),

    /// The wake-lock could not be acquired or released.
    #[error("wake lock error: {0}")]
    WakeLock(String),

    /// Any other host failure.
    #[error("host error: {0}")]
    Other(String),
}

impl HostError {
    /// Returns true if this error is a missing permission.
    #[must_use]
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied(_))
    }

    /// Returns true if this error is a failed lookup.
    #[must_use]
    pub fn is_lookup_failed(&self) -> bool {
        matches!(self, Self::LookupFailed(_))
    }

    /// Returns true if the caller should keep running.
    ///
    /// Host faults never take the island down.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        true
    }

    /// Returns a short hint for resolving this error.
    #[must_use]
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::PermissionDenied(_) => "Grant the permission in system settings",
            Self::LookupFailed(_) => "The package may have been uninstalled",
            Self::WindowManager(_) => "Check the overlay permission",
            Self::WakeLock(_) => "Background detection may pause while the device dozes",
            Self::Other(_) => "Restart the island service",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = HostError::LookupFailed("com.example".to_string());
        assert_eq!(err.to_string(), "lookup failed for 'com.example'");

        let err = HostError::PermissionDenied("usage access".to_string());
        assert_eq!(err.to_string(), "permission denied: usage access");
    }

    #[test]
    fn test_predicates() {
        assert!(HostError::PermissionDenied("x".into()).is_permission_denied());
        assert!(!HostError::WindowManager("x".into()).is_permission_denied());
        assert!(HostError::LookupFailed("x".into()).is_lookup_failed());
    }

    #[test]
    fn test_all_recoverable_with_suggestion() {
        let errors = vec![
            HostError::PermissionDenied("a".into()),
            HostError::LookupFailed("b".into()),
            HostError::WindowManager("c".into()),
            HostError::WakeLock("d".into()),
            HostError::Other("e".into()),
        ];
        for error in errors {
            assert!(error.is_recoverable());
            assert!(!error.suggestion().is_empty());
        }
    }
}
