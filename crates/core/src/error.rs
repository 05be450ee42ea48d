//! Error taxonomy shared by every portal crate.

use thiserror::Error;

/// Result type used across the session layer.
pub type PortalResult<T> = Result<T, PortalError>;

/// Portal-level error.
///
/// Only `NotFound` and the validation family are meant to reach a UI surface.
/// `Unauthorized` is recovered by a forced logout, and network failures are
/// logged and surface only as a stalled loading state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PortalError {
    /// A tenant slug (or other resource) could not be resolved.
    #[error("not found")]
    NotFound,

    /// The stored credential is missing, invalid or expired.
    #[error("unauthorized")]
    Unauthorized,

    /// The backend could not be reached or the transport failed.
    #[error("network failure: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    /// Client-side form validation failed (e.g. password confirmation mismatch).
    #[error("validation failed: {0}")]
    Validation(String),

    /// The backend rejected the supplied current credential.
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    /// The backend rejected the new credential against its policy.
    #[error("policy violation: {0}")]
    PolicyViolation(String),

    /// An identifier or slug was malformed.
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// Any other non-success answer from the backend.
    #[error("unexpected response: {0}")]
    Unexpected(String),
}

impl PortalError {
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_credentials(msg: impl Into<String>) -> Self {
        Self::InvalidCredentials(msg.into())
    }

    pub fn policy_violation(msg: impl Into<String>) -> Self {
        Self::PolicyViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn unexpected(msg: impl Into<String>) -> Self {
        Self::Unexpected(msg.into())
    }

    /// Errors that belong inline on the originating form.
    pub fn is_validation_failure(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::InvalidCredentials(_) | Self::PolicyViolation(_)
        )
    }

    /// Errors caused by transport trouble rather than a definite answer.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_inline_errors() {
        assert!(PortalError::validation("mismatch").is_validation_failure());
        assert!(PortalError::invalid_credentials("wrong").is_validation_failure());
        assert!(PortalError::policy_violation("short").is_validation_failure());
        assert!(!PortalError::Unauthorized.is_validation_failure());
        assert!(!PortalError::NotFound.is_validation_failure());
    }

    #[test]
    fn classifies_transient_errors() {
        assert!(PortalError::Timeout.is_transient());
        assert!(PortalError::network("refused").is_transient());
        assert!(!PortalError::Unauthorized.is_transient());
    }
}
