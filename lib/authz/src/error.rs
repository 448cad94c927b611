//! Authorization error types.

use clerk_platform_access::ErrorCode;
use std::fmt;

/// Authorization errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthzError {
    /// The user's scope does not cover the requested data or operation.
    Forbidden {
        /// Why access was denied.
        reason: String,
    },
    /// The request parameters are invalid.
    InvalidInput {
        /// Error details.
        details: String,
    },
}

impl AuthzError {
    pub(crate) fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_input(details: impl Into<String>) -> Self {
        Self::InvalidInput {
            details: details.into(),
        }
    }

    /// Returns the typed error code.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Forbidden { .. } => ErrorCode::Forbidden,
            Self::InvalidInput { .. } => ErrorCode::BadRequest,
        }
    }
}

impl fmt::Display for AuthzError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forbidden { reason } => write!(f, "forbidden: {reason}"),
            Self::InvalidInput { details } => write!(f, "invalid request: {details}"),
        }
    }
}

impl std::error::Error for AuthzError {}
