//! Error types for the platform-access crate.
//!
//! - [`AuthError`]: session and token failures seen by a request
//! - [`ProviderError`]: identity provider failures
//! - [`SessionStoreError`]: session persistence failures
//!
//! Every error maps to a typed [`ErrorCode`]; transports derive their
//! status codes from it instead of inspecting messages.

use std::fmt;

/// Machine-readable error code shared by the REST and GraphQL surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// No usable session or token; the caller must (re-)login.
    Unauthenticated,
    /// Valid identity, insufficient tenant scope.
    Forbidden,
    /// The request itself is invalid (e.g. page size too large).
    BadRequest,
    /// CSRF state or replay nonce did not match.
    StateMismatch,
    /// A stored session value had an unexpected shape.
    SessionCorrupt,
    /// The identity provider could not be reached.
    ProviderUnavailable,
    /// The requested entity does not exist.
    NotFound,
    /// Any other server-side failure.
    Internal,
}

impl ErrorCode {
    /// Returns the code as it appears in error payloads.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::Forbidden => "FORBIDDEN",
            Self::BadRequest => "BAD_REQUEST",
            Self::StateMismatch => "STATE_MISMATCH",
            Self::SessionCorrupt => "SESSION_CORRUPT",
            Self::ProviderUnavailable => "PROVIDER_UNAVAILABLE",
            Self::NotFound => "NOT_FOUND",
            Self::Internal => "INTERNAL",
        }
    }

    /// Returns the HTTP status associated with the code.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Unauthenticated | Self::SessionCorrupt => 401,
            Self::Forbidden => 403,
            Self::BadRequest | Self::StateMismatch => 400,
            Self::NotFound => 404,
            Self::ProviderUnavailable => 503,
            Self::Internal => 500,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures talking to the OIDC identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Client configuration is invalid (bad URLs, missing endpoints).
    Configuration { reason: String },
    /// Transport failure or timeout. Retried by the [`RetryPolicy`](crate::RetryPolicy).
    Unavailable { reason: String },
    /// The provider answered with an OAuth2 error (e.g. `invalid_grant`).
    Rejected { reason: String },
    /// The token response carried no `id_token`.
    MissingIdToken,
    /// The ID token failed signature, issuer or audience verification.
    InvalidIdToken { reason: String },
    /// The ID token nonce differs from the one stored in the session.
    NonceMismatch,
}

impl ProviderError {
    /// Returns true if retrying the call may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration { reason } => write!(f, "OIDC configuration error: {reason}"),
            Self::Unavailable { reason } => write!(f, "identity provider unavailable: {reason}"),
            Self::Rejected { reason } => write!(f, "identity provider rejected request: {reason}"),
            Self::MissingIdToken => write!(f, "no id_token field in token response"),
            Self::InvalidIdToken { reason } => write!(f, "invalid id token: {reason}"),
            Self::NonceMismatch => write!(f, "id token nonce did not match"),
        }
    }
}

impl std::error::Error for ProviderError {}

/// Errors from authentication operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Missing or expired token and no valid refresh.
    Unauthenticated { reason: String },
    /// The callback `state` or the ID token `nonce` did not match the session.
    NonceOrStateMismatch { parameter: &'static str },
    /// A stored session value could not be decoded.
    SessionCorrupt { reason: String },
    /// The identity provider failed.
    Provider(ProviderError),
    /// The session store backend failed.
    SessionStore { details: String },
}

impl AuthError {
    /// Convenience constructor for [`AuthError::Unauthenticated`].
    #[must_use]
    pub fn unauthenticated(reason: impl Into<String>) -> Self {
        Self::Unauthenticated {
            reason: reason.into(),
        }
    }

    /// Returns the typed error code.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Unauthenticated { .. } => ErrorCode::Unauthenticated,
            Self::NonceOrStateMismatch { .. } => ErrorCode::StateMismatch,
            Self::SessionCorrupt { .. } => ErrorCode::SessionCorrupt,
            Self::Provider(ProviderError::Unavailable { .. }) => ErrorCode::ProviderUnavailable,
            Self::Provider(ProviderError::Configuration { .. }) => ErrorCode::Internal,
            Self::Provider(ProviderError::NonceMismatch) => ErrorCode::StateMismatch,
            Self::Provider(_) => ErrorCode::Unauthenticated,
            Self::SessionStore { .. } => ErrorCode::Internal,
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthenticated { reason } => write!(f, "not authenticated: {reason}"),
            Self::NonceOrStateMismatch { parameter } => {
                write!(f, "{parameter} did not match the session")
            }
            Self::SessionCorrupt { reason } => write!(f, "session is corrupt: {reason}"),
            Self::Provider(e) => write!(f, "{e}"),
            Self::SessionStore { details } => write!(f, "session store error: {details}"),
        }
    }
}

impl std::error::Error for AuthError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Provider(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ProviderError> for AuthError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::NonceMismatch => Self::NonceOrStateMismatch { parameter: "nonce" },
            other => Self::Provider(other),
        }
    }
}

/// Errors from session store backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStoreError {
    /// The backend could not read or write the session.
    Backend { details: String },
}

impl fmt::Display for SessionStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Backend { details } => write!(f, "session backend failure: {details}"),
        }
    }
}

impl std::error::Error for SessionStoreError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonce_mismatch_converts_to_state_mismatch() {
        let err: AuthError = ProviderError::NonceMismatch.into();
        assert_eq!(err, AuthError::NonceOrStateMismatch { parameter: "nonce" });
        assert_eq!(err.code(), ErrorCode::StateMismatch);
    }

    #[test]
    fn provider_outage_is_not_an_authentication_failure() {
        let err: AuthError = ProviderError::Unavailable {
            reason: "connection refused".to_string(),
        }
        .into();
        assert_eq!(err.code(), ErrorCode::ProviderUnavailable);
        assert_eq!(err.code().http_status(), 503);
    }

    #[test]
    fn rejected_refresh_maps_to_unauthenticated() {
        let err: AuthError = ProviderError::Rejected {
            reason: "invalid_grant".to_string(),
        }
        .into();
        assert_eq!(err.code(), ErrorCode::Unauthenticated);
        assert!(err.to_string().contains("invalid_grant"));
    }

    #[test]
    fn only_unavailable_is_transient() {
        assert!(ProviderError::Unavailable { reason: String::new() }.is_transient());
        assert!(!ProviderError::MissingIdToken.is_transient());
        assert!(!ProviderError::Rejected { reason: String::new() }.is_transient());
    }

    #[test]
    fn error_code_statuses() {
        assert_eq!(ErrorCode::Unauthenticated.http_status(), 401);
        assert_eq!(ErrorCode::SessionCorrupt.http_status(), 401);
        assert_eq!(ErrorCode::Forbidden.http_status(), 403);
        assert_eq!(ErrorCode::StateMismatch.http_status(), 400);
        assert_eq!(ErrorCode::Forbidden.to_string(), "FORBIDDEN");
    }
}
