//! Error types for the server's transports.
//!
//! [`ApiError`] is what REST controllers and GraphQL resolvers return. Its
//! HTTP status and GraphQL `extensions.code` both come from the typed
//! [`ErrorCode`], never from the message text.

use async_graphql::ErrorExtensions;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use clerk_authz::AuthzError;
use clerk_platform_access::{AuthError, ErrorCode, ProviderError};
use serde::Serialize;
use std::fmt;

use crate::handler::HandlerError;

/// Errors surfaced to API clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Authentication or session failure.
    Auth(AuthError),
    /// Insufficient tenant scope or invalid list options.
    Authz(AuthzError),
    /// The downstream handler service failed.
    Handler(HandlerError),
    /// The request is malformed.
    BadRequest { details: String },
}

impl ApiError {
    /// Returns the typed error code.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Auth(e) => e.code(),
            Self::Authz(e) => e.code(),
            Self::Handler(HandlerError::NotFound { .. }) => ErrorCode::NotFound,
            Self::Handler(HandlerError::InvalidInput { .. }) => ErrorCode::BadRequest,
            Self::Handler(HandlerError::Unavailable { .. }) => ErrorCode::Internal,
            Self::BadRequest { .. } => ErrorCode::BadRequest,
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.code().http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Returns the message shown to clients. Internal details are logged, not returned.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self.code() {
            ErrorCode::Internal => "internal server error".to_string(),
            ErrorCode::ProviderUnavailable => "identity provider unavailable".to_string(),
            _ => self.to_string(),
        }
    }

    /// Converts into a GraphQL error carrying `code` and `status` extensions.
    #[must_use]
    pub fn into_graphql(self) -> async_graphql::Error {
        self.log();
        let code = self.code();
        async_graphql::Error::new(self.public_message()).extend_with(|_, ext| {
            ext.set("code", code.as_str().to_string());
            ext.set("status", i32::from(code.http_status()));
        })
    }

    fn log(&self) {
        match self.code() {
            ErrorCode::Internal | ErrorCode::ProviderUnavailable => {
                tracing::error!(error = %self, code = %self.code(), "request failed");
            }
            code => tracing::debug!(error = %self, code = %code, "request rejected"),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auth(e) => write!(f, "{e}"),
            Self::Authz(e) => write!(f, "{e}"),
            Self::Handler(e) => write!(f, "{e}"),
            Self::BadRequest { details } => write!(f, "bad request: {details}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        Self::Auth(e)
    }
}

impl From<AuthzError> for ApiError {
    fn from(e: AuthzError) -> Self {
        Self::Authz(e)
    }
}

impl From<HandlerError> for ApiError {
    fn from(e: HandlerError) -> Self {
        Self::Handler(e)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.log();
        let body = ErrorBody {
            error: self.public_message(),
            code: self.code().as_str(),
        };
        (self.status(), Json(body)).into_response()
    }
}

/// Failures while starting the server.
#[derive(Debug)]
pub enum StartupError {
    Config { details: String },
    Database { details: String },
    Provider(ProviderError),
    Io { details: String },
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { details } => write!(f, "invalid configuration: {details}"),
            Self::Database { details } => write!(f, "database error: {details}"),
            Self::Provider(e) => write!(f, "identity provider error: {e}"),
            Self::Io { details } => write!(f, "I/O error: {details}"),
        }
    }
}

impl std::error::Error for StartupError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_error_codes() {
        let forbidden: ApiError = AuthzError::Forbidden {
            reason: "not allowed to retrieve data".to_string(),
        }
        .into();
        assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

        let unauthenticated: ApiError = AuthError::unauthenticated("no session").into();
        assert_eq!(unauthenticated.status(), StatusCode::UNAUTHORIZED);

        let outage: ApiError = AuthError::from(ProviderError::Unavailable {
            reason: "timeout".to_string(),
        })
        .into();
        assert_eq!(outage.status(), StatusCode::SERVICE_UNAVAILABLE);

        let missing: ApiError = HandlerError::NotFound {
            entity: "tenant",
            id: "t9".to_string(),
        }
        .into();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn internal_details_are_not_exposed() {
        let err: ApiError = AuthError::SessionStore {
            details: "connection to 10.0.0.5 refused".to_string(),
        }
        .into();

        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), "internal server error");
    }

    #[test]
    fn graphql_errors_carry_code_and_status() {
        let err: ApiError = AuthzError::Forbidden {
            reason: "not allowed to retrieve data".to_string(),
        }
        .into();

        let error = err.into_graphql();
        let extensions = error.extensions.expect("extensions");
        assert_eq!(
            extensions.get("code"),
            Some(&async_graphql::Value::from("FORBIDDEN"))
        );
        assert_eq!(
            extensions.get("status"),
            Some(&async_graphql::Value::from(403))
        );
    }
}
