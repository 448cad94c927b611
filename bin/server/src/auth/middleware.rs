//! Authentication middleware and extractors for Axum.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{StatusCode, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use clerk_authz::AuthorizationContext;
use clerk_platform_access::{AuthError, AuthenticatedUser, ErrorCode};
use std::sync::Arc;

use super::AppState;
use crate::error::ApiError;

/// Middleware guarding protected routes.
///
/// Authenticates the session cookie through the token lifecycle (refreshing
/// an expired token if needed) and stores the [`AuthenticatedUser`] in the
/// request extensions.
pub async fn require_session(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(session_id) = state.session_id(&jar) else {
        return AuthRejection::NotAuthenticated.into_response();
    };

    match state.lifecycle.authenticate(&session_id).await {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => {
            tracing::info!(session_id = %session_id, error = %e, "request not authenticated");
            AuthRejection::from(e).into_response()
        }
    }
}

/// Extractor for the user authenticated by [`require_session`].
pub struct RequireAuth(pub AuthenticatedUser);

impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .map(RequireAuth)
            .ok_or(AuthRejection::NotAuthenticated)
    }
}

/// Extractor for the authenticated user together with their tenant scope.
///
/// Fails with 403 when the user has no tenant scope.
pub struct RequireScope {
    pub user: AuthenticatedUser,
    pub scope: AuthorizationContext,
}

impl FromRequestParts<Arc<AppState>> for RequireScope {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let RequireAuth(user) = RequireAuth::from_request_parts(parts, state)
            .await
            .map_err(IntoResponse::into_response)?;

        let scope = state
            .gate
            .resolve(user.claim())
            .map_err(|e| ApiError::from(e).into_response())?;

        Ok(Self { user, scope })
    }
}

/// Rejection type for authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRejection {
    NotAuthenticated,
    ProviderUnavailable,
    InternalError,
}

impl From<AuthError> for AuthRejection {
    fn from(e: AuthError) -> Self {
        match e.code() {
            ErrorCode::ProviderUnavailable => Self::ProviderUnavailable,
            ErrorCode::Internal => Self::InternalError,
            _ => Self::NotAuthenticated,
        }
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::NotAuthenticated => (StatusCode::UNAUTHORIZED, "Unauthorized").into_response(),
            Self::ProviderUnavailable => {
                (StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable").into_response()
            }
            Self::InternalError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
        }
    }
}
