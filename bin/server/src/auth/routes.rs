//! Authentication routes for login, callback, and logout.

use axum::{
    Json,
    extract::{Query, State},
    response::{IntoResponse, Redirect},
};
use axum_extra::extract::cookie::CookieJar;
use clerk_core::SessionId;
use clerk_platform_access::{AuthError, CallbackData};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::AppState;
use crate::error::ApiError;

/// Query parameters for starting a login.
#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    /// Path to return to after login.
    redirect: Option<String>,
}

/// Response of [`login`].
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub auth_code_url: String,
}

/// Starts the OIDC login flow.
///
/// Reuses the request's session only if the store knows it, and returns the
/// identity provider URL the browser must visit.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LoginQuery>,
    jar: CookieJar,
) -> Result<impl IntoResponse, ApiError> {
    let session_id = state.lifecycle.login_session(state.session_id(&jar)).await?;

    let auth_code_url = state
        .lifecycle
        .begin_login(&session_id, query.redirect)
        .await?;

    let jar = jar.add(state.session_cookie(session_id));
    Ok((jar, Json(LoginResponse { auth_code_url })))
}

/// Handles the OIDC callback after the user authenticates with the identity provider.
///
/// A completed login lives under a new session id; the cookie is replaced.
pub async fn callback(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CallbackData>,
    jar: CookieJar,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(error) = &query.error {
        tracing::warn!(
            error = %error,
            description = query.error_description.as_deref().unwrap_or_default(),
            "identity provider returned an error"
        );
        return Err(AuthError::unauthenticated(format!("login failed: {error}")).into());
    }

    let session_id: SessionId = state
        .session_id(&jar)
        .ok_or(AuthError::NonceOrStateMismatch { parameter: "state" })?;
    let (Some(code), Some(callback_state)) = (&query.code, &query.state) else {
        return Err(ApiError::BadRequest {
            details: "code and state are required".to_string(),
        });
    };

    let outcome = state
        .lifecycle
        .complete_login(&session_id, code, callback_state)
        .await?;

    let jar = jar.add(state.session_cookie(outcome.session_id));
    let target = outcome.redirect_path.unwrap_or_else(|| "/".to_string());
    Ok((jar, Redirect::to(&target)))
}

/// Logs out the user by clearing their session.
///
/// Succeeds whether or not a session exists.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(session_id) = state.session_id(&jar) {
        state.lifecycle.logout(&session_id).await?;
    }

    Ok((jar.add(state.removal_cookie()), Redirect::to("/")))
}
