//! Authentication module for the clerk server.
//!
//! This module provides:
//! - OIDC authentication against the external identity provider
//! - Postgres-backed session persistence
//! - Authentication middleware/extractors for Axum routes
//!
//! # Authorization Model
//!
//! Authentication (who is this?) is decided here, by the token lifecycle,
//! on every request to a protected route. Tenant scope (what may they see?)
//! is computed afterwards by the authorization gate from the user's claim;
//! see the `RequireScope` extractor.

pub mod db;
pub mod middleware;
pub mod oidc;
pub mod routes;

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use clerk_authz::AuthorizationGate;
use clerk_core::SessionId;
use clerk_platform_access::TokenLifecycle;
use std::sync::Arc;
use time::Duration as TimeDuration;

use crate::config::SessionConfig;
use crate::handler::HandlerService;

pub use db::PgSessionStore;
pub use middleware::{AuthRejection, RequireAuth, RequireScope, require_session};
pub use oidc::OidcClient;
pub use routes::{callback, login, logout};

/// Shared application state.
pub struct AppState {
    /// Session token lifecycle.
    pub lifecycle: TokenLifecycle,
    /// Tenant-scope authorization.
    pub gate: AuthorizationGate,
    /// Downstream data access.
    pub handler: Arc<dyn HandlerService>,
    /// Session configuration.
    pub session_config: SessionConfig,
}

impl AppState {
    /// Creates a new application state.
    pub fn new(
        lifecycle: TokenLifecycle,
        gate: AuthorizationGate,
        handler: Arc<dyn HandlerService>,
        session_config: SessionConfig,
    ) -> Self {
        Self {
            lifecycle,
            gate,
            handler,
            session_config,
        }
    }

    /// Returns the session id carried by the request's cookie, if valid.
    pub fn session_id(&self, jar: &CookieJar) -> Option<SessionId> {
        let cookie = jar.get(&self.session_config.cookie_name)?;
        match cookie.value().parse() {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::debug!(error = %e, "ignoring malformed session cookie");
                None
            }
        }
    }

    /// Builds the session cookie for `id`.
    pub fn session_cookie(&self, id: SessionId) -> Cookie<'static> {
        Cookie::build((self.session_config.cookie_name.clone(), id.to_string()))
            .path("/")
            .http_only(true)
            .secure(self.session_config.secure_cookies)
            .same_site(SameSite::Lax)
            .max_age(TimeDuration::minutes(self.session_config.idle_timeout_minutes))
            .build()
    }

    /// Builds a cookie that removes the session cookie.
    pub fn removal_cookie(&self) -> Cookie<'static> {
        Cookie::build((self.session_config.cookie_name.clone(), ""))
            .path("/")
            .max_age(TimeDuration::ZERO)
            .build()
    }
}
