//! Request-level authentication results.
//!
//! These are the values the transport layers attach to a request once the
//! token lifecycle has run:
//! - [`AuthenticatedUser`]: the session's user, resolved for this request
//! - [`CallbackData`]: query parameters of the OIDC redirect
//! - [`LoginOutcome`]: result of a completed login

use clerk_core::SessionId;
use serde::Deserialize;

use crate::claims::UserClaim;

/// The authenticated user of the current request.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    session_id: SessionId,
    claim: UserClaim,
}

impl AuthenticatedUser {
    #[must_use]
    pub fn new(session_id: SessionId, claim: UserClaim) -> Self {
        Self { session_id, claim }
    }

    /// Returns the session the user was resolved from.
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Returns the user's claim.
    #[must_use]
    pub fn claim(&self) -> &UserClaim {
        &self.claim
    }

    /// Consumes the user, returning the claim.
    #[must_use]
    pub fn into_claim(self) -> UserClaim {
        self.claim
    }
}

/// Query parameters of the OIDC callback.
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackData {
    /// The authorization code. Absent when the provider returned an error.
    pub code: Option<String>,
    /// The CSRF state echoed back by the provider.
    pub state: Option<String>,
    /// OAuth2 error code, e.g. `access_denied`.
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// A completed login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    /// The session now holding the tokens. Replaces the id the login
    /// started under.
    pub session_id: SessionId,
    /// The claim decoded from the new access token.
    pub claim: UserClaim,
    /// Where the browser asked to go before login, if anywhere.
    pub redirect_path: Option<String>,
}
