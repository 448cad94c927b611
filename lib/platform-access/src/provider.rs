//! The identity provider seam.
//!
//! [`IdentityProvider`] abstracts the three OIDC calls the token lifecycle
//! needs. The production implementation (discovery, code exchange and
//! ID token verification via `openidconnect`) lives in the server binary;
//! tests use the scripted provider from the `testing` module.

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

use crate::error::ProviderError;

/// A freshly generated authorization redirect.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    /// The provider authorization URL to send the browser to.
    pub url: String,
    /// CSRF token embedded in `url` as `state`.
    pub state: String,
    /// Replay nonce embedded in `url` as `nonce`.
    pub nonce: String,
}

/// Tokens returned by a code exchange or refresh.
#[derive(Clone)]
pub struct TokenSet {
    pub access_token: String,
    /// Absent when the provider does not rotate refresh tokens.
    pub refresh_token: Option<String>,
    pub expires_in: Option<Duration>,
    /// Verified ID token claims (code exchange only).
    pub id_token_claims: Option<serde_json::Value>,
}

impl fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"[redacted]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[redacted]"),
            )
            .field("expires_in", &self.expires_in)
            .field("id_token_claims", &self.id_token_claims.is_some())
            .finish()
    }
}

/// Client side of the OIDC authorization code flow.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Generates a new authorization URL with fresh `state` and `nonce` values.
    ///
    /// Makes no network call.
    fn authorization_request(&self) -> Result<AuthorizationRequest, ProviderError>;

    /// Exchanges an authorization code for tokens.
    ///
    /// Implementations must verify the ID token and fail with
    /// [`ProviderError::NonceMismatch`] if its nonce differs from
    /// `expected_nonce`.
    async fn exchange_code(
        &self,
        code: &str,
        expected_nonce: &str,
    ) -> Result<TokenSet, ProviderError>;

    /// Exchanges a refresh token for a new token set.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, ProviderError>;
}
