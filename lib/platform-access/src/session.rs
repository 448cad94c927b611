//! Per-browser session state.
//!
//! A [`Session`] is the typed view of what the gateway keeps server-side for
//! one browser: OIDC tokens, their expiry, the one-time login challenge and
//! the cached [`UserClaim`]. It is persisted as a [`SessionRecord`], a flat
//! JSON object whose keys are stable so other deployments of the gateway can
//! share a session store.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::claims::{TenantPermission, UserClaim};
use crate::error::AuthError;
use crate::provider::TokenSet;

/// Whether a session's access token can be used right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    /// No tokens (or no expiry) stored; login is required.
    Unauthenticated,
    /// An access token is present and not yet expired.
    Valid,
    /// The access token expired; a refresh may recover the session.
    Expired,
}

/// Persisted form of a [`Session`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// RFC 3339 timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(
        rename = "userClaim",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub user_claim: Option<UserClaim>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keycloak_group: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tenant_list: Vec<TenantPermission>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_path: Option<String>,
}

/// Server-side state for one browser session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expiry: Option<DateTime<Utc>>,
    state: Option<String>,
    nonce: Option<String>,
    user_claim: Option<UserClaim>,
    redirect_path: Option<String>,
}

impl Session {
    /// Decodes a stored session value.
    ///
    /// Any value that is not a well-formed [`SessionRecord`] yields
    /// [`AuthError::SessionCorrupt`].
    pub fn decode(value: serde_json::Value) -> Result<Self, AuthError> {
        let record: SessionRecord =
            serde_json::from_value(value).map_err(|e| AuthError::SessionCorrupt {
                reason: e.to_string(),
            })?;
        Self::from_record(record)
    }

    /// Encodes the session for storage.
    pub fn encode(&self) -> Result<serde_json::Value, AuthError> {
        serde_json::to_value(self.to_record()).map_err(|e| AuthError::SessionCorrupt {
            reason: e.to_string(),
        })
    }

    /// Converts a persisted record into a session.
    pub fn from_record(record: SessionRecord) -> Result<Self, AuthError> {
        let expiry = record
            .expiry_token
            .as_deref()
            .map(|s| {
                DateTime::parse_from_rfc3339(s)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| AuthError::SessionCorrupt {
                        reason: format!("expiry_token: {e}"),
                    })
            })
            .transpose()?;

        Ok(Self {
            access_token: record.access_token,
            refresh_token: record.refresh_token,
            expiry,
            state: record.state,
            nonce: record.nonce,
            user_claim: record.user_claim,
            redirect_path: record.url_path,
        })
    }

    /// Converts the session into its persisted record.
    ///
    /// `username`, `keycloak_group` and `tenant_list` are denormalized from
    /// the cached claim.
    #[must_use]
    pub fn to_record(&self) -> SessionRecord {
        let claim = self.user_claim.as_ref();
        SessionRecord {
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
            expiry_token: self
                .expiry
                .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true)),
            state: self.state.clone(),
            nonce: self.nonce.clone(),
            username: claim.map(|c| c.username().to_string()),
            user_claim: self.user_claim.clone(),
            keycloak_group: claim
                .map(|c| c.groups().iter().cloned().collect())
                .unwrap_or_default(),
            tenant_list: claim.map(|c| c.tenant_list().to_vec()).unwrap_or_default(),
            url_path: self.redirect_path.clone(),
        }
    }

    /// Classifies the session's access token at `now`.
    #[must_use]
    pub fn token_state(&self, now: DateTime<Utc>) -> TokenState {
        let Some(expiry) = self.expiry else {
            return TokenState::Unauthenticated;
        };
        let has_access = self.access_token.as_deref().is_some_and(|t| !t.is_empty());

        if has_access && now < expiry {
            TokenState::Valid
        } else if has_access || self.refresh_token.is_some() {
            TokenState::Expired
        } else {
            TokenState::Unauthenticated
        }
    }

    /// Records a new login challenge, replacing any previous one.
    pub fn begin_login(&mut self, state: String, nonce: String, redirect_path: Option<String>) {
        self.state = Some(state);
        self.nonce = Some(nonce);
        self.redirect_path = redirect_path.and_then(|p| sanitize_redirect_path(&p));
    }

    /// Removes and returns the login challenge as `(state, nonce)`.
    pub fn take_login_challenge(&mut self) -> (Option<String>, Option<String>) {
        (self.state.take(), self.nonce.take())
    }

    /// Removes and returns the post-login redirect path.
    pub fn take_redirect_path(&mut self) -> Option<String> {
        self.redirect_path.take()
    }

    /// Stores a token set received at `now`.
    ///
    /// The expiry is `now + expires_in`, or `now + default_lifetime` when the
    /// provider omitted `expires_in` or sent one too large to represent. A token set without a refresh token
    /// keeps the previous one.
    pub fn apply_tokens(
        &mut self,
        tokens: &TokenSet,
        now: DateTime<Utc>,
        default_lifetime: chrono::Duration,
    ) {
        let expiry = tokens
            .expires_in
            .and_then(|d| chrono::Duration::from_std(d).ok())
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .or_else(|| now.checked_add_signed(default_lifetime));

        self.access_token = Some(tokens.access_token.clone());
        if let Some(refresh) = &tokens.refresh_token {
            self.refresh_token = Some(refresh.clone());
        }
        self.expiry = expiry;
    }

    /// Caches the claim decoded from the current access token.
    pub fn set_user_claim(&mut self, claim: UserClaim) {
        self.user_claim = Some(claim);
    }

    #[must_use]
    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    #[must_use]
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    #[must_use]
    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        self.expiry
    }

    #[must_use]
    pub fn user_claim(&self) -> Option<&UserClaim> {
        self.user_claim.as_ref()
    }

    #[must_use]
    pub fn redirect_path(&self) -> Option<&str> {
        self.redirect_path.as_deref()
    }

    /// Returns true while a login challenge is outstanding.
    #[must_use]
    pub fn has_login_challenge(&self) -> bool {
        self.state.is_some()
    }
}

/// Accepts only same-origin absolute paths as post-login redirects.
#[must_use]
pub fn sanitize_redirect_path(path: &str) -> Option<String> {
    let path = path.trim();
    if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') {
        Some(path.to_string())
    } else {
        None
    }
}
