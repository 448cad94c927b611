//! Test support: a scripted identity provider and unsigned token builders.
//!
//! Enabled for this crate's own tests and, through the `testing` feature,
//! for dependent crates.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::error::ProviderError;
use crate::provider::{AuthorizationRequest, IdentityProvider, TokenSet};

/// Builds a compact JWT with an `alg: none` header and a dummy signature.
#[must_use]
pub fn unsigned_token(payload: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{header}.{body}.c2lnbmF0dXJl")
}

/// Builds an access token for `sub` with the given groups and tenant list.
#[must_use]
pub fn access_token(sub: &str, groups: &[&str], tenant_list: Value) -> String {
    unsigned_token(&json!({
        "sub": sub,
        "preferred_username": sub,
        "groups": groups,
        "tenant_list": tenant_list,
    }))
}

#[derive(Debug)]
struct Script {
    issued: u32,
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<Duration>,
    id_token_nonce: Option<String>,
    exchange_failure: Option<ProviderError>,
    refresh_failures: VecDeque<ProviderError>,
    refresh_delay: Duration,
}

/// An [`IdentityProvider`] that answers from a script and counts calls.
///
/// Authorization requests carry deterministic values: the n-th request
/// uses state `state-n` and nonce `nonce-n`.
#[derive(Debug)]
pub struct FakeProvider {
    script: Mutex<Script>,
    exchange_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
}

impl FakeProvider {
    /// Creates a provider issuing `access_token` with refresh token
    /// `refresh-1` and a 300 second lifetime.
    #[must_use]
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            script: Mutex::new(Script {
                issued: 0,
                access_token: access_token.into(),
                refresh_token: Some("refresh-1".to_string()),
                expires_in: Some(Duration::from_secs(300)),
                id_token_nonce: None,
                exchange_failure: None,
                refresh_failures: VecDeque::new(),
                refresh_delay: Duration::ZERO,
            }),
            exchange_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
        }
    }

    /// Sets `expires_in` on issued token sets.
    #[must_use]
    pub fn with_expires_in(self, expires_in: Option<Duration>) -> Self {
        self.edit(|s| s.expires_in = expires_in);
        self
    }

    /// Sets the refresh token on issued token sets.
    #[must_use]
    pub fn with_refresh_token(self, refresh_token: Option<&str>) -> Self {
        self.edit(|s| s.refresh_token = refresh_token.map(str::to_string));
        self
    }

    /// Makes the ID token carry `nonce` instead of echoing the expected one.
    #[must_use]
    pub fn with_id_token_nonce(self, nonce: &str) -> Self {
        self.edit(|s| s.id_token_nonce = Some(nonce.to_string()));
        self
    }

    /// Makes every code exchange fail with `error`.
    #[must_use]
    pub fn with_exchange_failure(self, error: ProviderError) -> Self {
        self.edit(|s| s.exchange_failure = Some(error));
        self
    }

    /// Queues a failure for the next refresh call.
    #[must_use]
    pub fn with_refresh_failure(self, error: ProviderError) -> Self {
        self.edit(|s| s.refresh_failures.push_back(error));
        self
    }

    /// Delays every refresh response.
    #[must_use]
    pub fn with_refresh_delay(self, delay: Duration) -> Self {
        self.edit(|s| s.refresh_delay = delay);
        self
    }

    /// Changes the access token issued from now on.
    pub fn set_access_token(&self, access_token: impl Into<String>) {
        let access_token = access_token.into();
        self.edit(|s| s.access_token = access_token);
    }

    #[must_use]
    pub fn exchange_calls(&self) -> usize {
        self.exchange_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    fn edit(&self, f: impl FnOnce(&mut Script)) {
        let mut script = self.script.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut script);
    }

    fn token_set(script: &Script, id_token_claims: Option<Value>) -> TokenSet {
        TokenSet {
            access_token: script.access_token.clone(),
            refresh_token: script.refresh_token.clone(),
            expires_in: script.expires_in,
            id_token_claims,
        }
    }
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    fn authorization_request(&self) -> Result<AuthorizationRequest, ProviderError> {
        let mut script = self.script.lock().unwrap_or_else(PoisonError::into_inner);
        script.issued += 1;
        let n = script.issued;
        Ok(AuthorizationRequest {
            url: format!(
                "https://idp.test/realms/dlza/protocol/openid-connect/auth?response_type=code&client_id=clerk&state=state-{n}&nonce=nonce-{n}&scope=openid+profile+email"
            ),
            state: format!("state-{n}"),
            nonce: format!("nonce-{n}"),
        })
    }

    async fn exchange_code(
        &self,
        _code: &str,
        expected_nonce: &str,
    ) -> Result<TokenSet, ProviderError> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        let script = self.script.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(error) = &script.exchange_failure {
            return Err(error.clone());
        }

        let nonce = script
            .id_token_nonce
            .clone()
            .unwrap_or_else(|| expected_nonce.to_string());
        if nonce != expected_nonce {
            return Err(ProviderError::NonceMismatch);
        }

        Ok(Self::token_set(
            &script,
            Some(json!({"sub": "fake-subject", "nonce": nonce})),
        ))
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<TokenSet, ProviderError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);

        let (delay, outcome) = {
            let mut script = self.script.lock().unwrap_or_else(PoisonError::into_inner);
            let outcome = match script.refresh_failures.pop_front() {
                Some(error) => Err(error),
                None => Ok(Self::token_set(&script, None)),
            };
            (script.refresh_delay, outcome)
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        outcome
    }
}
