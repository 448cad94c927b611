//! The token lifecycle: login, per-request authentication, refresh, logout.
//!
//! [`TokenLifecycle`] is the only component that writes tokens into a
//! session. It owns the rules for when a session is authenticated:
//!
//! - a login challenge (`state`, `nonce`) is consumed by the first callback
//!   that presents it, whether or not the login then succeeds
//! - tokens are written only after a successful code exchange whose ID token
//!   nonce matched, and always under a newly minted session id
//! - an expired access token is refreshed at most once per session at a
//!   time; concurrent requests wait for that refresh and reuse its result
//! - a refresh rejected by the provider ends the session, while a provider
//!   outage leaves it intact for a later retry
//! - writes after a provider call never recreate a session that was cleared
//!   in the meantime, so a logout cannot be undone by an in-flight refresh

use chrono::Utc;
use clerk_core::SessionId;
use rootcause::Report;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError};

use crate::auth::{AuthenticatedUser, LoginOutcome};
use crate::claims::{ClaimExtractor, UserClaim};
use crate::error::{AuthError, SessionStoreError};
use crate::provider::IdentityProvider;
use crate::retry::RetryPolicy;
use crate::session::{Session, TokenState};
use crate::store::SessionStore;

/// Lifetime assumed for tokens issued without `expires_in`.
pub const DEFAULT_TOKEN_LIFETIME_SECONDS: i64 = 300;

/// Drives sessions through login, authentication, refresh and logout.
pub struct TokenLifecycle {
    provider: Arc<dyn IdentityProvider>,
    store: Arc<dyn SessionStore>,
    extractor: ClaimExtractor,
    retry: RetryPolicy,
    default_token_lifetime: chrono::Duration,
    refresh_locks: RefreshLocks,
}

impl TokenLifecycle {
    /// Creates a lifecycle with the default retry policy and token lifetime.
    #[must_use]
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        store: Arc<dyn SessionStore>,
        extractor: ClaimExtractor,
    ) -> Self {
        Self {
            provider,
            store,
            extractor,
            retry: RetryPolicy::default(),
            default_token_lifetime: chrono::Duration::seconds(DEFAULT_TOKEN_LIFETIME_SECONDS),
            refresh_locks: RefreshLocks::default(),
        }
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_default_token_lifetime(mut self, lifetime: chrono::Duration) -> Self {
        self.default_token_lifetime = lifetime;
        self
    }

    /// Returns the session store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Picks the session a new login starts under.
    ///
    /// A presented id is reused only if the store knows it; anything else
    /// gets a freshly minted id.
    pub async fn login_session(
        &self,
        presented: Option<SessionId>,
    ) -> Result<SessionId, AuthError> {
        if let Some(id) = presented {
            if self.store.get(&id).await.map_err(store_error)?.is_some() {
                return Ok(id);
            }
            tracing::debug!(session_id = %id, "ignoring unknown session id");
        }
        Ok(SessionId::new())
    }

    /// Starts a login for the session and returns the authorization URL.
    ///
    /// Fresh `state` and `nonce` values replace any previous challenge.
    /// Existing tokens are left untouched until the login completes.
    pub async fn begin_login(
        &self,
        session_id: &SessionId,
        redirect_path: Option<String>,
    ) -> Result<String, AuthError> {
        let request = self.provider.authorization_request()?;

        let mut session = self.load(session_id).await?.unwrap_or_default();
        session.begin_login(request.state, request.nonce, redirect_path);
        self.save(session_id, &session).await?;

        tracing::info!(session_id = %session_id, "login started");
        Ok(request.url)
    }

    /// Completes a login from the provider callback.
    ///
    /// Fails with [`AuthError::NonceOrStateMismatch`] before any provider
    /// call if `state` is not the session's outstanding challenge. On
    /// success the session moves to a new id, returned in the outcome, and
    /// the id the login started under is cleared.
    pub async fn complete_login(
        &self,
        session_id: &SessionId,
        code: &str,
        state: &str,
    ) -> Result<LoginOutcome, AuthError> {
        let mismatch = |parameter| AuthError::NonceOrStateMismatch { parameter };

        let mut session = self
            .load(session_id)
            .await?
            .ok_or_else(|| mismatch("state"))?;

        let (expected_state, nonce) = session.take_login_challenge();
        let redirect_path = session.take_redirect_path();
        // The challenge is single-use even if this attempt fails below.
        if !self.save_existing(session_id, &session).await? {
            return Err(mismatch("state"));
        }

        if expected_state.as_deref() != Some(state) {
            tracing::warn!(session_id = %session_id, "login callback state mismatch");
            return Err(mismatch("state"));
        }
        let nonce = nonce.ok_or_else(|| mismatch("nonce"))?;

        let tokens = self
            .retry
            .run("exchange_code", || self.provider.exchange_code(code, &nonce))
            .await
            .inspect_err(|e| {
                tracing::warn!(session_id = %session_id, error = %e, "code exchange failed");
            })?;

        let claim = self.extractor.extract(&tokens.access_token)?;
        session.apply_tokens(&tokens, Utc::now(), self.default_token_lifetime);
        session.set_user_claim(claim.clone());

        let rotated = SessionId::new();
        self.save(&rotated, &session).await?;
        self.store.clear(session_id).await.map_err(store_error)?;

        tracing::info!(
            session_id = %rotated,
            previous_session_id = %session_id,
            subject = claim.subject(),
            tenants = claim.tenant_list().len(),
            "login completed"
        );
        Ok(LoginOutcome {
            session_id: rotated,
            claim,
            redirect_path,
        })
    }

    /// Resolves the session's user, refreshing an expired token first.
    pub async fn authenticate(
        &self,
        session_id: &SessionId,
    ) -> Result<AuthenticatedUser, AuthError> {
        let session = self
            .load(session_id)
            .await?
            .ok_or_else(|| AuthError::unauthenticated("no session"))?;

        let session = match session.token_state(Utc::now()) {
            TokenState::Valid => session,
            TokenState::Expired => self.refresh(session_id).await?,
            TokenState::Unauthenticated => {
                return Err(AuthError::unauthenticated("session has no token"));
            }
        };

        let claim = self.current_claim(session_id, session).await?;
        Ok(AuthenticatedUser::new(*session_id, claim))
    }

    /// Ends the session. Succeeds for sessions that do not exist.
    pub async fn logout(&self, session_id: &SessionId) -> Result<(), AuthError> {
        self.store.clear(session_id).await.map_err(store_error)?;
        tracing::info!(session_id = %session_id, "logged out");
        Ok(())
    }

    /// Returns the claim for the session's current access token, updating the
    /// cached copy when the token changed.
    async fn current_claim(
        &self,
        session_id: &SessionId,
        mut session: Session,
    ) -> Result<UserClaim, AuthError> {
        let token = session
            .access_token()
            .ok_or_else(|| AuthError::unauthenticated("session has no token"))?;
        let claim = self.extractor.extract(token)?;

        if session.user_claim() != Some(&claim) {
            session.set_user_claim(claim.clone());
            if !self.save_existing(session_id, &session).await? {
                return Err(AuthError::unauthenticated("session ended"));
            }
        }
        Ok(claim)
    }

    async fn refresh(&self, session_id: &SessionId) -> Result<Session, AuthError> {
        let lock = self.refresh_locks.acquire(session_id);
        let result = {
            let _guard = lock.lock().await;
            self.refresh_exclusive(session_id).await
        };
        self.refresh_locks.release(session_id, lock);
        result
    }

    /// Refreshes the session's tokens. Callers hold the session's refresh lock.
    async fn refresh_exclusive(&self, session_id: &SessionId) -> Result<Session, AuthError> {
        // Another request may have refreshed while this one waited.
        let mut session = self
            .load(session_id)
            .await?
            .ok_or_else(|| AuthError::unauthenticated("session ended during refresh"))?;

        match session.token_state(Utc::now()) {
            TokenState::Valid => {
                tracing::debug!(session_id = %session_id, "token already refreshed");
                return Ok(session);
            }
            TokenState::Unauthenticated => {
                return Err(AuthError::unauthenticated("session has no token"));
            }
            TokenState::Expired => {}
        }

        let Some(refresh_token) = session.refresh_token().map(str::to_string) else {
            self.discard(session_id).await;
            return Err(AuthError::unauthenticated(
                "token expired and no refresh token is available",
            ));
        };

        match self
            .retry
            .run("refresh", || self.provider.refresh(&refresh_token))
            .await
        {
            Ok(tokens) => {
                session.apply_tokens(&tokens, Utc::now(), self.default_token_lifetime);
                if !self.save_existing(session_id, &session).await? {
                    tracing::info!(session_id = %session_id, "session ended during refresh");
                    return Err(AuthError::unauthenticated("session ended during refresh"));
                }
                tracing::info!(session_id = %session_id, "token refreshed");
                Ok(session)
            }
            Err(e) if e.is_transient() => {
                tracing::warn!(session_id = %session_id, error = %e, "token refresh unavailable");
                Err(e.into())
            }
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "token refresh rejected");
                self.discard(session_id).await;
                Err(AuthError::unauthenticated(format!("token refresh failed: {e}")))
            }
        }
    }

    /// Loads and decodes a session. Corrupt sessions are removed.
    async fn load(&self, session_id: &SessionId) -> Result<Option<Session>, AuthError> {
        let Some(value) = self.store.get(session_id).await.map_err(store_error)? else {
            return Ok(None);
        };

        match Session::decode(value) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "discarding corrupt session");
                self.discard(session_id).await;
                Err(e)
            }
        }
    }

    async fn save(&self, session_id: &SessionId, session: &Session) -> Result<(), AuthError> {
        let value = session.encode()?;
        self.store
            .set(session_id, value)
            .await
            .map_err(store_error)
    }

    /// Writes the session only if it is still stored; returns whether it was.
    async fn save_existing(
        &self,
        session_id: &SessionId,
        session: &Session,
    ) -> Result<bool, AuthError> {
        let value = session.encode()?;
        self.store
            .update(session_id, value)
            .await
            .map_err(store_error)
    }

    async fn discard(&self, session_id: &SessionId) {
        if let Err(report) = self.store.clear(session_id).await {
            tracing::error!(session_id = %session_id, error = %report, "failed to clear session");
        }
    }
}

impl std::fmt::Debug for TokenLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenLifecycle")
            .field("extractor", &self.extractor)
            .field("retry", &self.retry)
            .field("default_token_lifetime", &self.default_token_lifetime)
            .finish_non_exhaustive()
    }
}

fn store_error(report: Report<SessionStoreError>) -> AuthError {
    AuthError::SessionStore {
        details: report.to_string(),
    }
}

/// One async mutex per session currently refreshing.
#[derive(Default)]
struct RefreshLocks {
    locks: std::sync::Mutex<HashMap<SessionId, Arc<tokio::sync::Mutex<()>>>>,
}

impl RefreshLocks {
    fn acquire(&self, session_id: &SessionId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(*session_id).or_default())
    }

    /// Drops the caller's handle, removing the entry once nobody else holds it.
    fn release(&self, session_id: &SessionId, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        drop(lock);
        if locks
            .get(session_id)
            .is_some_and(|l| Arc::strong_count(l) == 1)
        {
            locks.remove(session_id);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorCode, ProviderError};
    use crate::store::MemorySessionStore;
    use crate::testing::{FakeProvider, access_token};
    use serde_json::json;
    use std::time::Duration;

    struct Harness {
        provider: Arc<FakeProvider>,
        store: Arc<MemorySessionStore>,
        lifecycle: TokenLifecycle,
    }

    fn harness(provider: FakeProvider) -> Harness {
        let provider = Arc::new(provider);
        let store = Arc::new(MemorySessionStore::new());
        let lifecycle = TokenLifecycle::new(
            provider.clone(),
            store.clone(),
            ClaimExtractor::new("groups", "tenant_list"),
        )
        .with_retry_policy(RetryPolicy {
            max_attempts: 2,
            initial_backoff_ms: 1,
            max_backoff_ms: 1,
            request_timeout_ms: 1000,
        });
        Harness {
            provider,
            store,
            lifecycle,
        }
    }

    fn alice_token() -> String {
        access_token(
            "alice",
            &["dlza-users"],
            json!([{"id": "t1", "create": true, "read": true, "update": true, "delete": true}]),
        )
    }

    async fn logged_in(h: &Harness) -> SessionId {
        let id = SessionId::new();
        h.lifecycle.begin_login(&id, None).await.expect("begin");
        h.lifecycle
            .complete_login(&id, "code", "state-1")
            .await
            .expect("complete")
            .session_id
    }

    async fn expire(h: &Harness, id: &SessionId) {
        let mut value = h.store.get(id).await.expect("get").expect("session");
        value["expiry_token"] = json!("2000-01-01T00:00:00Z");
        h.store.set(id, value).await.expect("set");
    }

    async fn stored(h: &Harness, id: &SessionId) -> Option<Session> {
        h.store
            .get(id)
            .await
            .expect("get")
            .map(|v| Session::decode(v).expect("decode"))
    }

    #[tokio::test]
    async fn begin_login_stores_challenge() {
        let h = harness(FakeProvider::new(alice_token()));
        let id = SessionId::new();

        let url = h
            .lifecycle
            .begin_login(&id, Some("/collections".to_string()))
            .await
            .expect("begin");

        assert!(url.contains("state=state-1"));
        assert!(url.contains("nonce=nonce-1"));
        let session = stored(&h, &id).await.expect("session");
        assert!(session.has_login_challenge());
        assert_eq!(session.redirect_path(), Some("/collections"));
        assert_eq!(session.token_state(Utc::now()), TokenState::Unauthenticated);
    }

    #[tokio::test]
    async fn login_round_trip_then_authenticate() {
        let h = harness(FakeProvider::new(alice_token()));
        let id = SessionId::new();
        h.lifecycle
            .begin_login(&id, Some("/tenants".to_string()))
            .await
            .expect("begin");

        let outcome = h
            .lifecycle
            .complete_login(&id, "code", "state-1")
            .await
            .expect("complete");

        assert_eq!(outcome.claim.subject(), "alice");
        assert_eq!(outcome.redirect_path.as_deref(), Some("/tenants"));
        assert_eq!(h.provider.exchange_calls(), 1);

        let user = h
            .lifecycle
            .authenticate(&outcome.session_id)
            .await
            .expect("authenticate");
        assert_eq!(user.claim(), &outcome.claim);
        assert_eq!(user.session_id(), outcome.session_id);
        assert_eq!(h.provider.refresh_calls(), 0);

        let session = stored(&h, &outcome.session_id).await.expect("session");
        assert!(!session.has_login_challenge());
        assert_eq!(session.refresh_token(), Some("refresh-1"));
    }

    #[tokio::test]
    async fn login_moves_session_to_a_new_id() {
        let h = harness(FakeProvider::new(alice_token()));
        let planted = SessionId::new();
        h.lifecycle.begin_login(&planted, None).await.expect("begin");

        let outcome = h
            .lifecycle
            .complete_login(&planted, "code", "state-1")
            .await
            .expect("complete");

        assert_ne!(outcome.session_id, planted);
        assert!(stored(&h, &planted).await.is_none());
        let err = h.lifecycle.authenticate(&planted).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Unauthenticated);
        h.lifecycle
            .authenticate(&outcome.session_id)
            .await
            .expect("authenticate");
    }

    #[tokio::test]
    async fn login_session_ignores_unknown_ids() {
        let h = harness(FakeProvider::new(alice_token()));
        let unknown = SessionId::new();

        let id = h.lifecycle.login_session(Some(unknown)).await.expect("id");
        assert_ne!(id, unknown);
        assert_ne!(h.lifecycle.login_session(None).await.expect("id"), id);

        let known = SessionId::new();
        h.lifecycle.begin_login(&known, None).await.expect("begin");
        assert_eq!(
            h.lifecycle.login_session(Some(known)).await.expect("id"),
            known
        );
    }

    #[tokio::test]
    async fn state_mismatch_fails_before_exchange() {
        let h = harness(FakeProvider::new(alice_token()));
        let id = SessionId::new();
        h.lifecycle.begin_login(&id, None).await.expect("begin");

        let err = h
            .lifecycle
            .complete_login(&id, "code", "forged")
            .await
            .unwrap_err();

        assert_eq!(err, AuthError::NonceOrStateMismatch { parameter: "state" });
        assert_eq!(err.code(), ErrorCode::StateMismatch);
        assert_eq!(h.provider.exchange_calls(), 0);
        let session = stored(&h, &id).await.expect("session");
        assert_eq!(session.token_state(Utc::now()), TokenState::Unauthenticated);
    }

    #[tokio::test]
    async fn challenge_cannot_be_replayed() {
        let h = harness(FakeProvider::new(alice_token()));
        let id = logged_in(&h).await;

        let err = h
            .lifecycle
            .complete_login(&id, "code", "state-1")
            .await
            .unwrap_err();

        assert_eq!(err, AuthError::NonceOrStateMismatch { parameter: "state" });
        assert_eq!(h.provider.exchange_calls(), 1);
    }

    #[tokio::test]
    async fn callback_without_session_is_a_mismatch() {
        let h = harness(FakeProvider::new(alice_token()));

        let err = h
            .lifecycle
            .complete_login(&SessionId::new(), "code", "state-1")
            .await
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::StateMismatch);
        assert_eq!(h.provider.exchange_calls(), 0);
    }

    #[tokio::test]
    async fn nonce_mismatch_writes_no_tokens() {
        let h = harness(FakeProvider::new(alice_token()).with_id_token_nonce("replayed"));
        let id = SessionId::new();
        h.lifecycle.begin_login(&id, None).await.expect("begin");

        let err = h
            .lifecycle
            .complete_login(&id, "code", "state-1")
            .await
            .unwrap_err();

        assert_eq!(err, AuthError::NonceOrStateMismatch { parameter: "nonce" });
        let session = stored(&h, &id).await.expect("session");
        assert!(session.access_token().is_none());
        assert!(!session.has_login_challenge());
    }

    #[tokio::test]
    async fn second_login_replaces_challenge() {
        let h = harness(FakeProvider::new(alice_token()));
        let id = SessionId::new();
        h.lifecycle.begin_login(&id, None).await.expect("first");
        h.lifecycle.begin_login(&id, None).await.expect("second");

        let err = h
            .lifecycle
            .complete_login(&id, "code", "state-1")
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::StateMismatch);

        h.lifecycle.begin_login(&id, None).await.expect("third");
        h.lifecycle
            .complete_login(&id, "code", "state-3")
            .await
            .expect("complete");
    }

    #[tokio::test]
    async fn missing_session_is_unauthenticated() {
        let h = harness(FakeProvider::new(alice_token()));
        let err = h.lifecycle.authenticate(&SessionId::new()).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Unauthenticated);
    }

    #[tokio::test]
    async fn session_with_only_a_challenge_is_unauthenticated() {
        let h = harness(FakeProvider::new(alice_token()));
        let id = SessionId::new();
        h.lifecycle.begin_login(&id, None).await.expect("begin");

        let err = h.lifecycle.authenticate(&id).await.unwrap_err();

        assert_eq!(err.code(), ErrorCode::Unauthenticated);
        assert_eq!(h.provider.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn expired_token_is_refreshed() {
        let h = harness(FakeProvider::new(alice_token()));
        let id = logged_in(&h).await;
        expire(&h, &id).await;
        h.provider.set_access_token(access_token("alice", &["dlza-admin"], json!([])));

        let user = h.lifecycle.authenticate(&id).await.expect("authenticate");

        assert_eq!(h.provider.refresh_calls(), 1);
        assert!(user.claim().in_group("dlza-admin"));
        let session = stored(&h, &id).await.expect("session");
        assert_eq!(session.token_state(Utc::now()), TokenState::Valid);
        assert_eq!(session.user_claim(), Some(user.claim()));
    }

    #[tokio::test]
    async fn concurrent_requests_share_one_refresh() {
        let h = harness(
            FakeProvider::new(alice_token()).with_refresh_delay(Duration::from_millis(50)),
        );
        let id = logged_in(&h).await;
        expire(&h, &id).await;

        let (a, b, c) = tokio::join!(
            h.lifecycle.authenticate(&id),
            h.lifecycle.authenticate(&id),
            h.lifecycle.authenticate(&id),
        );

        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(h.provider.refresh_calls(), 1);
        assert_eq!(h.lifecycle.refresh_locks.len(), 0);
    }

    #[tokio::test]
    async fn logout_during_refresh_stays_logged_out() {
        let h = harness(
            FakeProvider::new(alice_token()).with_refresh_delay(Duration::from_millis(100)),
        );
        let id = logged_in(&h).await;
        expire(&h, &id).await;

        let (refreshed, ()) = tokio::join!(h.lifecycle.authenticate(&id), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            h.lifecycle.logout(&id).await.expect("logout");
        });

        assert_eq!(refreshed.unwrap_err().code(), ErrorCode::Unauthenticated);
        assert_eq!(h.provider.refresh_calls(), 1);
        assert!(stored(&h, &id).await.is_none());
        let err = h.lifecycle.authenticate(&id).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Unauthenticated);
    }

    #[tokio::test]
    async fn rejected_refresh_ends_session() {
        let h = harness(FakeProvider::new(alice_token()).with_refresh_failure(
            ProviderError::Rejected {
                reason: "invalid_grant".to_string(),
            },
        ));
        let id = logged_in(&h).await;
        expire(&h, &id).await;

        let err = h.lifecycle.authenticate(&id).await.unwrap_err();

        assert_eq!(err.code(), ErrorCode::Unauthenticated);
        assert_eq!(h.provider.refresh_calls(), 1);
        assert!(stored(&h, &id).await.is_none());
    }

    #[tokio::test]
    async fn provider_outage_keeps_session() {
        let outage = || ProviderError::Unavailable {
            reason: "connection refused".to_string(),
        };
        let h = harness(
            FakeProvider::new(alice_token())
                .with_refresh_failure(outage())
                .with_refresh_failure(outage()),
        );
        let id = logged_in(&h).await;
        expire(&h, &id).await;

        let err = h.lifecycle.authenticate(&id).await.unwrap_err();

        assert_eq!(err.code(), ErrorCode::ProviderUnavailable);
        assert_eq!(h.provider.refresh_calls(), 2);
        let session = stored(&h, &id).await.expect("session kept");
        assert_eq!(session.refresh_token(), Some("refresh-1"));

        // The provider is back.
        h.lifecycle.authenticate(&id).await.expect("authenticate");
        assert_eq!(h.provider.refresh_calls(), 3);
    }

    #[tokio::test]
    async fn transient_refresh_failure_is_retried() {
        let h = harness(FakeProvider::new(alice_token()).with_refresh_failure(
            ProviderError::Unavailable {
                reason: "reset".to_string(),
            },
        ));
        let id = logged_in(&h).await;
        expire(&h, &id).await;

        h.lifecycle.authenticate(&id).await.expect("authenticate");
        assert_eq!(h.provider.refresh_calls(), 2);
    }

    #[tokio::test]
    async fn expired_without_refresh_token_ends_session() {
        let h = harness(FakeProvider::new(alice_token()).with_refresh_token(None));
        let id = logged_in(&h).await;
        expire(&h, &id).await;

        let err = h.lifecycle.authenticate(&id).await.unwrap_err();

        assert_eq!(err.code(), ErrorCode::Unauthenticated);
        assert_eq!(h.provider.refresh_calls(), 0);
        assert!(stored(&h, &id).await.is_none());
    }

    #[tokio::test]
    async fn corrupt_session_is_cleared() {
        let h = harness(FakeProvider::new(alice_token()));
        let id = SessionId::new();
        h.store
            .set(&id, json!({"access_token": ["not", "a", "string"]}))
            .await
            .expect("set");

        let err = h.lifecycle.authenticate(&id).await.unwrap_err();

        assert_eq!(err.code(), ErrorCode::SessionCorrupt);
        assert!(stored(&h, &id).await.is_none());
    }

    #[tokio::test]
    async fn logout_is_idempotent() {
        let h = harness(FakeProvider::new(alice_token()));
        let id = logged_in(&h).await;

        h.lifecycle.logout(&id).await.expect("first logout");
        h.lifecycle.logout(&id).await.expect("second logout");

        let err = h.lifecycle.authenticate(&id).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Unauthenticated);
    }

    #[tokio::test]
    async fn missing_expires_in_uses_default_lifetime() {
        let h = harness(FakeProvider::new(alice_token()).with_expires_in(None));
        let before = Utc::now();
        let id = logged_in(&h).await;

        let expiry = stored(&h, &id).await.expect("session").expiry().expect("expiry");
        let lifetime = expiry - before;
        assert!(lifetime >= chrono::Duration::seconds(DEFAULT_TOKEN_LIFETIME_SECONDS - 1));
        assert!(lifetime <= chrono::Duration::seconds(DEFAULT_TOKEN_LIFETIME_SECONDS + 1));
    }
}
