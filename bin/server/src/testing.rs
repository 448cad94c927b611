//! Shared fixtures for router and schema tests.

use clerk_authz::{AuthorizationGate, AuthzConfig};
use clerk_core::SessionId;
use clerk_platform_access::testing::{FakeProvider, access_token};
use clerk_platform_access::{
    ClaimExtractor, MemorySessionStore, RetryPolicy, SessionStore, TokenLifecycle,
};
use serde_json::{Value, json};
use std::sync::Arc;

use crate::auth::AppState;
use crate::config::SessionConfig;
use crate::handler::tests::handler;

pub(crate) struct TestApp {
    pub state: Arc<AppState>,
    pub provider: Arc<FakeProvider>,
    pub store: Arc<MemorySessionStore>,
}

/// A user with full rights on `t1` and read access to `t2`.
pub(crate) fn editor_token() -> String {
    access_token(
        "erin",
        &["dlza-user"],
        json!([
            {"id": "t1", "create": true, "read": true, "update": true, "delete": true},
            "t2",
        ]),
    )
}

pub(crate) fn admin_token() -> String {
    access_token("ada", &["dlza-admin"], json!([]))
}

pub(crate) fn unscoped_token() -> String {
    access_token("nobody", &["dlza-user"], json!([]))
}

pub(crate) fn test_app(provider: FakeProvider) -> TestApp {
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

    let state = Arc::new(AppState::new(
        lifecycle,
        AuthorizationGate::new(AuthzConfig::default()),
        Arc::new(handler()),
        SessionConfig::default(),
    ));

    TestApp {
        state,
        provider,
        store,
    }
}

/// Runs a full login and returns the session id it ends up under.
pub(crate) async fn logged_in(app: &TestApp) -> SessionId {
    let id = SessionId::new();
    app.state
        .lifecycle
        .begin_login(&id, None)
        .await
        .expect("begin login");
    app.state
        .lifecycle
        .complete_login(&id, "code", "state-1")
        .await
        .expect("complete login")
        .session_id
}

/// Moves the session's token expiry into the past.
pub(crate) async fn expire(app: &TestApp, id: &SessionId) {
    let mut value: Value = app.store.get(id).await.expect("get").expect("session");
    value["expiry_token"] = json!("2000-01-01T00:00:00Z");
    app.store.set(id, value).await.expect("set");
}

pub(crate) fn cookie(id: &SessionId) -> String {
    format!("clerk_session={id}")
}
