//! Session persistence.
//!
//! Values are opaque JSON to the store; decoding into a
//! [`Session`](crate::Session) happens in the token lifecycle so that a
//! malformed value surfaces as a typed error instead of a backend failure.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clerk_core::SessionId;
use std::collections::HashMap;
use std::sync::PoisonError;

use crate::error::SessionStoreError;

/// Result type for session store operations.
pub type StoreResult<T> = clerk_core::Result<T, SessionStoreError>;

/// Keyed persistence for session values.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Loads the value stored for `id`, if any.
    async fn get(&self, id: &SessionId) -> StoreResult<Option<serde_json::Value>>;

    /// Stores `value` for `id`, replacing any previous value.
    async fn set(&self, id: &SessionId, value: serde_json::Value) -> StoreResult<()>;

    /// Replaces the value stored for `id` only if one exists; returns
    /// whether it did. A cleared session is never recreated.
    async fn update(&self, id: &SessionId, value: serde_json::Value) -> StoreResult<bool>;

    /// Removes the value stored for `id`. Removing a missing session succeeds.
    async fn clear(&self, id: &SessionId) -> StoreResult<()>;

    /// Removes sessions last written before `cutoff`; returns how many.
    async fn purge_idle(&self, cutoff: DateTime<Utc>) -> StoreResult<u64>;
}

#[derive(Debug, Clone)]
struct Entry {
    value: serde_json::Value,
    updated_at: DateTime<Utc>,
}

/// In-process session store for single-instance deployments and tests.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    entries: std::sync::Mutex<HashMap<SessionId, Entry>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, id: &SessionId) -> StoreResult<Option<serde_json::Value>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(id).map(|e| e.value.clone()))
    }

    async fn set(&self, id: &SessionId, value: serde_json::Value) -> StoreResult<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(
            *id,
            Entry {
                value,
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn update(&self, id: &SessionId, value: serde_json::Value) -> StoreResult<bool> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(entry) = entries.get_mut(id) else {
            return Ok(false);
        };
        entry.value = value;
        entry.updated_at = Utc::now();
        Ok(true)
    }

    async fn clear(&self, id: &SessionId) -> StoreResult<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(id);
        Ok(())
    }

    async fn purge_idle(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, e| e.updated_at >= cutoff);
        Ok((before - entries.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn set_get_clear() {
        let store = MemorySessionStore::new();
        let id = SessionId::new();

        assert!(store.get(&id).await.expect("get").is_none());

        store.set(&id, json!({"state": "s1"})).await.expect("set");
        assert_eq!(
            store.get(&id).await.expect("get"),
            Some(json!({"state": "s1"}))
        );

        store.clear(&id).await.expect("clear");
        assert!(store.get(&id).await.expect("get").is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn update_never_recreates_a_session() {
        let store = MemorySessionStore::new();
        let id = SessionId::new();

        assert!(!store.update(&id, json!({"a": 1})).await.expect("update"));
        assert!(store.get(&id).await.expect("get").is_none());

        store.set(&id, json!({"a": 1})).await.expect("set");
        assert!(store.update(&id, json!({"a": 2})).await.expect("update"));
        assert_eq!(store.get(&id).await.expect("get"), Some(json!({"a": 2})));

        store.clear(&id).await.expect("clear");
        assert!(!store.update(&id, json!({"a": 3})).await.expect("update"));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn clear_missing_session_is_ok() {
        let store = MemorySessionStore::new();
        store.clear(&SessionId::new()).await.expect("clear");
    }

    #[tokio::test]
    async fn purge_idle_removes_only_stale_entries() {
        let store = MemorySessionStore::new();
        let stale = SessionId::new();
        store.set(&stale, json!({})).await.expect("set");

        let cutoff = Utc::now() + chrono::Duration::milliseconds(1);
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let fresh = SessionId::new();
        store.set(&fresh, json!({})).await.expect("set");

        assert_eq!(store.purge_idle(cutoff).await.expect("purge"), 1);
        assert!(store.get(&stale).await.expect("get").is_none());
        assert!(store.get(&fresh).await.expect("get").is_some());
    }
}
