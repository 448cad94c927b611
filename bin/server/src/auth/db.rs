//! Postgres-backed session store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clerk_core::SessionId;
use clerk_platform_access::{SessionStore, SessionStoreError, StoreResult};
use sqlx::{FromRow, PgPool};

/// Row type for session queries.
#[derive(FromRow)]
struct SessionRow {
    data: serde_json::Value,
}

/// Session store keeping one JSONB document per session.
#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    /// Creates a new session store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn backend(e: sqlx::Error) -> SessionStoreError {
    SessionStoreError::Backend {
        details: e.to_string(),
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn get(&self, id: &SessionId) -> StoreResult<Option<serde_json::Value>> {
        let row: Option<SessionRow> = sqlx::query_as(
            r#"
            SELECT data
            FROM sessions
            WHERE id = $1
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        Ok(row.map(|r| r.data))
    }

    async fn set(&self, id: &SessionId, value: serde_json::Value) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (id, data, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (id) DO UPDATE
            SET data = EXCLUDED.data, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(id.to_string())
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }

    async fn update(&self, id: &SessionId, value: serde_json::Value) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET data = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id.to_string())
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(result.rows_affected() > 0)
    }

    async fn clear(&self, id: &SessionId) -> StoreResult<()> {
        sqlx::query(
            r#"
            DELETE FROM sessions
            WHERE id = $1
            "#,
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }

    async fn purge_idle(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM sessions
            WHERE updated_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(result.rows_affected())
    }
}
