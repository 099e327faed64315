use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use thiserror::Error;

use sliceline_core::domain::session::{State, UserId};
use sliceline_core::errors::PortError;
use sliceline_core::ports::SessionStore;

use crate::DbPool;

#[derive(Debug, Error)]
pub enum SessionStoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("stored state `{value}` for user {user_id} is not a known state")]
    CorruptState { user_id: i64, value: String },
}

impl From<SessionStoreError> for PortError {
    fn from(error: SessionStoreError) -> Self {
        PortError::transient("sessions", error.to_string())
    }
}

/// Session store over the sqlite pool. State rows and key-value rows are
/// upserts keyed by user; values may carry an `expires_at` past which a
/// read turns into a miss. Nothing is ever deleted.
pub struct SqlSessionStore {
    pool: DbPool,
}

impl SqlSessionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn read_state(&self, user: UserId) -> Result<Option<State>, SessionStoreError> {
        let row = sqlx::query("SELECT state FROM session_state WHERE user_id = ?")
            .bind(user.0)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else { return Ok(None) };
        let value: String = row.try_get("state")?;
        match State::parse(&value) {
            Some(state) => Ok(Some(state)),
            None => Err(SessionStoreError::CorruptState { user_id: user.0, value }),
        }
    }

    async fn write_state(&self, user: UserId, state: State) -> Result<(), SessionStoreError> {
        sqlx::query(
            "INSERT INTO session_state (user_id, state, updated_at)
             VALUES (?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
                 state = excluded.state,
                 updated_at = excluded.updated_at",
        )
        .bind(user.0)
        .bind(state.as_str())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn write_value(
        &self,
        user: UserId,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), SessionStoreError> {
        let expires_at = ttl
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .map(|ttl| (Utc::now() + ttl).to_rfc3339());

        sqlx::query(
            "INSERT INTO session_value (user_id, key, value, expires_at, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(user_id, key) DO UPDATE SET
                 value = excluded.value,
                 expires_at = excluded.expires_at,
                 updated_at = excluded.updated_at",
        )
        .bind(user.0)
        .bind(key)
        .bind(value)
        .bind(expires_at)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn read_value(
        &self,
        user: UserId,
        key: &str,
    ) -> Result<Option<String>, SessionStoreError> {
        let row = sqlx::query(
            "SELECT value, expires_at FROM session_value WHERE user_id = ? AND key = ?",
        )
        .bind(user.0)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };
        let expires_at: Option<String> = row.try_get("expires_at")?;
        if let Some(expires_at) = expires_at {
            let expired = DateTime::parse_from_rfc3339(&expires_at)
                .map(|at| at.with_timezone(&Utc) <= Utc::now())
                .unwrap_or(true);
            if expired {
                return Ok(None);
            }
        }
        Ok(Some(row.try_get("value")?))
    }
}

#[async_trait]
impl SessionStore for SqlSessionStore {
    async fn state(&self, user: UserId) -> Result<Option<State>, PortError> {
        Ok(self.read_state(user).await?)
    }

    async fn set_state(&self, user: UserId, state: State) -> Result<(), PortError> {
        Ok(self.write_state(user, state).await?)
    }

    async fn put_value(
        &self,
        user: UserId,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), PortError> {
        Ok(self.write_value(user, key, value, ttl).await?)
    }

    async fn value(&self, user: UserId, key: &str) -> Result<Option<String>, PortError> {
        Ok(self.read_value(user, key).await?)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use sliceline_core::domain::session::{State, UserId};
    use sliceline_core::ports::SessionStore;

    use super::SqlSessionStore;
    use crate::{connect, migrations};

    const USER: UserId = UserId(42);

    async fn store() -> SqlSessionStore {
        let pool = connect("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");
        SqlSessionStore::new(pool)
    }

    #[tokio::test]
    async fn unknown_user_has_no_stored_state() {
        let store = store().await;
        assert_eq!(store.state(USER).await.expect("read"), None);
    }

    #[tokio::test]
    async fn state_round_trips_and_upserts() {
        let store = store().await;

        store.set_state(USER, State::Menu).await.expect("write");
        assert_eq!(store.state(USER).await.expect("read"), Some(State::Menu));

        store.set_state(USER, State::PaymentChoice).await.expect("overwrite");
        assert_eq!(store.state(USER).await.expect("read"), Some(State::PaymentChoice));

        // Other users are untouched.
        assert_eq!(store.state(UserId(7)).await.expect("read"), None);
    }

    #[tokio::test]
    async fn values_round_trip_per_user_and_key() {
        let store = store().await;

        store.put_value(USER, "menu.page", "2", None).await.expect("write");
        store.put_value(USER, "menu.selected_product", "p-1", None).await.expect("write");
        store.put_value(UserId(7), "menu.page", "0", None).await.expect("write");

        assert_eq!(store.value(USER, "menu.page").await.expect("read").as_deref(), Some("2"));
        assert_eq!(
            store.value(USER, "menu.selected_product").await.expect("read").as_deref(),
            Some("p-1")
        );
        assert_eq!(store.value(UserId(7), "menu.page").await.expect("read").as_deref(), Some("0"));
        assert_eq!(store.value(USER, "missing").await.expect("read"), None);
    }

    #[tokio::test]
    async fn expired_values_read_as_misses() {
        let store = store().await;

        store
            .put_value(USER, "auth.token", "abc", Some(Duration::ZERO))
            .await
            .expect("write expiring value");
        assert_eq!(store.value(USER, "auth.token").await.expect("read"), None);

        store
            .put_value(USER, "auth.token", "def", Some(Duration::from_secs(3600)))
            .await
            .expect("write fresh value");
        assert_eq!(store.value(USER, "auth.token").await.expect("read").as_deref(), Some("def"));
    }

    #[tokio::test]
    async fn rewriting_a_value_without_ttl_clears_the_expiry() {
        let store = store().await;

        store
            .put_value(USER, "order.context", "v1", Some(Duration::ZERO))
            .await
            .expect("write expiring value");
        store.put_value(USER, "order.context", "v2", None).await.expect("rewrite");

        assert_eq!(store.value(USER, "order.context").await.expect("read").as_deref(), Some("v2"));
    }
}
