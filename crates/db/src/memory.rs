use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use sliceline_core::domain::session::{State, UserId};
use sliceline_core::errors::PortError;
use sliceline_core::ports::SessionStore;

struct StoredValue {
    value: String,
    expires_at: Option<Instant>,
}

/// In-memory session store with the same observable behavior as the sql
/// one, including TTL misses. For tests and local wiring only.
#[derive(Default)]
pub struct InMemorySessionStore {
    states: RwLock<HashMap<i64, State>>,
    values: RwLock<HashMap<(i64, String), StoredValue>>,
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn state(&self, user: UserId) -> Result<Option<State>, PortError> {
        Ok(self.states.read().await.get(&user.0).copied())
    }

    async fn set_state(&self, user: UserId, state: State) -> Result<(), PortError> {
        self.states.write().await.insert(user.0, state);
        Ok(())
    }

    async fn put_value(
        &self,
        user: UserId,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), PortError> {
        let stored = StoredValue {
            value: value.to_owned(),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.values.write().await.insert((user.0, key.to_owned()), stored);
        Ok(())
    }

    async fn value(&self, user: UserId, key: &str) -> Result<Option<String>, PortError> {
        let values = self.values.read().await;
        let stored = values.get(&(user.0, key.to_owned()));
        Ok(stored
            .filter(|stored| stored.expires_at.map_or(true, |at| at > Instant::now()))
            .map(|stored| stored.value.clone()))
    }
}
