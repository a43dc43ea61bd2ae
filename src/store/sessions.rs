//! Typed session persistence over the key-value store.
//!
//! Records live under `session:<id>`; an index key holds the JSON array of
//! ids so `list()` needs no prefix scan. Expired sessions are evicted on the
//! next touch.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::core::{Session, StoreError, SESSION_INDEX_KEY, SESSION_KEY_PREFIX};
use crate::store::KeyValueStore;

/// Durable set of [`Session`] records keyed by session id.
///
/// Writers serialize per id; last write wins.
#[derive(Clone)]
pub struct SessionStore {
    kv: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    /// Create a store over the given KV backend.
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    fn record_key(id: &Uuid) -> String {
        format!("{SESSION_KEY_PREFIX}{id}")
    }

    /// Persist a session, overwriting any previous record with the same id.
    pub async fn set(&self, session: &Session) -> Result<(), StoreError> {
        let key = Self::record_key(&session.id);
        let json = serde_json::to_string(session).map_err(|err| StoreError::CorruptRecord {
            key: key.clone(),
            reason: err.to_string(),
        })?;
        self.kv.set(&key, &json).await?;

        let mut index = self.read_index().await?;
        if !index.contains(&session.id) {
            index.push(session.id);
            self.write_index(&index).await?;
        }
        Ok(())
    }

    /// Load a session; expired or absent ids yield `None`.
    ///
    /// An expired record is deleted before returning.
    pub async fn get(&self, id: &Uuid) -> Result<Option<Session>, StoreError> {
        let key = Self::record_key(id);
        let Some(json) = self.kv.get(&key).await? else {
            return Ok(None);
        };
        let session: Session =
            serde_json::from_str(&json).map_err(|err| StoreError::CorruptRecord {
                key: key.clone(),
                reason: err.to_string(),
            })?;
        if session.is_expired() {
            debug!(session = %id, "evicting expired session");
            self.delete(id).await?;
            return Ok(None);
        }
        Ok(Some(session))
    }

    /// Enumerate all non-expired sessions.
    pub async fn list(&self) -> Result<Vec<Session>, StoreError> {
        let index = self.read_index().await?;
        let mut sessions = Vec::with_capacity(index.len());
        for id in index {
            if let Some(session) = self.get(&id).await? {
                sessions.push(session);
            }
        }
        Ok(sessions)
    }

    /// Remove a session record.
    pub async fn delete(&self, id: &Uuid) -> Result<(), StoreError> {
        self.kv.delete(&Self::record_key(id)).await?;
        let mut index = self.read_index().await?;
        if let Some(pos) = index.iter().position(|entry| entry == id) {
            index.remove(pos);
            self.write_index(&index).await?;
        }
        Ok(())
    }

    async fn read_index(&self) -> Result<Vec<Uuid>, StoreError> {
        match self.kv.get(SESSION_INDEX_KEY).await? {
            Some(json) => {
                serde_json::from_str(&json).map_err(|err| StoreError::CorruptRecord {
                    key: SESSION_INDEX_KEY.to_owned(),
                    reason: err.to_string(),
                })
            }
            None => Ok(Vec::new()),
        }
    }

    async fn write_index(&self, index: &[Uuid]) -> Result<(), StoreError> {
        let json = serde_json::to_string(index).map_err(|err| StoreError::CorruptRecord {
            key: SESSION_INDEX_KEY.to_owned(),
            reason: err.to_string(),
        })?;
        self.kv.set(SESSION_INDEX_KEY, &json).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{session_channel, SESSION_TTL};
    use crate::core::{deadline_ms, now_ms};
    use crate::crypto::KeyPair;
    use crate::store::MemoryStore;

    fn sample_session() -> Session {
        Session {
            id: Uuid::new_v4(),
            channel: session_channel(&Uuid::new_v4().to_string()),
            key_pair: KeyPair::generate(),
            their_public_key: *KeyPair::generate().public_key(),
            expires_at: deadline_ms(SESSION_TTL),
        }
    }

    fn store() -> SessionStore {
        SessionStore::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let sessions = store();
        let session = sample_session();

        sessions.set(&session).await.unwrap();
        let loaded = sessions.get(&session.id).await.unwrap().unwrap();
        assert_eq!(loaded, session);

        sessions.delete(&session.id).await.unwrap();
        assert!(sessions.get(&session.id).await.unwrap().is_none());
        assert!(sessions.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_absent_is_none() {
        assert!(store().get(&Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_session_is_evicted_on_get() {
        let sessions = store();
        let mut session = sample_session();
        session.expires_at = now_ms().saturating_sub(1_000);

        sessions.set(&session).await.unwrap();
        assert!(sessions.get(&session.id).await.unwrap().is_none());
        // The record itself is gone, not just filtered.
        assert!(sessions.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_returns_all_live_sessions() {
        let sessions = store();
        let a = sample_session();
        let b = sample_session();
        sessions.set(&a).await.unwrap();
        sessions.set(&b).await.unwrap();

        let mut ids: Vec<Uuid> = sessions
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        ids.sort();
        let mut expected = vec![a.id, b.id];
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn test_set_overwrites_last_write_wins() {
        let sessions = store();
        let mut session = sample_session();
        sessions.set(&session).await.unwrap();

        session.expires_at += 1;
        sessions.set(&session).await.unwrap();

        let loaded = sessions.get(&session.id).await.unwrap().unwrap();
        assert_eq!(loaded.expires_at, session.expires_at);
        assert_eq!(sessions.list().await.unwrap().len(), 1);
    }
}
