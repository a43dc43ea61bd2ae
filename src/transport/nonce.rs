//! Replay defense: outbound nonce allocation and the inbound replay guard.
//!
//! Both sides of the defense persist through the client's key-value store so
//! that a restart neither reuses an outbound nonce nor re-delivers history
//! the application already consumed.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::core::{StoreError, TransportError, LATEST_NONCES_KEY_PREFIX, NONCE_KEY_PREFIX};
use crate::store::KeyValueStore;

/// Outbound nonce counter, monotonic per (client, channel).
///
/// The next value is persisted before a nonce is handed out, so a crashed
/// and restarted sender can burn a nonce but never reuse one.
pub struct NonceAllocator {
    kv: Arc<dyn KeyValueStore>,
    client_id: String,
}

impl NonceAllocator {
    /// Create an allocator for this endpoint.
    pub fn new(kv: Arc<dyn KeyValueStore>, client_id: String) -> Self {
        Self { kv, client_id }
    }

    fn key(&self, channel: &str) -> String {
        format!("{NONCE_KEY_PREFIX}{}:{channel}", self.client_id)
    }

    /// Allocate the next nonce for a channel, starting at 1.
    pub async fn allocate(&self, channel: &str) -> Result<u64, TransportError> {
        let key = self.key(channel);
        let nonce = match self.kv.get(&key).await? {
            Some(raw) => raw.parse::<u64>().map_err(|err| {
                TransportError::Store(StoreError::CorruptRecord {
                    key: key.clone(),
                    reason: err.to_string(),
                })
            })?,
            None => 1,
        };
        // Persist-then-publish: the counter moves forward before the caller
        // may send anything carrying this nonce.
        self.kv.set(&key, &(nonce + 1).to_string()).await?;
        Ok(nonce)
    }
}

/// Outcome of the inbound replay check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundVerdict {
    /// Fresh message; deliver to the application.
    Accept,
    /// Our own publish echoed back by the relay.
    DropLoopback,
    /// Nonce at or below the sender's high-water mark.
    DropReplay,
}

/// Inbound replay guard: per-channel map of the highest nonce seen from each
/// remote sender.
///
/// The guard does not gap-check: the relay may reorder across senders but
/// keeps per-sender order, so a simple high-water mark suffices.
pub struct ReplayGuard {
    kv: Arc<dyn KeyValueStore>,
    client_id: String,
    cache: Mutex<HashMap<String, HashMap<String, u64>>>,
}

impl ReplayGuard {
    /// Create a guard for this endpoint.
    pub fn new(kv: Arc<dyn KeyValueStore>, client_id: String) -> Self {
        Self {
            kv,
            client_id,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn key(&self, channel: &str) -> String {
        format!("{LATEST_NONCES_KEY_PREFIX}{}:{channel}", self.client_id)
    }

    async fn load(&self, channel: &str) -> Result<HashMap<String, u64>, TransportError> {
        let key = self.key(channel);
        match self.kv.get(&key).await? {
            Some(json) => serde_json::from_str(&json).map_err(|err| {
                TransportError::Store(StoreError::CorruptRecord {
                    key: key.clone(),
                    reason: err.to_string(),
                })
            }),
            None => Ok(HashMap::new()),
        }
    }

    /// Judge an inbound envelope and, if fresh, advance and persist the
    /// sender's high-water mark before it is delivered.
    pub async fn check(
        &self,
        channel: &str,
        from: &str,
        nonce: u64,
    ) -> Result<InboundVerdict, TransportError> {
        if from == self.client_id {
            return Ok(InboundVerdict::DropLoopback);
        }

        let mut cache = self.cache.lock().await;
        if !cache.contains_key(channel) {
            let loaded = self.load(channel).await?;
            cache.insert(channel.to_owned(), loaded);
        }
        let latest = cache
            .get(channel)
            .and_then(|seen| seen.get(from).copied())
            .unwrap_or(0);
        if nonce <= latest {
            debug!(channel, from, nonce, latest, "dropping replayed envelope");
            return Ok(InboundVerdict::DropReplay);
        }

        let seen = cache.entry(channel.to_owned()).or_default();
        seen.insert(from.to_owned(), nonce);
        let json = serde_json::to_string(seen).map_err(|err| {
            TransportError::Store(StoreError::CorruptRecord {
                key: self.key(channel),
                reason: err.to_string(),
            })
        })?;
        self.kv.set(&self.key(channel), &json).await?;
        Ok(InboundVerdict::Accept)
    }

    /// Forget a channel's replay state, in memory and on disk.
    pub async fn clear(&self, channel: &str) -> Result<(), TransportError> {
        self.cache.lock().await.remove(channel);
        self.kv.delete(&self.key(channel)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn kv() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::new())
    }

    #[tokio::test]
    async fn test_nonces_start_at_one_and_increase() {
        let allocator = NonceAllocator::new(kv(), "me".into());
        assert_eq!(allocator.allocate("c").await.unwrap(), 1);
        assert_eq!(allocator.allocate("c").await.unwrap(), 2);
        assert_eq!(allocator.allocate("c").await.unwrap(), 3);
        // Independent per channel.
        assert_eq!(allocator.allocate("other").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_nonces_survive_restart() {
        let store = kv();
        let allocator = NonceAllocator::new(store.clone(), "me".into());
        allocator.allocate("c").await.unwrap();
        allocator.allocate("c").await.unwrap();
        drop(allocator);

        let restarted = NonceAllocator::new(store, "me".into());
        assert_eq!(restarted.allocate("c").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_guard_accepts_increasing_drops_stale() {
        let guard = ReplayGuard::new(kv(), "me".into());
        assert_eq!(
            guard.check("c", "peer", 1).await.unwrap(),
            InboundVerdict::Accept
        );
        assert_eq!(
            guard.check("c", "peer", 2).await.unwrap(),
            InboundVerdict::Accept
        );
        assert_eq!(
            guard.check("c", "peer", 2).await.unwrap(),
            InboundVerdict::DropReplay
        );
        assert_eq!(
            guard.check("c", "peer", 1).await.unwrap(),
            InboundVerdict::DropReplay
        );
        // Gaps are fine; ordering is per sender only.
        assert_eq!(
            guard.check("c", "peer", 10).await.unwrap(),
            InboundVerdict::Accept
        );
    }

    #[tokio::test]
    async fn test_guard_tracks_senders_independently() {
        let guard = ReplayGuard::new(kv(), "me".into());
        guard.check("c", "a", 5).await.unwrap();
        assert_eq!(
            guard.check("c", "b", 1).await.unwrap(),
            InboundVerdict::Accept
        );
    }

    #[tokio::test]
    async fn test_guard_drops_loopback() {
        let guard = ReplayGuard::new(kv(), "me".into());
        assert_eq!(
            guard.check("c", "me", 1).await.unwrap(),
            InboundVerdict::DropLoopback
        );
    }

    #[tokio::test]
    async fn test_guard_state_survives_restart() {
        let store = kv();
        let guard = ReplayGuard::new(store.clone(), "me".into());
        guard.check("c", "peer", 7).await.unwrap();
        drop(guard);

        let restarted = ReplayGuard::new(store, "me".into());
        assert_eq!(
            restarted.check("c", "peer", 7).await.unwrap(),
            InboundVerdict::DropReplay
        );
        assert_eq!(
            restarted.check("c", "peer", 8).await.unwrap(),
            InboundVerdict::Accept
        );
    }

    #[tokio::test]
    async fn test_clear_forgets_channel_state() {
        let store = kv();
        let guard = ReplayGuard::new(store, "me".into());
        guard.check("c", "peer", 3).await.unwrap();
        guard.clear("c").await.unwrap();
        assert_eq!(
            guard.check("c", "peer", 1).await.unwrap(),
            InboundVerdict::Accept
        );
    }
}
