//! The replay-safe pub/sub adapter.
//!
//! [`Transport`] sits between a client and its relay connection. Outbound it
//! stamps envelopes with the endpoint's client id and a fresh persistent
//! nonce; inbound it applies the [`ReplayGuard`] so that loopback echoes and
//! already-seen history never reach the client. A supervisor task
//! re-establishes the relay link with bounded backoff when it drops, then
//! re-subscribes every channel; the guard makes the resulting history replay
//! invisible.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use uuid::Uuid;

use crate::core::{retry, Backoff, EncryptedEnvelope, TransportError};
use crate::core::{CLIENT_ID_KEY, CONNECT_MAX_ATTEMPTS};
use crate::store::KeyValueStore;
use crate::transport::{InboundVerdict, NonceAllocator, Relay, RelayEvent, ReplayGuard};

/// An envelope delivered from a subscribed channel, post replay guard.
#[derive(Debug, Clone)]
pub struct Inbound {
    /// Channel the envelope arrived on.
    pub channel: String,
    /// The stamped envelope.
    pub envelope: EncryptedEnvelope,
}

struct TransportInner {
    relay: Arc<dyn Relay>,
    client_id: String,
    allocator: NonceAllocator,
    guard: ReplayGuard,
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    subs: Mutex<HashMap<String, JoinHandle<()>>>,
    /// Whether the application wants the link up. A relay drop does not
    /// clear this; `disconnect()` does.
    desired_up: AtomicBool,
}

impl TransportInner {
    fn subs_lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, JoinHandle<()>>> {
        self.subs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribe the relay channel and pump its stream through the replay
    /// guard into the client's inbound queue.
    async fn subscribe_channel(this: &Arc<Self>, channel: &str) -> Result<(), TransportError> {
        let mut rx = this.relay.subscribe(channel).await?;
        let inner = Arc::clone(this);
        let name = channel.to_owned();
        let pump = tokio::spawn(async move {
            while let Some(raw) = rx.recv().await {
                let envelope: EncryptedEnvelope = match serde_json::from_str(&raw) {
                    Ok(envelope) => envelope,
                    Err(err) => {
                        warn!(channel = %name, %err, "dropping unparseable relay payload");
                        continue;
                    }
                };
                match inner
                    .guard
                    .check(&name, &envelope.from, envelope.nonce)
                    .await
                {
                    Ok(InboundVerdict::Accept) => {
                        let inbound = Inbound {
                            channel: name.clone(),
                            envelope,
                        };
                        if inner.inbound_tx.send(inbound).is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!(channel = %name, %err, "replay guard failed; dropping envelope");
                    }
                }
            }
        });
        if let Some(previous) = this.subs_lock().insert(channel.to_owned(), pump) {
            previous.abort();
        }
        Ok(())
    }

    /// Names of all currently subscribed channels.
    fn channels(&self) -> Vec<String> {
        self.subs_lock().keys().cloned().collect()
    }
}

/// Pub/sub adapter with replay protection and transparent reconnection.
pub struct Transport {
    inner: Arc<TransportInner>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl Transport {
    /// Build a transport over a relay and this client's key-value store.
    ///
    /// Resolves (or mints) the endpoint's stable client id. Returns the
    /// transport and the stream of guarded inbound envelopes.
    pub async fn new(
        relay: Arc<dyn Relay>,
        kv: Arc<dyn KeyValueStore>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<Inbound>), TransportError> {
        let client_id = match kv.get(CLIENT_ID_KEY).await? {
            Some(id) => id,
            None => {
                let id = Uuid::new_v4().to_string();
                kv.set(CLIENT_ID_KEY, &id).await?;
                id
            }
        };

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(TransportInner {
            relay,
            allocator: NonceAllocator::new(kv.clone(), client_id.clone()),
            guard: ReplayGuard::new(kv, client_id.clone()),
            client_id,
            inbound_tx,
            subs: Mutex::new(HashMap::new()),
            desired_up: AtomicBool::new(false),
        });
        let transport = Self {
            inner,
            supervisor: Mutex::new(None),
        };
        Ok((transport, inbound_rx))
    }

    /// This endpoint's stable client id.
    pub fn client_id(&self) -> &str {
        &self.inner.client_id
    }

    /// Establish the relay connection. Idempotent.
    ///
    /// Retries with backoff up to the connect budget, then surfaces a
    /// transport error.
    pub async fn connect(&self) -> Result<(), TransportError> {
        if self.inner.desired_up.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let relay = Arc::clone(&self.inner.relay);
        if let Err(err) = retry(CONNECT_MAX_ATTEMPTS, || relay.connect()).await {
            self.inner.desired_up.store(false, Ordering::SeqCst);
            return Err(TransportError::ConnectionFailed(err.to_string()));
        }
        self.spawn_supervisor();
        Ok(())
    }

    /// Watch for relay drops and bring the link and its subscriptions back.
    fn spawn_supervisor(&self) {
        let mut guard = self
            .supervisor
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if guard.is_some() {
            return;
        }
        let inner = Arc::clone(&self.inner);
        *guard = Some(tokio::spawn(async move {
            let mut events = inner.relay.events();
            loop {
                match events.recv().await {
                    Ok(RelayEvent::Disconnected) => {
                        if !inner.desired_up.load(Ordering::SeqCst) {
                            continue;
                        }
                        let mut backoff = Backoff::default();
                        while inner.desired_up.load(Ordering::SeqCst) {
                            tokio::time::sleep(backoff.next_delay()).await;
                            match inner.relay.connect().await {
                                Ok(()) => break,
                                Err(err) => {
                                    debug!(%err, "relay reconnect attempt failed");
                                }
                            }
                        }
                        if !inner.desired_up.load(Ordering::SeqCst) {
                            continue;
                        }
                        for channel in inner.channels() {
                            if let Err(err) =
                                TransportInner::subscribe_channel(&inner, &channel).await
                            {
                                warn!(%channel, %err, "failed to re-subscribe after reconnect");
                            }
                        }
                        debug!("relay connection restored");
                    }
                    Ok(RelayEvent::Connected) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        }));
    }

    /// Subscribe a channel.
    ///
    /// The relay replays the channel's history first; the replay guard keeps
    /// already-delivered messages from re-surfacing.
    pub async fn subscribe(&self, channel: &str) -> Result<(), TransportError> {
        if !self.inner.desired_up.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        TransportInner::subscribe_channel(&self.inner, channel).await
    }

    /// Stamp and publish a ciphertext on a channel.
    ///
    /// The envelope carries this endpoint's client id and a fresh nonce that
    /// was persisted before the publish.
    pub async fn publish(&self, channel: &str, ciphertext: String) -> Result<(), TransportError> {
        if !self.inner.desired_up.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        let nonce = self.inner.allocator.allocate(channel).await?;
        let envelope = EncryptedEnvelope {
            from: self.inner.client_id.clone(),
            to: None,
            nonce,
            ciphertext,
        };
        let payload =
            serde_json::to_string(&envelope).map_err(|err| TransportError::Relay(err.to_string()))?;
        self.inner.relay.publish(channel, payload).await
    }

    /// Unsubscribe a channel and wipe its replay state.
    ///
    /// Used once a handshake channel is retired. The relay unsubscribe is
    /// best-effort; guard state removal is not.
    pub async fn clear(&self, channel: &str) -> Result<(), TransportError> {
        if let Some(pump) = self.inner.subs_lock().remove(channel) {
            pump.abort();
        }
        if let Err(err) = self.inner.relay.unsubscribe(channel).await {
            debug!(%channel, %err, "relay unsubscribe failed during clear");
        }
        self.inner.guard.clear(channel).await
    }

    /// Tear down the relay connection.
    ///
    /// Subscriptions end; persisted counters and replay state survive for
    /// `resume()`.
    pub async fn disconnect(&self) -> Result<(), TransportError> {
        self.inner.desired_up.store(false, Ordering::SeqCst);
        if let Some(supervisor) = self
            .supervisor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            supervisor.abort();
        }
        for (_, pump) in self.inner.subs_lock().drain() {
            pump.abort();
        }
        self.inner.relay.disconnect().await
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.supervisor.lock() {
            if let Some(supervisor) = guard.take() {
                supervisor.abort();
            }
        }
        if let Ok(mut subs) = self.inner.subs.lock() {
            for (_, pump) in subs.drain() {
                pump.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::transport::MemoryRelayHub;

    async fn transport(
        hub: &MemoryRelayHub,
    ) -> (Transport, mpsc::UnboundedReceiver<Inbound>, Arc<MemoryStore>) {
        let kv = Arc::new(MemoryStore::new());
        let (transport, rx) = Transport::new(Arc::new(hub.endpoint()), kv.clone())
            .await
            .unwrap();
        (transport, rx, kv)
    }

    #[tokio::test]
    async fn test_client_id_is_stable_per_store() {
        let hub = MemoryRelayHub::new();
        let kv = Arc::new(MemoryStore::new());
        let (a, _rx_a) = Transport::new(Arc::new(hub.endpoint()), kv.clone())
            .await
            .unwrap();
        let id = a.client_id().to_owned();
        drop(a);
        let (b, _rx_b) = Transport::new(Arc::new(hub.endpoint()), kv).await.unwrap();
        assert_eq!(b.client_id(), id);
    }

    #[tokio::test]
    async fn test_publish_stamps_from_and_monotonic_nonce() {
        let hub = MemoryRelayHub::new();
        let (sender, _rx, _) = transport(&hub).await;
        let (receiver, mut rx, _) = transport(&hub).await;

        sender.connect().await.unwrap();
        receiver.connect().await.unwrap();
        receiver.subscribe("c").await.unwrap();

        sender.publish("c", "ct-1".into()).await.unwrap();
        sender.publish("c", "ct-2".into()).await.unwrap();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.envelope.from, sender.client_id());
        assert_eq!(first.envelope.nonce, 1);
        assert_eq!(second.envelope.nonce, 2);
        assert_eq!(first.envelope.ciphertext, "ct-1");
    }

    #[tokio::test]
    async fn test_loopback_is_filtered() {
        let hub = MemoryRelayHub::new();
        let (peer, mut peer_rx, _) = transport(&hub).await;
        let (me, mut my_rx, _) = transport(&hub).await;

        me.connect().await.unwrap();
        peer.connect().await.unwrap();
        me.subscribe("c").await.unwrap();
        peer.subscribe("c").await.unwrap();

        me.publish("c", "mine".into()).await.unwrap();
        assert_eq!(peer_rx.recv().await.unwrap().envelope.ciphertext, "mine");
        // Our own echo never surfaces.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(my_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_resume_does_not_redeliver_consumed_history() {
        let hub = MemoryRelayHub::new();
        let (sender, _srx, _) = transport(&hub).await;
        let kv = Arc::new(MemoryStore::new());

        sender.connect().await.unwrap();
        {
            let (receiver, mut rx) = Transport::new(Arc::new(hub.endpoint()), kv.clone())
                .await
                .unwrap();
            receiver.connect().await.unwrap();
            receiver.subscribe("c").await.unwrap();
            sender.publish("c", "seen".into()).await.unwrap();
            assert_eq!(rx.recv().await.unwrap().envelope.ciphertext, "seen");
            receiver.disconnect().await.unwrap();
        }

        // Sent while the receiver was away.
        sender.publish("c", "missed".into()).await.unwrap();

        let (restarted, mut rx) = Transport::new(Arc::new(hub.endpoint()), kv).await.unwrap();
        restarted.connect().await.unwrap();
        restarted.subscribe("c").await.unwrap();
        // History replays both, the guard admits only the unseen one.
        assert_eq!(rx.recv().await.unwrap().envelope.ciphertext, "missed");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_clear_wipes_replay_state_and_subscription() {
        let hub = MemoryRelayHub::new();
        let (sender, _srx, _) = transport(&hub).await;
        let (receiver, mut rx, _) = transport(&hub).await;

        sender.connect().await.unwrap();
        receiver.connect().await.unwrap();
        receiver.subscribe("c").await.unwrap();
        sender.publish("c", "before".into()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().envelope.ciphertext, "before");

        receiver.clear("c").await.unwrap();
        // Re-subscribing replays history as if never seen.
        receiver.subscribe("c").await.unwrap();
        assert_eq!(rx.recv().await.unwrap().envelope.ciphertext, "before");
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_restores_subscriptions() {
        let hub = MemoryRelayHub::new();
        let relay = Arc::new(hub.endpoint());
        let kv = Arc::new(MemoryStore::new());
        let (receiver, mut rx) = Transport::new(relay.clone(), kv).await.unwrap();
        let (sender, _srx, _) = transport(&hub).await;

        sender.connect().await.unwrap();
        receiver.connect().await.unwrap();
        receiver.subscribe("c").await.unwrap();

        relay.drop_connection().await;
        // Supervisor backs off, reconnects, re-subscribes.
        tokio::time::sleep(std::time::Duration::from_secs(2)).await;

        sender.publish("c", "after-drop".into()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().envelope.ciphertext, "after-drop");
    }

    #[tokio::test]
    async fn test_publish_requires_connect() {
        let hub = MemoryRelayHub::new();
        let (transport, _rx, _) = transport(&hub).await;
        assert!(matches!(
            transport.publish("c", "x".into()).await,
            Err(TransportError::NotConnected)
        ));
    }
}
