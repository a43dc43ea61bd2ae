//! In-memory relay for tests and demos.
//!
//! A [`MemoryRelayHub`] plays the relay server: it keeps per-channel history
//! and fans live messages out to every subscribed endpoint, including the
//! publisher (the transport's loopback filter is expected to drop those).
//! [`MemoryRelay`] endpoints hand one client its own connection, with fault
//! injection to exercise reconnect paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, Mutex};

use crate::core::TransportError;
use crate::transport::{Relay, RelayEvent};

#[derive(Default)]
struct HubState {
    /// Ordered message history per channel.
    history: HashMap<String, Vec<String>>,
    /// Live subscriber senders per channel, tagged with the endpoint id.
    subscribers: HashMap<String, Vec<(u64, mpsc::UnboundedSender<String>)>>,
}

/// The shared bus all [`MemoryRelay`] endpoints of one test talk to.
#[derive(Clone, Default)]
pub struct MemoryRelayHub {
    state: Arc<Mutex<HubState>>,
    next_endpoint: Arc<AtomicU64>,
}

impl MemoryRelayHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new endpoint connected to this hub.
    pub fn endpoint(&self) -> MemoryRelay {
        let (events, _) = broadcast::channel(16);
        MemoryRelay {
            state: self.state.clone(),
            id: self.next_endpoint.fetch_add(1, Ordering::Relaxed),
            connected: Arc::new(AtomicBool::new(false)),
            events,
        }
    }

    /// Number of messages retained for a channel.
    pub async fn history_len(&self, channel: &str) -> usize {
        self.state
            .lock()
            .await
            .history
            .get(channel)
            .map_or(0, Vec::len)
    }
}

/// One endpoint's connection to a [`MemoryRelayHub`].
pub struct MemoryRelay {
    state: Arc<Mutex<HubState>>,
    id: u64,
    connected: Arc<AtomicBool>,
    events: broadcast::Sender<RelayEvent>,
}

impl MemoryRelay {
    fn ensure_connected(&self) -> Result<(), TransportError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TransportError::NotConnected)
        }
    }

    async fn drop_subscriptions(&self) {
        let mut state = self.state.lock().await;
        for senders in state.subscribers.values_mut() {
            senders.retain(|(id, _)| *id != self.id);
        }
    }

    /// Simulate a network fault: the connection drops, subscriptions die and
    /// a `Disconnected` event fires, as a real relay link would.
    pub async fn drop_connection(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.drop_subscriptions().await;
        let _ = self.events.send(RelayEvent::Disconnected);
    }
}

#[async_trait]
impl Relay for MemoryRelay {
    async fn connect(&self) -> Result<(), TransportError> {
        if !self.connected.swap(true, Ordering::SeqCst) {
            let _ = self.events.send(RelayEvent::Connected);
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.drop_subscriptions().await;
            let _ = self.events.send(RelayEvent::Disconnected);
        }
        Ok(())
    }

    async fn publish(&self, channel: &str, payload: String) -> Result<(), TransportError> {
        self.ensure_connected()?;
        let mut state = self.state.lock().await;
        state
            .history
            .entry(channel.to_owned())
            .or_default()
            .push(payload.clone());
        if let Some(senders) = state.subscribers.get_mut(channel) {
            senders.retain(|(_, tx)| tx.send(payload.clone()).is_ok());
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        channel: &str,
    ) -> Result<mpsc::UnboundedReceiver<String>, TransportError> {
        self.ensure_connected()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock().await;
        // History replay and live registration under one lock: no message is
        // missed or duplicated around the subscription point.
        if let Some(history) = state.history.get(channel) {
            for payload in history {
                let _ = tx.send(payload.clone());
            }
        }
        state
            .subscribers
            .entry(channel.to_owned())
            .or_default()
            .push((self.id, tx));
        Ok(rx)
    }

    async fn unsubscribe(&self, channel: &str) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        if let Some(senders) = state.subscribers.get_mut(channel) {
            senders.retain(|(id, _)| *id != self.id);
        }
        Ok(())
    }

    fn events(&self) -> broadcast::Receiver<RelayEvent> {
        self.events.subscribe()
    }
}
