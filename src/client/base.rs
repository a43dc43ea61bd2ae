//! Shared client scaffolding.
//!
//! Both peers compose the same core: an envelope codec, an inbound routing
//! pump, the `Disconnected -> Connecting -> Connected` state machine, and
//! the durable-session lifecycle (`resume`, `disconnect`). The role-specific
//! handshake handlers live in `dapp.rs` and `wallet.rs` and drive this core
//! through an internal interface rather than holding back-references.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::client::events::{ClientEvent, EventReceiver};
use crate::core::{
    until_ms, ClientError, PlaintextEnvelope, ProtocolMessage, Session, OTP_DEADLINE,
    PUBLIC_KEY_SIZE, SESSION_REQUEST_TTL, SESSION_TTL,
};
use crate::crypto::{ecies, KeyPair};
use crate::store::{KeyValueStore, SessionStore};
use crate::transport::{Inbound, Relay, Transport};

/// Client lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Not connected; the only state `connect()` accepts.
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Session established; messages flow.
    Connected,
}

impl ClientState {
    /// Lowercase name, used in state-mismatch errors.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

impl std::fmt::Display for ClientState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Lifetime of an established session.
    pub session_ttl: Duration,

    /// Lifetime of an advertised session request.
    pub request_ttl: Duration,

    /// OTP entry deadline granted by the wallet in untrusted mode.
    pub otp_deadline: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            session_ttl: SESSION_TTL,
            request_ttl: SESSION_REQUEST_TTL,
            otp_deadline: OTP_DEADLINE,
        }
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Start from the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the session lifetime.
    pub fn session_ttl(mut self, ttl: Duration) -> Self {
        self.config.session_ttl = ttl;
        self
    }

    /// Set the session-request lifetime.
    pub fn request_ttl(mut self, ttl: Duration) -> Self {
        self.config.request_ttl = ttl;
        self
    }

    /// Set the OTP entry deadline.
    pub fn otp_deadline(mut self, deadline: Duration) -> Self {
        self.config.otp_deadline = deadline;
        self
    }

    /// Finish the configuration.
    pub fn build(self) -> ClientConfig {
        self.config
    }
}

/// A handshake message routed to the pending connection handler.
#[derive(Debug)]
pub(crate) struct HandshakeSignal {
    /// Channel the message arrived on.
    pub(crate) channel: String,
    /// The decrypted handshake message.
    pub(crate) message: ProtocolMessage,
}

/// Outcome of waiting for the next handshake signal.
pub(crate) enum WaitOutcome {
    /// A handshake message arrived in time.
    Signal(HandshakeSignal),
    /// The deadline passed first.
    TimedOut,
    /// The client tore down while waiting.
    Closed,
}

/// Wait for the next handshake signal, bounded by an epoch-ms deadline.
pub(crate) async fn wait_for_signal(
    rx: &mut mpsc::UnboundedReceiver<HandshakeSignal>,
    deadline: u64,
) -> WaitOutcome {
    match tokio::time::timeout(until_ms(deadline), rx.recv()).await {
        Err(_) => WaitOutcome::TimedOut,
        Ok(None) => WaitOutcome::Closed,
        Ok(Some(signal)) => WaitOutcome::Signal(signal),
    }
}

/// Buffer holding application messages until `Connected` has been emitted,
/// so the event order `connected` before `message` always holds.
struct DeliveryGate {
    open: bool,
    buffered: Vec<serde_json::Value>,
}

/// The scaffolding shared by both peer clients.
pub(crate) struct ClientCore {
    pub(crate) config: ClientConfig,
    pub(crate) transport: Transport,
    pub(crate) sessions: SessionStore,
    state: RwLock<ClientState>,
    session: RwLock<Option<Session>>,
    keys: RwLock<Option<KeyPair>>,
    events_tx: mpsc::UnboundedSender<ClientEvent>,
    handshake_tx: Mutex<Option<mpsc::UnboundedSender<HandshakeSignal>>>,
    gate: Mutex<DeliveryGate>,
    decrypt_failures: AtomicU64,
    pump: StdMutex<Option<JoinHandle<()>>>,
}

impl ClientCore {
    /// Build the core and start its inbound routing pump.
    pub(crate) async fn new(
        relay: Arc<dyn Relay>,
        kv: Arc<dyn KeyValueStore>,
        config: ClientConfig,
    ) -> Result<(Arc<Self>, EventReceiver), ClientError> {
        let (transport, inbound_rx) = Transport::new(relay, kv.clone()).await?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let core = Arc::new(Self {
            config,
            transport,
            sessions: SessionStore::new(kv),
            state: RwLock::new(ClientState::Disconnected),
            session: RwLock::new(None),
            keys: RwLock::new(None),
            events_tx,
            handshake_tx: Mutex::new(None),
            gate: Mutex::new(DeliveryGate {
                open: false,
                buffered: Vec::new(),
            }),
            decrypt_failures: AtomicU64::new(0),
            pump: StdMutex::new(None),
        });

        let pump = tokio::spawn(Self::pump(Arc::clone(&core), inbound_rx));
        *core.pump.lock().unwrap_or_else(PoisonError::into_inner) = Some(pump);

        Ok((core, EventReceiver::new(events_rx)))
    }

    // =========================================================================
    // Inbound routing
    // =========================================================================

    /// Decrypt, parse and route every guarded inbound envelope.
    ///
    /// Undecryptable envelopes are dropped, counted and surfaced as `Error`
    /// events; they never tear the session down.
    async fn pump(self: Arc<Self>, mut inbound: mpsc::UnboundedReceiver<Inbound>) {
        while let Some(Inbound { channel, envelope }) = inbound.recv().await {
            let Some(key_pair) = self.keys.read().await.clone() else {
                debug!(%channel, "no active key pair; dropping envelope");
                continue;
            };
            let plaintext = match ecies::decrypt(&envelope.ciphertext, key_pair.private_key()) {
                Ok(plaintext) => plaintext,
                Err(_) => {
                    self.note_decrypt_failure(&channel);
                    continue;
                }
            };
            let envelope: PlaintextEnvelope = match serde_json::from_slice(&plaintext) {
                Ok(envelope) => envelope,
                Err(_) => {
                    self.note_decrypt_failure(&channel);
                    continue;
                }
            };
            match envelope.payload {
                ProtocolMessage::Message { payload } => self.deliver(payload).await,
                handshake => self.route_handshake(channel, handshake).await,
            }
        }
    }

    fn note_decrypt_failure(&self, channel: &str) {
        let total = self.decrypt_failures.fetch_add(1, Ordering::Relaxed) + 1;
        warn!(%channel, total, "dropping undecryptable envelope");
        self.emit(ClientEvent::Error(format!(
            "dropped undecryptable envelope on {channel}"
        )));
    }

    /// Emit an application message, or hold it until `Connected` fires.
    async fn deliver(&self, payload: serde_json::Value) {
        let mut gate = self.gate.lock().await;
        if gate.open {
            self.emit(ClientEvent::Message(payload));
        } else {
            gate.buffered.push(payload);
        }
    }

    async fn route_handshake(&self, channel: String, message: ProtocolMessage) {
        let tx = self.handshake_tx.lock().await;
        let delivered = tx
            .as_ref()
            .is_some_and(|tx| tx.send(HandshakeSignal { channel, message }).is_ok());
        if !delivered {
            debug!("ignoring handshake message with no pending handler");
        }
    }

    // =========================================================================
    // State machine
    // =========================================================================

    pub(crate) async fn state(&self) -> ClientState {
        *self.state.read().await
    }

    async fn transition(&self, to: ClientState) {
        *self.state.write().await = to;
    }

    /// Enter `Connecting` from `Disconnected`, or fail with the state error.
    pub(crate) async fn begin_connecting(&self) -> Result<(), ClientError> {
        let mut state = self.state.write().await;
        if *state != ClientState::Disconnected {
            return Err(ClientError::InvalidState {
                expected: ClientState::Disconnected.as_str(),
                actual: state.as_str(),
            });
        }
        *state = ClientState::Connecting;
        Ok(())
    }

    // =========================================================================
    // Handshake plumbing
    // =========================================================================

    /// Install this peer's key pair for inbound decryption.
    pub(crate) async fn set_key_pair(&self, key_pair: KeyPair) {
        *self.keys.write().await = Some(key_pair);
    }

    /// Route subsequent handshake messages to the returned receiver.
    pub(crate) async fn register_handshake_listener(
        &self,
    ) -> mpsc::UnboundedReceiver<HandshakeSignal> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.handshake_tx.lock().await = Some(tx);
        rx
    }

    async fn clear_handshake_listener(&self) {
        *self.handshake_tx.lock().await = None;
    }

    /// Common success tail of all four handshake handlers: persist the
    /// session, retire the handshake channel, go `Connected` and release any
    /// buffered messages.
    pub(crate) async fn complete_handshake(
        &self,
        session: Session,
        handshake_channel: &str,
    ) -> Result<Session, ClientError> {
        self.sessions.set(&session).await?;
        *self.session.write().await = Some(session.clone());
        self.transport.clear(handshake_channel).await?;
        self.clear_handshake_listener().await;
        self.transition(ClientState::Connected).await;
        self.emit(ClientEvent::Connected);
        self.open_gate().await;
        Ok(session)
    }

    async fn open_gate(&self) {
        let mut gate = self.gate.lock().await;
        for payload in gate.buffered.drain(..) {
            self.emit(ClientEvent::Message(payload));
        }
        gate.open = true;
    }

    async fn close_gate(&self) {
        let mut gate = self.gate.lock().await;
        gate.open = false;
        gate.buffered.clear();
    }

    // =========================================================================
    // Envelope codec
    // =========================================================================

    /// Encrypt a protocol message to the peer and publish it on a channel.
    pub(crate) async fn send_protocol_message(
        &self,
        channel: &str,
        their_public_key: &[u8; PUBLIC_KEY_SIZE],
        message: ProtocolMessage,
    ) -> Result<(), ClientError> {
        let envelope = PlaintextEnvelope::new(message);
        let plaintext = serde_json::to_vec(&envelope)?;
        let ciphertext = ecies::encrypt(&plaintext, their_public_key)?;
        self.transport.publish(channel, ciphertext).await?;
        Ok(())
    }

    /// Send an application payload over the established session.
    pub(crate) async fn send_payload(&self, payload: serde_json::Value) -> Result<(), ClientError> {
        let state = self.state().await;
        if state != ClientState::Connected {
            return Err(ClientError::InvalidState {
                expected: ClientState::Connected.as_str(),
                actual: state.as_str(),
            });
        }
        let session = self.session.read().await.clone().ok_or(ClientError::InvalidState {
            expected: ClientState::Connected.as_str(),
            actual: ClientState::Disconnected.as_str(),
        })?;
        self.send_protocol_message(
            &session.channel,
            &session.their_public_key,
            ProtocolMessage::Message { payload },
        )
        .await
    }

    // =========================================================================
    // Session lifecycle
    // =========================================================================

    /// The active session, if any.
    pub(crate) async fn session(&self) -> Option<Session> {
        self.session.read().await.clone()
    }

    /// Re-open a persisted session.
    ///
    /// Idempotent for the already-connected id. History on the session
    /// channel replays through the transport's guard, so only unseen
    /// messages surface.
    pub(crate) async fn resume(&self, id: &Uuid) -> Result<Session, ClientError> {
        {
            let state = self.state.read().await;
            match *state {
                ClientState::Connected => {
                    if let Some(session) = self.session.read().await.clone() {
                        if session.id == *id {
                            return Ok(session);
                        }
                    }
                    return Err(ClientError::InvalidState {
                        expected: ClientState::Disconnected.as_str(),
                        actual: ClientState::Connected.as_str(),
                    });
                }
                ClientState::Connecting => {
                    return Err(ClientError::InvalidState {
                        expected: ClientState::Disconnected.as_str(),
                        actual: ClientState::Connecting.as_str(),
                    });
                }
                ClientState::Disconnected => {}
            }
        }

        let session = self
            .sessions
            .get(id)
            .await?
            .ok_or_else(|| ClientError::SessionNotFound(id.to_string()))?;

        self.set_key_pair(session.key_pair.clone()).await;
        self.transport.connect().await?;
        self.transport.subscribe(&session.channel).await?;
        *self.session.write().await = Some(session.clone());
        self.transition(ClientState::Connected).await;
        self.emit(ClientEvent::Connected);
        self.open_gate().await;
        Ok(session)
    }

    /// Tear the client down.
    ///
    /// Best-effort: every step runs even if earlier ones fail, pending
    /// handshake waits are interrupted, and failures are aggregated into a
    /// single error after the state has reached `Disconnected`.
    pub(crate) async fn disconnect(&self) -> Result<(), ClientError> {
        let mut failures: Vec<String> = Vec::new();

        let session = self.session.write().await.take();
        if let Some(session) = session {
            if let Err(err) = self.transport.clear(&session.channel).await {
                failures.push(format!("clear channel: {err}"));
            }
            if let Err(err) = self.sessions.delete(&session.id).await {
                failures.push(format!("delete session: {err}"));
            }
        }
        if let Err(err) = self.transport.disconnect().await {
            failures.push(format!("transport disconnect: {err}"));
        }

        // Dropping the listener wakes any pending handshake wait.
        self.clear_handshake_listener().await;
        *self.keys.write().await = None;
        self.close_gate().await;
        self.transition(ClientState::Disconnected).await;
        self.emit(ClientEvent::Disconnected);

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ClientError::Teardown(failures.join("; ")))
        }
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    pub(crate) fn emit(&self, event: ClientEvent) {
        let _ = self.events_tx.send(event);
    }

    /// Number of inbound envelopes dropped for failing decryption or parse.
    pub(crate) fn decrypt_failures(&self) -> u64 {
        self.decrypt_failures.load(Ordering::Relaxed)
    }

    /// Abort the routing pump; called when the owning client is dropped.
    pub(crate) fn shutdown(&self) {
        if let Ok(mut pump) = self.pump.lock() {
            if let Some(pump) = pump.take() {
                pump.abort();
            }
        }
    }
}
