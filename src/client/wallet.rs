//! The wallet peer.
//!
//! The wallet answers: given a scanned [`SessionRequest`] it validates the
//! dApp's key and expiry, picks the secure channel, publishes the
//! `handshake-offer` and - in untrusted mode - displays an OTP and waits
//! for the dApp's `handshake-ack`. Trusted mode is fire-and-forget: the
//! offer goes out and the wallet is immediately connected; a late ack is
//! ignored by the router.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::client::base::{
    wait_for_signal, ClientConfig, ClientCore, ClientState, HandshakeSignal, WaitOutcome,
};
use crate::client::events::{ClientEvent, EventReceiver};
use crate::core::{
    deadline_ms, session_channel, ClientError, ConnectionMode, ProtocolMessage, Session,
    SessionRequest,
};
use crate::crypto::{decode_public_key_b64, generate_otp, KeyPair};
use crate::store::KeyValueStore;
use crate::transport::Relay;

/// A wallet-side WalletBridge client.
pub struct WalletClient {
    core: Arc<ClientCore>,
}

impl WalletClient {
    /// Create a client over a relay connection and this endpoint's store.
    pub async fn new(
        relay: Arc<dyn Relay>,
        kv: Arc<dyn KeyValueStore>,
        config: ClientConfig,
    ) -> Result<(Self, EventReceiver), ClientError> {
        let (core, events) = ClientCore::new(relay, kv, config).await?;
        Ok((Self { core }, events))
    }

    /// Answer a session request scanned out-of-band.
    ///
    /// Runs the trusted or untrusted handler according to the request's
    /// mode. Any failure tears partial state down before the error is
    /// returned.
    pub async fn connect(&self, request: SessionRequest) -> Result<Session, ClientError> {
        self.core.begin_connecting().await?;
        let result = match request.mode {
            ConnectionMode::Trusted => self.handshake_trusted(&request).await,
            ConnectionMode::Untrusted => self.handshake_untrusted(&request).await,
        };
        match result {
            Ok(session) => Ok(session),
            Err(err) => {
                if let Err(teardown) = self.core.disconnect().await {
                    debug!(%teardown, "teardown after failed handshake was incomplete");
                }
                Err(err)
            }
        }
    }

    /// Untrusted flow: display an OTP and require the dApp's ack before the
    /// deadline.
    async fn handshake_untrusted(&self, request: &SessionRequest) -> Result<Session, ClientError> {
        let (session, channel_id, mut signals) = self.prepare(request).await?;

        let otp = generate_otp();
        let deadline = deadline_ms(self.core.config.otp_deadline);
        self.core.emit(ClientEvent::DisplayOtp {
            otp: otp.clone(),
            deadline,
        });

        self.core
            .send_protocol_message(
                &request.channel,
                &session.their_public_key,
                ProtocolMessage::HandshakeOffer {
                    public_key_b64: session.key_pair.public_key_b64(),
                    channel_id,
                    otp: Some(otp),
                    deadline: Some(deadline),
                },
            )
            .await?;

        // The ack arrives on the secure channel once the user's OTP matched.
        loop {
            match wait_for_signal(&mut signals, deadline).await {
                WaitOutcome::TimedOut => return Err(ClientError::OtpEntryTimeout),
                WaitOutcome::Closed => {
                    return Err(ClientError::InvalidState {
                        expected: ClientState::Connecting.as_str(),
                        actual: ClientState::Disconnected.as_str(),
                    });
                }
                WaitOutcome::Signal(HandshakeSignal { channel, message })
                    if channel == session.channel
                        && matches!(message, ProtocolMessage::HandshakeAck) =>
                {
                    break;
                }
                WaitOutcome::Signal(_) => {
                    debug!("ignoring stray handshake message while awaiting ack");
                }
            }
        }

        self.finish(session, request).await
    }

    /// Trusted flow: the offer is fire-and-forget and the wallet connects
    /// immediately, trading liveness confirmation for latency.
    async fn handshake_trusted(&self, request: &SessionRequest) -> Result<Session, ClientError> {
        let (session, channel_id, _signals) = self.prepare(request).await?;

        self.core
            .send_protocol_message(
                &request.channel,
                &session.their_public_key,
                ProtocolMessage::HandshakeOffer {
                    public_key_b64: session.key_pair.public_key_b64(),
                    channel_id,
                    otp: None,
                    deadline: None,
                },
            )
            .await?;

        self.finish(session, request).await
    }

    /// Shared head: validate the request, build the session draft and open
    /// both channels.
    async fn prepare(
        &self,
        request: &SessionRequest,
    ) -> Result<(Session, String, mpsc::UnboundedReceiver<HandshakeSignal>), ClientError> {
        if request.is_expired() {
            return Err(ClientError::RequestExpired);
        }
        let their_public_key = decode_public_key_b64(&request.public_key_b64)?;

        let key_pair = KeyPair::generate();
        let channel_id = Uuid::new_v4().to_string();
        let session = Session {
            id: request.id,
            channel: session_channel(&channel_id),
            key_pair,
            their_public_key,
            expires_at: deadline_ms(self.core.config.session_ttl),
        };

        self.core.set_key_pair(session.key_pair.clone()).await;
        let signals = self.core.register_handshake_listener().await;

        self.core.transport.connect().await?;
        self.core.transport.subscribe(&request.channel).await?;
        self.core.transport.subscribe(&session.channel).await?;
        Ok((session, channel_id, signals))
    }

    /// Shared tail: persist, retire the handshake channel, go `Connected`
    /// and deliver the request's initial message after `Connected`.
    async fn finish(
        &self,
        session: Session,
        request: &SessionRequest,
    ) -> Result<Session, ClientError> {
        let session = self
            .core
            .complete_handshake(session, &request.channel)
            .await?;
        if let Some(initial) = request.initial_message.clone() {
            self.core.emit(ClientEvent::Message(initial));
        }
        Ok(session)
    }

    /// Send an application response over the established session.
    pub async fn send_response(&self, payload: Value) -> Result<(), ClientError> {
        self.core.send_payload(payload).await
    }

    /// Re-open a persisted session after a restart or disconnect.
    pub async fn resume(&self, id: &Uuid) -> Result<Session, ClientError> {
        self.core.resume(id).await
    }

    /// Tear down: retire the channel, delete the session, drop the relay
    /// connection.
    pub async fn disconnect(&self) -> Result<(), ClientError> {
        self.core.disconnect().await
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> ClientState {
        self.core.state().await
    }

    /// The active session, if connected.
    pub async fn session(&self) -> Option<Session> {
        self.core.session().await
    }

    /// Inbound envelopes dropped for failing decryption.
    pub fn decrypt_failures(&self) -> u64 {
        self.core.decrypt_failures()
    }
}

impl Drop for WalletClient {
    fn drop(&mut self) {
        self.core.shutdown();
    }
}
