//! The dApp peer.
//!
//! The dApp initiates: it mints a [`SessionRequest`], conveys it out-of-band
//! (QR), waits for the wallet's `handshake-offer` on the handshake channel
//! and answers with `handshake-ack` on the secure channel. In untrusted
//! mode the user retypes the wallet's OTP before the ack is sent.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::client::base::{
    wait_for_signal, ClientConfig, ClientCore, ClientState, HandshakeSignal, WaitOutcome,
};
use crate::client::events::{ClientEvent, EventReceiver, OtpPrompt};
use crate::core::{
    deadline_ms, handshake_channel, now_ms, session_channel, until_ms, ClientError,
    ConnectionMode, ProtocolMessage, Session, SessionRequest, PUBLIC_KEY_SIZE,
};
use crate::crypto::{constant_time_eq, decode_public_key_b64, KeyPair};
use crate::store::KeyValueStore;
use crate::transport::Relay;

/// The wallet's decrypted handshake offer.
struct Offer {
    public_key_b64: String,
    channel_id: String,
    otp: Option<String>,
    deadline: Option<u64>,
}

/// A dApp-side WalletBridge client.
pub struct DappClient {
    core: Arc<ClientCore>,
}

impl DappClient {
    /// Create a client over a relay connection and this endpoint's store.
    pub async fn new(
        relay: Arc<dyn Relay>,
        kv: Arc<dyn KeyValueStore>,
        config: ClientConfig,
    ) -> Result<(Self, EventReceiver), ClientError> {
        let (core, events) = ClientCore::new(relay, kv, config).await?;
        Ok((Self { core }, events))
    }

    /// Open a new session in the given mode.
    ///
    /// Emits `SessionRequest` for the application to convey to a wallet,
    /// then drives the handshake to completion. Any failure tears partial
    /// state down before the error is returned.
    pub async fn connect(&self, mode: ConnectionMode) -> Result<Session, ClientError> {
        self.connect_with(mode, None).await
    }

    /// Like [`connect`](Self::connect), with a first application message the
    /// wallet delivers to its application once connected.
    pub async fn connect_with(
        &self,
        mode: ConnectionMode,
        initial_message: Option<Value>,
    ) -> Result<Session, ClientError> {
        self.core.begin_connecting().await?;
        let result = match mode {
            ConnectionMode::Trusted => self.handshake_trusted(initial_message).await,
            ConnectionMode::Untrusted => self.handshake_untrusted(initial_message).await,
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

    /// Trusted flow: no OTP binding step.
    async fn handshake_trusted(
        &self,
        initial_message: Option<Value>,
    ) -> Result<Session, ClientError> {
        let (request, key_pair, mut signals) = self
            .advertise(ConnectionMode::Trusted, initial_message)
            .await?;
        let offer = self.wait_offer(&mut signals, &request).await?;
        let their_public_key = decode_public_key_b64(&offer.public_key_b64)?;
        self.establish(&request, key_pair, their_public_key, &offer)
            .await
    }

    /// Untrusted flow: the user retypes the wallet's OTP, compared in
    /// constant time, before the ack goes out.
    async fn handshake_untrusted(
        &self,
        initial_message: Option<Value>,
    ) -> Result<Session, ClientError> {
        let (request, key_pair, mut signals) = self
            .advertise(ConnectionMode::Untrusted, initial_message)
            .await?;
        let offer = self.wait_offer(&mut signals, &request).await?;
        let their_public_key = decode_public_key_b64(&offer.public_key_b64)?;

        // An untrusted offer without an OTP cannot be bound to the user.
        let offer_otp = offer.otp.clone().ok_or(ClientError::OtpMismatch)?;
        let deadline = offer
            .deadline
            .unwrap_or_else(|| deadline_ms(self.core.config.otp_deadline));

        let (prompt, submission) = OtpPrompt::new(deadline);
        self.core.emit(ClientEvent::OtpRequired(prompt));
        let user_otp = match tokio::time::timeout(until_ms(deadline), submission).await {
            Err(_) => return Err(ClientError::OtpEntryTimeout),
            Ok(Err(_)) => return Err(ClientError::OtpEntryTimeout),
            Ok(Ok(otp)) => otp,
        };
        if now_ms() > deadline {
            return Err(ClientError::OtpEntryTimeout);
        }
        if !constant_time_eq(&user_otp, &offer_otp) {
            return Err(ClientError::OtpMismatch);
        }

        self.establish(&request, key_pair, their_public_key, &offer)
            .await
    }

    /// Shared head: mint the request, advertise it, open the handshake
    /// channel.
    async fn advertise(
        &self,
        mode: ConnectionMode,
        initial_message: Option<Value>,
    ) -> Result<
        (
            SessionRequest,
            KeyPair,
            mpsc::UnboundedReceiver<HandshakeSignal>,
        ),
        ClientError,
    > {
        let key_pair = KeyPair::generate();
        let session_id = Uuid::new_v4();
        let request = SessionRequest {
            id: session_id,
            channel: handshake_channel(&session_id),
            public_key_b64: key_pair.public_key_b64(),
            mode,
            expires_at: deadline_ms(self.core.config.request_ttl),
            initial_message,
        };

        self.core.set_key_pair(key_pair.clone()).await;
        let signals = self.core.register_handshake_listener().await;
        self.core
            .emit(ClientEvent::SessionRequest(request.clone()));

        self.core.transport.connect().await?;
        self.core.transport.subscribe(&request.channel).await?;
        Ok((request, key_pair, signals))
    }

    /// Wait for the wallet's offer on the handshake channel, bounded by the
    /// request's expiry.
    async fn wait_offer(
        &self,
        signals: &mut mpsc::UnboundedReceiver<HandshakeSignal>,
        request: &SessionRequest,
    ) -> Result<Offer, ClientError> {
        loop {
            match wait_for_signal(signals, request.expires_at).await {
                WaitOutcome::TimedOut => return Err(ClientError::RequestExpired),
                WaitOutcome::Closed => {
                    return Err(ClientError::InvalidState {
                        expected: ClientState::Connecting.as_str(),
                        actual: ClientState::Disconnected.as_str(),
                    });
                }
                WaitOutcome::Signal(signal) if signal.channel == request.channel => {
                    if let ProtocolMessage::HandshakeOffer {
                        public_key_b64,
                        channel_id,
                        otp,
                        deadline,
                    } = signal.message
                    {
                        return Ok(Offer {
                            public_key_b64,
                            channel_id,
                            otp,
                            deadline,
                        });
                    }
                    debug!("ignoring non-offer handshake message on handshake channel");
                }
                WaitOutcome::Signal(_) => {}
            }
        }
    }

    /// Shared tail: ack on the secure channel, persist and go `Connected`.
    async fn establish(
        &self,
        request: &SessionRequest,
        key_pair: KeyPair,
        their_public_key: [u8; PUBLIC_KEY_SIZE],
        offer: &Offer,
    ) -> Result<Session, ClientError> {
        let session = Session {
            id: request.id,
            channel: session_channel(&offer.channel_id),
            key_pair,
            their_public_key,
            expires_at: deadline_ms(self.core.config.session_ttl),
        };

        self.core.transport.subscribe(&session.channel).await?;
        self.core
            .send_protocol_message(
                &session.channel,
                &session.their_public_key,
                ProtocolMessage::HandshakeAck,
            )
            .await?;
        self.core.complete_handshake(session, &request.channel).await
    }

    /// Send an application request over the established session.
    pub async fn send_request(&self, payload: Value) -> Result<(), ClientError> {
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

impl Drop for DappClient {
    fn drop(&mut self) {
        self.core.shutdown();
    }
}
