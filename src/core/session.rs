//! Sessions and session requests.
//!
//! A [`SessionRequest`] is the ephemeral descriptor a dApp advertises
//! out-of-band (typically as a QR code) to invite a wallet. A [`Session`] is
//! the durable record of the established secure channel, persisted on both
//! peers and deleted on disconnect.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::constants::{HANDSHAKE_CHANNEL_PREFIX, PUBLIC_KEY_SIZE, SESSION_CHANNEL_PREFIX};
use crate::core::time::now_ms;
use crate::crypto::KeyPair;

/// How the dApp and wallet bind their two ends of the handshake.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionMode {
    /// Same-device or pre-trusted flow; no OTP binding step.
    Trusted,
    /// The wallet displays an OTP that the user retypes on the dApp.
    #[default]
    Untrusted,
}

/// Name of the one-shot handshake channel for a session id.
pub fn handshake_channel(session_id: &Uuid) -> String {
    format!("{HANDSHAKE_CHANNEL_PREFIX}{session_id}")
}

/// Name of the durable secure channel for a channel id.
pub fn session_channel(channel_id: &str) -> String {
    format!("{SESSION_CHANNEL_PREFIX}{channel_id}")
}

/// The ephemeral invitation a dApp conveys to a wallet out-of-band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequest {
    /// Future session id, chosen by the dApp.
    pub id: Uuid,
    /// One-shot handshake channel, `handshake:<uuid>`.
    pub channel: String,
    /// dApp's compressed public key, base64.
    pub public_key_b64: String,
    /// Handshake mode the dApp selected.
    pub mode: ConnectionMode,
    /// Short expiry in epoch milliseconds.
    pub expires_at: u64,
    /// Optional first application message, delivered to the wallet
    /// application once the session is connected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_message: Option<serde_json::Value>,
}

impl SessionRequest {
    /// Whether the request is past its expiry.
    pub fn is_expired(&self) -> bool {
        now_ms() > self.expires_at
    }

    /// Serialize to the JSON a QR code carries.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse the JSON scanned from a QR code.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Durable record of an established secure channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Stable identifier chosen by the dApp, copied verbatim by the wallet.
    pub id: Uuid,
    /// Post-handshake secure channel, `session:<uuid>`.
    pub channel: String,
    /// This peer's key pair for the session.
    pub key_pair: KeyPair,
    /// The other peer's compressed public key.
    #[serde(with = "crate::crypto::b64")]
    pub their_public_key: [u8; PUBLIC_KEY_SIZE],
    /// Absolute expiry in epoch milliseconds.
    pub expires_at: u64,
}

impl Session {
    /// Whether the session is past its expiry and must be evicted.
    pub fn is_expired(&self) -> bool {
        now_ms() > self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::constants::SESSION_TTL;
    use crate::core::time::deadline_ms;

    #[test]
    fn test_channel_names() {
        let id = Uuid::new_v4();
        assert_eq!(handshake_channel(&id), format!("handshake:{id}"));
        assert_eq!(session_channel("abc"), "session:abc");
    }

    #[test]
    fn test_session_request_roundtrip() {
        let request = SessionRequest {
            id: Uuid::new_v4(),
            channel: handshake_channel(&Uuid::new_v4()),
            public_key_b64: "AoW8...".into(),
            mode: ConnectionMode::Untrusted,
            expires_at: deadline_ms(std::time::Duration::from_secs(300)),
            initial_message: None,
        };
        let json = request.to_json().unwrap();
        assert!(json.contains("\"mode\":\"untrusted\""));
        assert!(!json.contains("initialMessage"));
        let back = SessionRequest::from_json(&json).unwrap();
        assert_eq!(back, request);
    }

    #[test]
    fn test_session_record_uses_base64_byte_fields() {
        let session = Session {
            id: Uuid::new_v4(),
            channel: session_channel(&Uuid::new_v4().to_string()),
            key_pair: KeyPair::generate(),
            their_public_key: *KeyPair::generate().public_key(),
            expires_at: deadline_ms(SESSION_TTL),
        };
        let json = serde_json::to_value(&session).unwrap();
        assert!(json["theirPublicKey"].is_string());
        assert!(json["keyPair"]["privateKey"].is_string());
        let back: Session = serde_json::from_value(json).unwrap();
        assert_eq!(back, session);
    }

    #[test]
    fn test_expiry_predicates() {
        let mut request = SessionRequest {
            id: Uuid::new_v4(),
            channel: handshake_channel(&Uuid::new_v4()),
            public_key_b64: String::new(),
            mode: ConnectionMode::Trusted,
            expires_at: deadline_ms(std::time::Duration::from_secs(60)),
            initial_message: None,
        };
        assert!(!request.is_expired());
        request.expires_at = now_ms().saturating_sub(1_000);
        assert!(request.is_expired());
    }
}
