//! Wire messages and envelopes.
//!
//! Three nested layers travel over the relay:
//!
//! ```text
//! EncryptedEnvelope { from, nonce, ciphertext }        <- relay payload (JSON)
//!   ciphertext = ECIES( PlaintextEnvelope JSON )
//!     PlaintextEnvelope { id, timestamp, payload }
//!       payload = ProtocolMessage (tagged union)
//! ```

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::time::now_ms;

/// Pre-encryption protocol payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ProtocolMessage {
    /// Wallet's half of the handshake, published on the handshake channel.
    #[serde(rename_all = "camelCase")]
    HandshakeOffer {
        /// Wallet's compressed public key, base64.
        public_key_b64: String,
        /// Secure channel id (the uuid without the `session:` prefix).
        channel_id: String,
        /// One-time password, present in untrusted mode only.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        otp: Option<String>,
        /// OTP entry deadline in epoch milliseconds, untrusted mode only.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        deadline: Option<u64>,
    },

    /// dApp's confirmation, published on the secure channel.
    HandshakeAck,

    /// Application message carried over an established session.
    #[serde(rename_all = "camelCase")]
    Message {
        /// Opaque application payload.
        payload: serde_json::Value,
    },
}

/// The decrypted content of an envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaintextEnvelope {
    /// Fresh message id.
    pub id: Uuid,
    /// Send time in epoch milliseconds.
    pub timestamp: u64,
    /// The protocol payload.
    pub payload: ProtocolMessage,
}

impl PlaintextEnvelope {
    /// Wrap a protocol message with a fresh id and the current timestamp.
    pub fn new(payload: ProtocolMessage) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: now_ms(),
            payload,
        }
    }
}

/// The on-the-wire relay payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedEnvelope {
    /// Sender's transport client id.
    pub from: String,
    /// Optional addressee client id; unused by this implementation but kept
    /// on the wire for compatibility.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    /// Per-(sender, channel) strictly monotonic counter, starting at 1.
    pub nonce: u64,
    /// Base64 ECIES ciphertext of a [`PlaintextEnvelope`].
    pub ciphertext: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_message_tags() {
        let offer = ProtocolMessage::HandshakeOffer {
            public_key_b64: "Ag==".into(),
            channel_id: "abc".into(),
            otp: Some("123456".into()),
            deadline: Some(1_000),
        };
        let json = serde_json::to_value(&offer).unwrap();
        assert_eq!(json["type"], "handshake-offer");
        assert_eq!(json["publicKeyB64"], "Ag==");
        assert_eq!(json["channelId"], "abc");

        let ack = serde_json::to_value(&ProtocolMessage::HandshakeAck).unwrap();
        assert_eq!(ack["type"], "handshake-ack");

        let msg = serde_json::to_value(&ProtocolMessage::Message {
            payload: serde_json::json!({"method": "eth_accounts"}),
        })
        .unwrap();
        assert_eq!(msg["type"], "message");
        assert_eq!(msg["payload"]["method"], "eth_accounts");
    }

    #[test]
    fn test_trusted_offer_omits_otp_fields() {
        let offer = ProtocolMessage::HandshakeOffer {
            public_key_b64: "Ag==".into(),
            channel_id: "abc".into(),
            otp: None,
            deadline: None,
        };
        let json = serde_json::to_string(&offer).unwrap();
        assert!(!json.contains("otp"));
        assert!(!json.contains("deadline"));
    }

    #[test]
    fn test_plaintext_envelope_roundtrip() {
        let env = PlaintextEnvelope::new(ProtocolMessage::HandshakeAck);
        let json = serde_json::to_string(&env).unwrap();
        let back: PlaintextEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back, env);
    }

    #[test]
    fn test_encrypted_envelope_wire_shape() {
        let env = EncryptedEnvelope {
            from: "client-a".into(),
            to: None,
            nonce: 1,
            ciphertext: "aGVsbG8=".into(),
        };
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["from"], "client-a");
        assert_eq!(json["nonce"], 1);
        assert_eq!(json["ciphertext"], "aGVsbG8=");
        assert!(json.get("to").is_none());
    }
}
