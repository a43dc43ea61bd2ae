//! Error types for the WalletBridge protocol.

use thiserror::Error;

/// Errors in the crypto layer.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Peer public key malformed or not on the curve.
    #[error("invalid peer public key: {0}")]
    InvalidKey(String),

    /// Envelope encryption failed.
    #[error("encryption failed")]
    EncryptionFailed,

    /// Envelope decryption failed (wrong key or tampered ciphertext).
    #[error("decryption failed")]
    DecryptionFailed,
}

/// Errors from the key-value store layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store failed.
    #[error("store backend: {0}")]
    Backend(String),

    /// A persisted record could not be encoded or decoded.
    #[error("corrupt record under {key}: {reason}")]
    CorruptRecord {
        /// Store key of the offending record.
        key: String,
        /// Decode failure description.
        reason: String,
    },
}

/// Errors in the transport layer.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Relay unreachable after the retry budget.
    #[error("relay connection failed: {0}")]
    ConnectionFailed(String),

    /// Operation attempted while the transport is disconnected.
    #[error("transport not connected")]
    NotConnected,

    /// The relay rejected or dropped an operation.
    #[error("relay error: {0}")]
    Relay(String),

    /// Persistent transport state could not be read or written.
    #[error("transport store: {0}")]
    Store(#[from] StoreError),
}

/// Top-level errors surfaced by WalletBridge clients.
///
/// The first eight variants are the protocol error kinds; the remaining ones
/// carry ambient failures (storage, encoding, aggregated teardown).
#[derive(Debug, Error)]
pub enum ClientError {
    /// Operation attempted in the wrong client state.
    #[error("invalid client state: expected {expected}, got {actual}")]
    InvalidState {
        /// State the operation requires.
        expected: &'static str,
        /// State the client was in.
        actual: &'static str,
    },

    /// `resume()` called for an absent or expired session id.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// A session request was received or answered past its expiry.
    #[error("session request expired")]
    RequestExpired,

    /// The user-entered OTP did not match the offer OTP.
    #[error("one-time password mismatch")]
    OtpMismatch,

    /// The OTP (or the matching ack) was not received by its deadline.
    #[error("one-time password entry timed out")]
    OtpEntryTimeout,

    /// Peer public key malformed or not on the curve.
    #[error("invalid peer public key: {0}")]
    InvalidKey(String),

    /// An inbound envelope failed authentication or key match.
    #[error("decryption failed")]
    DecryptionFailed,

    /// Transport failure after the retry budget.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Session persistence failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Other crypto failure (e.g. envelope encryption).
    #[error("crypto error: {0}")]
    Crypto(CryptoError),

    /// Wire or storage encoding failure.
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// `disconnect()` completed but one or more teardown steps failed.
    #[error("teardown completed with errors: {0}")]
    Teardown(String),
}

impl From<CryptoError> for ClientError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::InvalidKey(reason) => Self::InvalidKey(reason),
            CryptoError::DecryptionFailed => Self::DecryptionFailed,
            other => Self::Crypto(other),
        }
    }
}
