//! Protocol constants for WalletBridge.
//!
//! These values are fixed by the protocol and MUST NOT be changed.

use std::time::Duration;

// =============================================================================
// CRYPTOGRAPHIC CONSTANTS
// =============================================================================

/// secp256k1 private key size.
pub const PRIVATE_KEY_SIZE: usize = 32;

/// secp256k1 compressed public key size (SEC1).
pub const PUBLIC_KEY_SIZE: usize = 33;

/// Valid leading bytes of a compressed SEC1 public key.
pub const PUBLIC_KEY_PREFIXES: [u8; 2] = [0x02, 0x03];

/// ChaCha20-Poly1305 nonce size used by the envelope cipher.
pub const CIPHER_NONCE_SIZE: usize = 12;

/// Poly1305 authentication tag size.
pub const CIPHER_TAG_SIZE: usize = 16;

/// Derived symmetric key size.
pub const CIPHER_KEY_SIZE: usize = 32;

/// HKDF info string binding derived keys to this protocol.
pub const CIPHER_KDF_INFO: &[u8] = b"walletbridge-ecies-v1";

// =============================================================================
// CHANNELS
// =============================================================================

/// Prefix of the one-shot handshake channel.
pub const HANDSHAKE_CHANNEL_PREFIX: &str = "handshake:";

/// Prefix of the durable secure channel.
pub const SESSION_CHANNEL_PREFIX: &str = "session:";

// =============================================================================
// KEY-VALUE STORE LAYOUT
// =============================================================================

/// Key holding this endpoint's stable client id.
pub const CLIENT_ID_KEY: &str = "websocket-transport-client-id";

/// Prefix of the outbound nonce counter key (`nonce:<clientId>:<channel>`).
pub const NONCE_KEY_PREFIX: &str = "nonce:";

/// Prefix of the inbound replay-guard key (`latest-nonces:<clientId>:<channel>`).
pub const LATEST_NONCES_KEY_PREFIX: &str = "latest-nonces:";

/// Prefix of persisted session records (`session:<id>`).
pub const SESSION_KEY_PREFIX: &str = "session:";

/// Key holding the JSON array of persisted session ids.
pub const SESSION_INDEX_KEY: &str = "session-index";

// =============================================================================
// LIFETIMES AND DEADLINES
// =============================================================================

/// Default lifetime of an established session.
pub const SESSION_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Default lifetime of an advertised session request.
pub const SESSION_REQUEST_TTL: Duration = Duration::from_secs(5 * 60);

/// Default deadline for OTP entry and the matching ack wait.
pub const OTP_DEADLINE: Duration = Duration::from_secs(60);

// =============================================================================
// ONE-TIME PASSWORD
// =============================================================================

/// Number of decimal digits in an OTP.
pub const OTP_DIGITS: usize = 6;

/// Smallest valid OTP value.
pub const OTP_MIN: u32 = 100_000;

/// Largest valid OTP value.
pub const OTP_MAX: u32 = 999_999;

// =============================================================================
// TRANSPORT TIMING
// =============================================================================

/// Initial relay reconnect backoff.
pub const RECONNECT_INITIAL_BACKOFF: Duration = Duration::from_millis(500);

/// Reconnect backoff cap.
pub const RECONNECT_MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Connection attempts before `connect()` reports a transport error.
pub const CONNECT_MAX_ATTEMPTS: u32 = 5;
