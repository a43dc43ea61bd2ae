//! WalletBridge Protocol - Crypto Layer
//!
//! Key management and the hybrid envelope cipher:
//!
//! - **Key pairs**: [`KeyPair`] (secp256k1, compressed SEC1 public keys)
//! - **Peer-key validation**: [`validate_peer_key`], [`decode_public_key_b64`]
//! - **Envelope cipher**: [`ecies::encrypt`] / [`ecies::decrypt`]
//!   (ephemeral ECDH + HKDF-SHA256 + ChaCha20-Poly1305)
//! - **One-time passwords**: [`generate_otp`], [`constant_time_eq`]
//!
//! Encryption is authenticated; tampered or wrong-key ciphertext fails
//! closed with [`CryptoError::DecryptionFailed`](crate::core::CryptoError).

pub mod ecies;
mod keys;
mod otp;

pub use keys::*;
pub use otp::*;

pub(crate) use keys::b64;
