//! Hybrid envelope encryption (ECIES style).
//!
//! Each envelope is encrypted to the recipient's static secp256k1 key:
//!
//! ```text
//! ephemeral <- fresh secp256k1 key
//! shared    <- ECDH(ephemeral, recipient_public)
//! key       <- HKDF-SHA256(shared, info = "walletbridge-ecies-v1")
//! wire      <- ephemeral_public(33) || nonce(12) || ChaCha20-Poly1305(key, nonce, plaintext)
//! ```
//!
//! The output travels base64-encoded inside the relay envelope. Decryption is
//! all-or-nothing: any parse, key, or tag failure yields `DecryptionFailed`.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use hkdf::Hkdf;
use k256::ecdh::diffie_hellman;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::{PublicKey, SecretKey};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::core::{
    CryptoError, CIPHER_KDF_INFO, CIPHER_KEY_SIZE, CIPHER_NONCE_SIZE, PRIVATE_KEY_SIZE,
    PUBLIC_KEY_SIZE,
};

/// Derive the symmetric envelope key from an ECDH shared secret.
fn derive_key(shared: &[u8]) -> Result<Zeroizing<[u8; CIPHER_KEY_SIZE]>, CryptoError> {
    let mut key = Zeroizing::new([0u8; CIPHER_KEY_SIZE]);
    Hkdf::<Sha256>::new(None, shared)
        .expand(CIPHER_KDF_INFO, &mut key[..])
        .map_err(|_| CryptoError::EncryptionFailed)?;
    Ok(key)
}

/// Encrypt `plaintext` to the given compressed recipient public key.
///
/// Returns the base64 wire ciphertext.
pub fn encrypt(
    plaintext: &[u8],
    their_public_key: &[u8; PUBLIC_KEY_SIZE],
) -> Result<String, CryptoError> {
    let recipient = PublicKey::from_sec1_bytes(their_public_key)
        .map_err(|_| CryptoError::InvalidKey("recipient key not on curve".into()))?;

    let ephemeral = SecretKey::random(&mut OsRng);
    let shared = diffie_hellman(ephemeral.to_nonzero_scalar(), recipient.as_affine());
    let key = derive_key(shared.raw_secret_bytes())?;

    let mut nonce = [0u8; CIPHER_NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);

    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key[..]));
    let sealed = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let ephemeral_public = ephemeral.public_key().to_encoded_point(true);
    let mut wire = Vec::with_capacity(PUBLIC_KEY_SIZE + CIPHER_NONCE_SIZE + sealed.len());
    wire.extend_from_slice(ephemeral_public.as_bytes());
    wire.extend_from_slice(&nonce);
    wire.extend_from_slice(&sealed);
    Ok(BASE64.encode(wire))
}

/// Decrypt a base64 wire ciphertext with this peer's private key.
///
/// Fails closed: every malformed input maps to `DecryptionFailed`.
pub fn decrypt(
    ciphertext_b64: &str,
    private_key: &[u8; PRIVATE_KEY_SIZE],
) -> Result<Vec<u8>, CryptoError> {
    let wire = BASE64
        .decode(ciphertext_b64.as_bytes())
        .map_err(|_| CryptoError::DecryptionFailed)?;
    if wire.len() < PUBLIC_KEY_SIZE + CIPHER_NONCE_SIZE {
        return Err(CryptoError::DecryptionFailed);
    }

    let (ephemeral_bytes, rest) = wire.split_at(PUBLIC_KEY_SIZE);
    let (nonce, sealed) = rest.split_at(CIPHER_NONCE_SIZE);

    let ephemeral = PublicKey::from_sec1_bytes(ephemeral_bytes)
        .map_err(|_| CryptoError::DecryptionFailed)?;
    let secret =
        SecretKey::from_slice(private_key).map_err(|_| CryptoError::DecryptionFailed)?;

    let shared = diffie_hellman(secret.to_nonzero_scalar(), ephemeral.as_affine());
    let key = derive_key(shared.raw_secret_bytes()).map_err(|_| CryptoError::DecryptionFailed)?;

    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key[..]));
    cipher
        .decrypt(Nonce::from_slice(nonce), sealed)
        .map_err(|_| CryptoError::DecryptionFailed)
}
