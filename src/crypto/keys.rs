//! secp256k1 key management.
//!
//! Provides key generation and peer-key validation. Private key material is
//! zeroized on drop.

use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::{PublicKey, SecretKey};
use rand::rngs::OsRng;
use zeroize::Zeroize;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::core::{CryptoError, PRIVATE_KEY_SIZE, PUBLIC_KEY_SIZE, PUBLIC_KEY_PREFIXES};

/// A secp256k1 key pair owned by one session.
///
/// The private key is zeroized on drop.
#[derive(Clone)]
pub struct KeyPair {
    /// Private scalar (32 bytes) - zeroized on drop.
    private: [u8; PRIVATE_KEY_SIZE],
    /// Compressed SEC1 public key (33 bytes).
    public: [u8; PUBLIC_KEY_SIZE],
}

impl KeyPair {
    /// Generate a new random key pair.
    pub fn generate() -> Self {
        let secret = SecretKey::random(&mut OsRng);
        let mut private = [0u8; PRIVATE_KEY_SIZE];
        private.copy_from_slice(&secret.to_bytes());

        let mut public = [0u8; PUBLIC_KEY_SIZE];
        public.copy_from_slice(secret.public_key().to_encoded_point(true).as_bytes());

        Self { private, public }
    }

    /// Rebuild a key pair from stored key material.
    ///
    /// Fails if the private scalar is out of range or the public key does not
    /// match the private one.
    pub fn from_bytes(
        private: [u8; PRIVATE_KEY_SIZE],
        public: [u8; PUBLIC_KEY_SIZE],
    ) -> Result<Self, CryptoError> {
        let secret = SecretKey::from_slice(&private)
            .map_err(|_| CryptoError::InvalidKey("private scalar out of range".into()))?;
        let derived = secret.public_key().to_encoded_point(true);
        if derived.as_bytes() != public {
            return Err(CryptoError::InvalidKey(
                "public key does not match private key".into(),
            ));
        }
        Ok(Self { private, public })
    }

    /// The private key bytes.
    pub fn private_key(&self) -> &[u8; PRIVATE_KEY_SIZE] {
        &self.private
    }

    /// The compressed public key bytes.
    pub fn public_key(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.public
    }

    /// The compressed public key, base64-encoded for the wire.
    pub fn public_key_b64(&self) -> String {
        BASE64.encode(self.public)
    }
}

impl Drop for KeyPair {
    fn drop(&mut self) {
        self.private.zeroize();
    }
}

impl PartialEq for KeyPair {
    fn eq(&self, other: &Self) -> bool {
        self.private == other.private && self.public == other.public
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &BASE64.encode(self.public))
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

impl serde::Serialize for KeyPair {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut record = serializer.serialize_struct("KeyPair", 2)?;
        record.serialize_field("privateKey", &BASE64.encode(self.private))?;
        record.serialize_field("publicKey", &BASE64.encode(self.public))?;
        record.end()
    }
}

impl<'de> serde::Deserialize<'de> for KeyPair {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(serde::Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Record {
            private_key: String,
            public_key: String,
        }
        let record = Record::deserialize(deserializer)?;
        let private: [u8; PRIVATE_KEY_SIZE] = BASE64
            .decode(&record.private_key)
            .map_err(serde::de::Error::custom)?
            .try_into()
            .map_err(|_| serde::de::Error::custom("bad private key length"))?;
        let public: [u8; PUBLIC_KEY_SIZE] = BASE64
            .decode(&record.public_key)
            .map_err(serde::de::Error::custom)?
            .try_into()
            .map_err(|_| serde::de::Error::custom("bad public key length"))?;
        KeyPair::from_bytes(private, public).map_err(serde::de::Error::custom)
    }
}

/// Validate a peer's compressed public key.
///
/// Accepts exactly 33 bytes with a 0x02/0x03 prefix that parse to an
/// on-curve point; anything else fails with `InvalidKey`.
pub fn validate_peer_key(bytes: &[u8]) -> Result<[u8; PUBLIC_KEY_SIZE], CryptoError> {
    if bytes.len() != PUBLIC_KEY_SIZE {
        return Err(CryptoError::InvalidKey(format!(
            "expected {PUBLIC_KEY_SIZE} bytes, got {}",
            bytes.len()
        )));
    }
    if !PUBLIC_KEY_PREFIXES.contains(&bytes[0]) {
        return Err(CryptoError::InvalidKey(format!(
            "bad compression prefix 0x{:02x}",
            bytes[0]
        )));
    }
    PublicKey::from_sec1_bytes(bytes)
        .map_err(|_| CryptoError::InvalidKey("point not on curve".into()))?;

    let mut key = [0u8; PUBLIC_KEY_SIZE];
    key.copy_from_slice(bytes);
    Ok(key)
}

/// Decode and validate a base64 peer public key from the wire.
pub fn decode_public_key_b64(text: &str) -> Result<[u8; PUBLIC_KEY_SIZE], CryptoError> {
    let bytes = BASE64
        .decode(text.as_bytes())
        .map_err(|_| CryptoError::InvalidKey("bad base64".into()))?;
    validate_peer_key(&bytes)
}

/// Serde helper encoding fixed-size byte arrays as base64 strings.
pub(crate) mod b64 {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::{Engine, BASE64};

    pub fn serialize<S: Serializer, const N: usize>(
        bytes: &[u8; N],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>, const N: usize>(
        deserializer: D,
    ) -> Result<[u8; N], D::Error> {
        let text = String::deserialize(deserializer)?;
        let raw = BASE64
            .decode(text.as_bytes())
            .map_err(serde::de::Error::custom)?;
        raw.try_into()
            .map_err(|_| serde::de::Error::custom("bad byte-field length"))
    }
}
