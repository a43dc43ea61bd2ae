//! # WalletBridge Protocol
//!
//! WalletBridge is a secure, asynchronous connection protocol between a
//! decentralized application (the *dApp*) and a mobile wallet, mediated by
//! an untrusted pub/sub relay. It provides:
//!
//! - **Security**: every message is end-to-end encrypted to the peer's
//!   secp256k1 key; the relay only ever sees ciphertext
//! - **Binding**: an optional 6-digit OTP ties the two ends together when
//!   the transport between them is untrusted
//! - **Resilience**: sessions persist, transports reconnect with backoff,
//!   and channel history replays so offline peers catch up exactly once
//! - **Simplicity**: one dApp, one wallet, one session key pair per session
//!
//! ## Handshake
//!
//! ```text
//! dApp                        relay                       wallet
//!  │ subscribe handshake:<id>   │                            │
//!  │──────────────────────────> │   SessionRequest via QR    │
//!  │                            │ <──────────────────────────│
//!  │                            │   handshake-offer          │
//!  │ <──────────────────────────│   (otp? on wallet screen)  │
//!  │   user retypes otp         │                            │
//!  │   handshake-ack on         │                            │
//!  │   session:<uuid>           │                            │
//!  │──────────────────────────> │──────────────────────────> │
//!  │        both peers persist the session, messages flow    │
//! ```
//!
//! ## Feature Flags
//!
//! - `crypto` (default): key pairs and the hybrid envelope cipher
//! - `store` (default): key-value layer and session store
//! - `transport` (default): replay-safe pub/sub adapter
//! - `dapp` / `wallet` (default): the high-level peer clients
//!
//! ## Modules
//!
//! - [`core`]: constants, errors, wire messages, sessions (always included)
//! - [`crypto`]: key management and envelope encryption
//! - [`store`]: durable key-value and session storage
//! - [`transport`]: relay interface and the replay-guarded adapter
//! - [`client`]: [`DappClient`] and [`WalletClient`]
//!
//! ## Example Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use walletbridge::prelude::*;
//!
//! let hub = MemoryRelayHub::new();
//!
//! let (dapp, mut dapp_events) = DappClient::new(
//!     Arc::new(hub.endpoint()),
//!     Arc::new(MemoryStore::new()),
//!     ClientConfig::default(),
//! )
//! .await?;
//!
//! // Drive the handshake; the SessionRequest event carries the QR payload.
//! let session = dapp.connect(ConnectionMode::Untrusted).await?;
//! dapp.send_request(serde_json::json!({"method": "eth_accounts"})).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Core module (always included)
pub mod core;

// Crypto layer (feature-gated)
#[cfg(feature = "crypto")]
#[cfg_attr(docsrs, doc(cfg(feature = "crypto")))]
pub mod crypto;

// Storage layer (feature-gated)
#[cfg(feature = "store")]
#[cfg_attr(docsrs, doc(cfg(feature = "store")))]
pub mod store;

// Transport layer (feature-gated)
#[cfg(feature = "transport")]
#[cfg_attr(docsrs, doc(cfg(feature = "transport")))]
pub mod transport;

// Client APIs (feature-gated)
#[cfg(any(feature = "dapp", feature = "wallet"))]
#[cfg_attr(docsrs, doc(cfg(any(feature = "dapp", feature = "wallet"))))]
pub mod client;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::*;

    #[cfg(feature = "crypto")]
    pub use crate::crypto::{
        constant_time_eq, decode_public_key_b64, generate_otp, validate_peer_key, KeyPair,
    };

    #[cfg(feature = "store")]
    pub use crate::store::{KeyValueStore, MemoryStore};
    #[cfg(all(feature = "store", feature = "crypto"))]
    pub use crate::store::SessionStore;

    #[cfg(feature = "transport")]
    pub use crate::transport::{
        Inbound, MemoryRelay, MemoryRelayHub, Relay, RelayEvent, Transport,
    };

    #[cfg(any(feature = "dapp", feature = "wallet"))]
    pub use crate::client::{ClientConfig, ClientConfigBuilder, ClientEvent, ClientState, EventReceiver};
    #[cfg(feature = "dapp")]
    pub use crate::client::{DappClient, OtpPrompt};
    #[cfg(feature = "wallet")]
    pub use crate::client::WalletClient;
}

// Re-export commonly used items at crate root
pub use core::{ClientError, CryptoError, StoreError, TransportError};
#[cfg(feature = "crypto")]
pub use core::{ConnectionMode, Session, SessionRequest};

#[cfg(feature = "dapp")]
pub use client::DappClient;
#[cfg(feature = "wallet")]
pub use client::WalletClient;
#[cfg(any(feature = "dapp", feature = "wallet"))]
pub use client::{ClientConfig, ClientEvent, ClientState, EventReceiver};
