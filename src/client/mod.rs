//! WalletBridge Protocol - Client Layer
//!
//! High-level peer APIs over the transport, store and crypto layers:
//!
//! - **Events**: [`ClientEvent`], [`EventReceiver`], [`OtpPrompt`]
//! - **Shared scaffolding**: [`ClientState`], [`ClientConfig`] and the
//!   internal client core (codec, routing, resume, teardown)
//! - **Peers**: [`DappClient`] (initiates sessions) and [`WalletClient`]
//!   (answers session requests)
//!
//! Both peers drive the same two-phase handshake; the dApp picks the
//! [`ConnectionMode`](crate::core::ConnectionMode) and the wallet follows
//! the mode carried by the session request.

mod base;
#[cfg(feature = "dapp")]
mod dapp;
mod events;
#[cfg(feature = "wallet")]
mod wallet;

pub use base::{ClientConfig, ClientConfigBuilder, ClientState};
#[cfg(feature = "dapp")]
pub use dapp::*;
pub use events::*;
#[cfg(feature = "wallet")]
pub use wallet::*;
