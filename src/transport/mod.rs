//! WalletBridge Protocol - Transport Layer
//!
//! A replay-safe pub/sub adapter above an untrusted relay:
//!
//! - **Relay interface**: [`Relay`] - publish, subscribe with history
//!   replay, connection events
//! - **In-memory relay**: [`MemoryRelayHub`] / [`MemoryRelay`] for tests
//!   and demos
//! - **Replay defense**: [`NonceAllocator`] (outbound, persist-then-publish)
//!   and [`ReplayGuard`] (inbound, per-sender latest-nonce tracking)
//! - **Adapter**: [`Transport`] - channel subscriptions, envelope stamping,
//!   transparent reconnection with bounded backoff
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            Client Layer                 │
//! ├─────────────────────────────────────────┤
//! │          Transport Adapter              │  <- this module
//! │   stamping, replay guard, reconnect     │
//! ├─────────────────────────────────────────┤
//! │        Relay (untrusted pub/sub)        │
//! └─────────────────────────────────────────┘
//! ```
//!
//! The adapter never inspects ciphertext; it only stamps and filters
//! envelopes. Ordering is guaranteed per sender per channel, matching what
//! the relay provides.

mod memory;
mod nonce;
mod pubsub;
mod relay;

pub use memory::*;
pub use nonce::*;
pub use pubsub::*;
pub use relay::*;
