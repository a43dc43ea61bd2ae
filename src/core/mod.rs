//! WalletBridge Protocol - Core Layer
//!
//! Domain types shared by every other layer:
//!
//! - **Protocol constants**: channel prefixes, key sizes, lifetimes
//! - **Error taxonomy**: [`ClientError`] and the per-layer error enums
//! - **Wire messages**: [`ProtocolMessage`], [`PlaintextEnvelope`], [`EncryptedEnvelope`]
//! - **Sessions**: [`Session`], [`SessionRequest`], [`ConnectionMode`]
//! - **Utilities**: bounded exponential backoff, epoch-millisecond clock

mod constants;
mod error;
mod message;
mod retry;
#[cfg(feature = "crypto")]
mod session;
mod time;

pub use constants::*;
pub use error::*;
pub use message::*;
pub use retry::*;
#[cfg(feature = "crypto")]
pub use session::*;
pub use time::*;
