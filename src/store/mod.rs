//! WalletBridge Protocol - Storage Layer
//!
//! The only durable resource the protocol touches is a caller-supplied
//! key-value store:
//!
//! - **KV interface**: [`KeyValueStore`] (`get`/`set`/`delete`, string keys)
//! - **Reference backend**: [`MemoryStore`] for tests and demos
//! - **Session records**: [`SessionStore`], a thin typed layer persisting
//!   [`Session`](crate::core::Session) records as JSON
//!
//! A store is owned by exactly one client; sharing a prefix between clients
//! is unsupported.

mod kv;
#[cfg(feature = "crypto")]
mod sessions;

pub use kv::*;
#[cfg(feature = "crypto")]
pub use sessions::*;
