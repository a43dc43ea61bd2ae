//! The relay interface.
//!
//! The relay is an opaque, untrusted pub/sub bus reached over a full-duplex
//! connection. It guarantees per-sender publish order and replays a
//! channel's history to new subscribers; everything else (authentication,
//! confidentiality, cross-sender ordering) is the protocol's problem.

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};

use crate::core::TransportError;

/// Connection-level event emitted by a relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayEvent {
    /// The underlying connection came up.
    Connected,
    /// The underlying connection dropped; subscriptions are gone.
    Disconnected,
}

/// An untrusted ordered pub/sub bus with per-channel history.
#[async_trait]
pub trait Relay: Send + Sync {
    /// Establish the underlying connection. Idempotent.
    async fn connect(&self) -> Result<(), TransportError>;

    /// Tear down the underlying connection.
    async fn disconnect(&self) -> Result<(), TransportError>;

    /// Publish a payload on a channel. At-least-once delivery.
    async fn publish(&self, channel: &str, payload: String) -> Result<(), TransportError>;

    /// Subscribe to a channel.
    ///
    /// The receiver yields the channel's full history, in order, before any
    /// live message. The stream ends when the connection drops or the
    /// channel is unsubscribed.
    async fn subscribe(
        &self,
        channel: &str,
    ) -> Result<mpsc::UnboundedReceiver<String>, TransportError>;

    /// Stop receiving a channel.
    async fn unsubscribe(&self, channel: &str) -> Result<(), TransportError>;

    /// Stream of connection events for reconnect supervision.
    fn events(&self) -> broadcast::Receiver<RelayEvent>;
}
