//! Events a client surfaces to its embedding application.

use tokio::sync::{mpsc, oneshot};

use crate::core::SessionRequest;

/// A pending OTP entry on the dApp side.
///
/// Emitted inside [`ClientEvent::OtpRequired`]; the application shows an
/// input field and forwards the user's digits with [`OtpPrompt::submit`].
/// Dropping the prompt aborts the handshake as an entry timeout.
pub struct OtpPrompt {
    deadline: u64,
    submit_tx: oneshot::Sender<String>,
}

impl OtpPrompt {
    pub(crate) fn new(deadline: u64) -> (Self, oneshot::Receiver<String>) {
        let (submit_tx, submit_rx) = oneshot::channel();
        (
            Self {
                deadline,
                submit_tx,
            },
            submit_rx,
        )
    }

    /// Entry deadline in epoch milliseconds.
    pub fn deadline(&self) -> u64 {
        self.deadline
    }

    /// Hand the user-entered OTP to the pending handshake.
    pub fn submit(self, otp: impl Into<String>) {
        let _ = self.submit_tx.send(otp.into());
    }
}

impl std::fmt::Debug for OtpPrompt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OtpPrompt")
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

/// Events emitted by [`DappClient`](crate::client::DappClient) and
/// [`WalletClient`](crate::client::WalletClient).
#[derive(Debug)]
pub enum ClientEvent {
    /// The session is established; messages may flow.
    Connected,

    /// The client tore down; the session record is gone.
    Disconnected,

    /// An application message arrived over the session.
    Message(serde_json::Value),

    /// dApp only: the session request to convey out-of-band (QR).
    SessionRequest(SessionRequest),

    /// dApp only, untrusted mode: ask the user for the wallet's OTP.
    OtpRequired(OtpPrompt),

    /// Wallet only, untrusted mode: show this OTP until the deadline.
    DisplayOtp {
        /// The 6-digit password to display.
        otp: String,
        /// Display/entry deadline in epoch milliseconds.
        deadline: u64,
    },

    /// A non-fatal error, e.g. an undecryptable envelope that was dropped.
    Error(String),
}

/// Receiving half of a client's event stream.
pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<ClientEvent>,
}

impl EventReceiver {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<ClientEvent>) -> Self {
        Self { rx }
    }

    /// Next event, `None` once the client is gone.
    pub async fn recv(&mut self) -> Option<ClientEvent> {
        self.rx.recv().await
    }

    /// Non-blocking poll for an already-queued event.
    pub fn try_recv(&mut self) -> Option<ClientEvent> {
        self.rx.try_recv().ok()
    }
}
