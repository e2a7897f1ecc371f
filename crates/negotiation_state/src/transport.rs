//! The transport boundary.
//!
//! The machines only ever see this trait: `send` is fire-and-forget,
//! `receive` blocks until the next inbound message, `Ok(None)` when the
//! optional deadline elapses. The in-memory [`ChannelTransport`] wires an
//! explainee/recommender pair in-process for tests and embedded use.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use negotiation_core::Envelope;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The peer end of the transport is gone.
    #[error("transport channel closed")]
    Closed,
}

#[async_trait]
pub trait Transport: Send {
    /// Hand a message to the wire. The machine does not wait for any
    /// acknowledgment.
    async fn send(&self, envelope: Envelope) -> Result<(), TransportError>;

    /// Block until the next message, or until `timeout` elapses
    /// (`Ok(None)`).
    async fn receive(&mut self, timeout: Option<Duration>)
        -> Result<Option<Envelope>, TransportError>;
}

/// One end of an in-memory duplex link.
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<Envelope>,
    rx: mpsc::UnboundedReceiver<Envelope>,
}

/// Build two cross-wired transports: what one end sends, the other
/// receives.
pub fn channel_pair() -> (ChannelTransport, ChannelTransport) {
    let (a_tx, a_rx) = mpsc::unbounded_channel();
    let (b_tx, b_rx) = mpsc::unbounded_channel();
    (
        ChannelTransport { tx: a_tx, rx: b_rx },
        ChannelTransport { tx: b_tx, rx: a_rx },
    )
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, envelope: Envelope) -> Result<(), TransportError> {
        self.tx.send(envelope).map_err(|_| TransportError::Closed)
    }

    async fn receive(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<Option<Envelope>, TransportError> {
        match timeout {
            Some(limit) => match tokio::time::timeout(limit, self.rx.recv()).await {
                Err(_elapsed) => Ok(None),
                Ok(Some(envelope)) => Ok(Some(envelope)),
                Ok(None) => Err(TransportError::Closed),
            },
            None => match self.rx.recv().await {
                Some(envelope) => Ok(Some(envelope)),
                None => Err(TransportError::Closed),
            },
        }
    }
}
