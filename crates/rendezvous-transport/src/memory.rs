//! In-process transport backed by tokio channels.
//!
//! Useful for driving sessions without a network: the [`MemoryPeer`] plays
//! the remote client, pushing inbound envelopes and observing what the
//! relay sends back.

use async_trait::async_trait;
use rendezvous_protocol::Envelope;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::traits::{SignalReader, SignalWriter, TransportError};

type Inbound = Result<Envelope, TransportError>;

/// Create a connected reader/writer pair and the remote end driving it.
#[must_use]
pub fn pair() -> (MemoryReader, MemoryWriter, MemoryPeer) {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let open = Arc::new(AtomicBool::new(true));

    (
        MemoryReader { rx: inbound_rx },
        MemoryWriter {
            tx: outbound_tx,
            open: open.clone(),
        },
        MemoryPeer {
            inbound: Some(inbound_tx),
            outbound: outbound_rx,
            open,
        },
    )
}

/// Inbound half of an in-memory connection.
pub struct MemoryReader {
    rx: mpsc::UnboundedReceiver<Inbound>,
}

#[async_trait]
impl SignalReader for MemoryReader {
    async fn recv(&mut self) -> Result<Option<Envelope>, TransportError> {
        match self.rx.recv().await {
            Some(Ok(envelope)) => Ok(Some(envelope)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    fn remote_addr(&self) -> Option<String> {
        Some("memory".to_string())
    }
}

/// Outbound half of an in-memory connection.
pub struct MemoryWriter {
    tx: mpsc::UnboundedSender<Envelope>,
    open: Arc<AtomicBool>,
}

#[async_trait]
impl SignalWriter for MemoryWriter {
    async fn send(&mut self, envelope: Envelope) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::ConnectionClosed);
        }
        self.tx
            .send(envelope)
            .map_err(|_| TransportError::ConnectionClosed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

/// The remote end of an in-memory connection.
pub struct MemoryPeer {
    inbound: Option<mpsc::UnboundedSender<Inbound>>,
    outbound: mpsc::UnboundedReceiver<Envelope>,
    open: Arc<AtomicBool>,
}

impl MemoryPeer {
    /// Deliver an envelope to the relay side.
    ///
    /// Returns `false` if the connection is already hung up.
    pub fn send(&self, envelope: Envelope) -> bool {
        self.push(Ok(envelope))
    }

    /// Deliver a read error to the relay side.
    pub fn fail(&self, error: TransportError) -> bool {
        self.push(Err(error))
    }

    fn push(&self, item: Inbound) -> bool {
        self.inbound
            .as_ref()
            .map(|tx| tx.send(item).is_ok())
            .unwrap_or(false)
    }

    /// Drop the inbound stream, as if the socket went away.
    pub fn hang_up(&mut self) {
        self.inbound = None;
    }

    /// Wait for the next envelope sent by the relay.
    ///
    /// Returns `None` once the relay side dropped its writer.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.outbound.recv().await
    }

    /// Take the next envelope sent by the relay, if one is queued.
    pub fn try_recv(&mut self) -> Option<Envelope> {
        self.outbound.try_recv().ok()
    }

    /// Whether the relay side closed the connection.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        !self.open.load(Ordering::SeqCst)
    }
}
