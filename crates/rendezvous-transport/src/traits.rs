//! Transport abstraction traits for Rendezvous.
//!
//! A connected peer is seen by the relay as two halves: a [`SignalReader`]
//! owned by the session's read loop and a [`SignalWriter`] owned by its
//! outbound pump. Splitting them lets notifications go out while the read
//! loop is parked waiting for the next inbound message.

use async_trait::async_trait;
use rendezvous_protocol::{Envelope, ProtocolError};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for a session.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generate a fresh random session ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::borrow::Borrow<str> for SessionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Failed to send data.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to receive data.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// The peer sent something that is not a valid envelope.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl TransportError {
    /// Whether the connection is still usable after this error.
    ///
    /// Only malformed messages are recoverable; everything else means the
    /// peer is gone.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, TransportError::Protocol(_))
    }
}

/// The inbound half of a session's transport.
#[async_trait]
pub trait SignalReader: Send {
    /// Receive the next envelope.
    ///
    /// Returns `Ok(None)` when the peer closed the connection. A
    /// [`TransportError::Protocol`] error means one message was unreadable
    /// and the connection remains open; any other error is terminal.
    async fn recv(&mut self) -> Result<Option<Envelope>, TransportError>;

    /// Get the remote address of the connection, if available.
    fn remote_addr(&self) -> Option<String> {
        None
    }
}

/// The outbound half of a session's transport.
#[async_trait]
pub trait SignalWriter: Send {
    /// Send an envelope to the peer.
    async fn send(&mut self, envelope: Envelope) -> Result<(), TransportError>;

    /// Close the connection. Closing twice is a no-op.
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Check if the connection is still open.
    fn is_open(&self) -> bool;
}
