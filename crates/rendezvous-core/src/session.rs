//! Session handles for Rendezvous.
//!
//! A session is one connected peer. Before joining it is just an id and an
//! [`Outbound`] queue ([`SessionHandle`]); once the hub registers it, it also
//! carries its room and display name ([`Session`]), fixed for its lifetime.

use rendezvous_protocol::{Envelope, PeerInfo};
use rendezvous_transport::SessionId;
use thiserror::Error;
use tokio::sync::mpsc;

/// Default outbound queue capacity per session.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 256;

/// Errors when queueing a message for a session.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// The session's outbound queue is full; the message was dropped.
    #[error("Outbound queue full")]
    Full,

    /// The session's transport is gone.
    #[error("Session closed")]
    Closed,
}

/// Non-blocking send capability towards one session's transport.
///
/// Sends never wait: a full queue drops the message so that a slow peer
/// cannot stall whoever is sending to it.
#[derive(Debug, Clone)]
pub struct Outbound {
    tx: mpsc::Sender<Envelope>,
}

impl Outbound {
    /// Create an outbound queue with the given capacity.
    ///
    /// The receiver is drained by the session's writer.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Queue an envelope for delivery.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue is full or the writer has gone away.
    pub fn send(&self, envelope: Envelope) -> Result<(), SendError> {
        self.tx.try_send(envelope).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::Full,
            mpsc::error::TrySendError::Closed(_) => SendError::Closed,
        })
    }

    /// Check if the writer has gone away.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A connected session that has not joined a room yet.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    /// Session identifier.
    pub id: SessionId,
    /// Send capability.
    pub outbound: Outbound,
}

impl SessionHandle {
    /// Create a new handle.
    #[must_use]
    pub fn new(id: SessionId, outbound: Outbound) -> Self {
        Self { id, outbound }
    }

    /// Assign room and display name.
    #[must_use]
    pub fn join(self, room: impl Into<String>, username: impl Into<String>) -> Session {
        Session {
            id: self.id,
            room: room.into(),
            username: username.into(),
            outbound: self.outbound,
        }
    }
}

/// A session that joined a room.
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    room: String,
    username: String,
    outbound: Outbound,
}

impl Session {
    /// Get the session ID.
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Get the room name.
    #[must_use]
    pub fn room(&self) -> &str {
        &self.room
    }

    /// Get the display name.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Get the send capability.
    #[must_use]
    pub fn outbound(&self) -> &Outbound {
        &self.outbound
    }

    /// Describe this session for presence notifications.
    #[must_use]
    pub fn peer_info(&self) -> PeerInfo {
        PeerInfo::new(self.id.as_str(), self.username.as_str())
    }
}

/// Lifecycle of a session's read loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport open, not in a room.
    Connected,
    /// Room and display name assigned.
    Joined,
    /// Terminal.
    Closed,
}
