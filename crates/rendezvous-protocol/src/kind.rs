//! Message kind identifiers.
//!
//! The kind strings are the wire contract shared with browser clients and
//! must not change.

use std::fmt;

use crate::codec::ProtocolError;

/// The nine message kinds understood by the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Init,
    Join,
    Offer,
    Answer,
    IceCandidate,
    Leave,
    RoomJoined,
    NewPeer,
    PeerLeft,
}

impl MessageKind {
    /// All kinds, in wire-table order.
    pub const ALL: [MessageKind; 9] = [
        MessageKind::Init,
        MessageKind::Join,
        MessageKind::Offer,
        MessageKind::Answer,
        MessageKind::IceCandidate,
        MessageKind::Leave,
        MessageKind::RoomJoined,
        MessageKind::NewPeer,
        MessageKind::PeerLeft,
    ];

    /// The wire name of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            MessageKind::Init => "init",
            MessageKind::Join => "join",
            MessageKind::Offer => "offer",
            MessageKind::Answer => "answer",
            MessageKind::IceCandidate => "ice-candidate",
            MessageKind::Leave => "leave",
            MessageKind::RoomJoined => "room-joined",
            MessageKind::NewPeer => "new-peer",
            MessageKind::PeerLeft => "peer-left",
        }
    }

    /// Whether only the server may originate this kind.
    #[must_use]
    pub const fn is_server_originated(self) -> bool {
        matches!(
            self,
            MessageKind::Init
                | MessageKind::RoomJoined
                | MessageKind::NewPeer
                | MessageKind::PeerLeft
        )
    }

    /// Whether this kind is relayed between peers (offer/answer/candidate).
    #[must_use]
    pub const fn is_relay(self) -> bool {
        matches!(
            self,
            MessageKind::Offer | MessageKind::Answer | MessageKind::IceCandidate
        )
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for MessageKind {
    type Error = ProtocolError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        MessageKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value)
            .ok_or_else(|| ProtocolError::UnknownKind(value.to_string()))
    }
}
