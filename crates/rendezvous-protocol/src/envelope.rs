//! Envelope and signal types for the Rendezvous protocol.
//!
//! An [`Envelope`] is the unit exchanged between peers and the relay. On the
//! wire it is a flat JSON object keyed by `type`; in memory the kind and its
//! payload are a single [`Signal`] variant so routing is a total match.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::codec::ProtocolError;
use crate::kind::MessageKind;

/// Display name used when a `join` carries none.
pub const DEFAULT_USERNAME: &str = "Anonymous";

/// Identity and display name of a room member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    /// Session identifier.
    pub id: String,
    /// Display name chosen at join time.
    pub username: String,
}

impl PeerInfo {
    /// Create a new peer description.
    #[must_use]
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
        }
    }
}

/// Routing fields and opaque payload of a peer-to-peer signal.
///
/// The relay reads `recipient` and `room`; everything else is carried
/// through untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Relay {
    /// Directed delivery target.
    pub recipient: Option<String>,
    /// Room broadcast target, used when no recipient is set.
    pub room: Option<String>,
    /// Display name, if the client chose to include one.
    pub username: Option<String>,
    /// Opaque payload (SDP, ICE candidate, ...).
    pub data: Option<Value>,
}

impl Relay {
    /// A relay addressed to a single peer.
    #[must_use]
    pub fn to_peer(recipient: impl Into<String>, data: Value) -> Self {
        Self {
            recipient: Some(recipient.into()),
            data: Some(data),
            ..Default::default()
        }
    }

    /// A relay broadcast to a room.
    #[must_use]
    pub fn to_room(room: impl Into<String>, data: Value) -> Self {
        Self {
            room: Some(room.into()),
            data: Some(data),
            ..Default::default()
        }
    }
}

/// A decoded message, one variant per [`MessageKind`].
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    /// Server greeting carrying the session's freshly assigned id.
    Init { client_id: String },
    /// Request to join a room.
    Join { room: String, username: String },
    /// Session description offer.
    Offer(Relay),
    /// Session description answer.
    Answer(Relay),
    /// Network candidate descriptor.
    IceCandidate(Relay),
    /// Explicit departure.
    Leave,
    /// Join confirmation listing the other members of the room.
    RoomJoined { room: String, peers: Vec<PeerInfo> },
    /// A new member entered the room.
    NewPeer(PeerInfo),
    /// The sender left the room.
    PeerLeft,
}

impl Signal {
    /// Get the message kind.
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        match self {
            Signal::Init { .. } => MessageKind::Init,
            Signal::Join { .. } => MessageKind::Join,
            Signal::Offer(_) => MessageKind::Offer,
            Signal::Answer(_) => MessageKind::Answer,
            Signal::IceCandidate(_) => MessageKind::IceCandidate,
            Signal::Leave => MessageKind::Leave,
            Signal::RoomJoined { .. } => MessageKind::RoomJoined,
            Signal::NewPeer(_) => MessageKind::NewPeer,
            Signal::PeerLeft => MessageKind::PeerLeft,
        }
    }

    /// Routing fields, for the relayed kinds.
    #[must_use]
    pub fn relay(&self) -> Option<&Relay> {
        match self {
            Signal::Offer(relay) | Signal::Answer(relay) | Signal::IceCandidate(relay) => {
                Some(relay)
            }
            _ => None,
        }
    }
}

/// A protocol message: who sent it and what it says.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "RawEnvelope", try_from = "RawEnvelope")]
pub struct Envelope {
    /// Originating session id. Empty for server notifications without a
    /// subject, and always overwritten by the relay for client messages.
    pub sender: String,
    /// Kind and payload.
    pub signal: Signal,
}

impl Envelope {
    /// Create an envelope with no sender.
    #[must_use]
    pub fn new(signal: Signal) -> Self {
        Self {
            sender: String::new(),
            signal,
        }
    }

    /// Replace the sender.
    #[must_use]
    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = sender.into();
        self
    }

    /// Get the message kind.
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        self.signal.kind()
    }

    /// Create an `init` greeting.
    #[must_use]
    pub fn init(client_id: impl Into<String>) -> Self {
        Self::new(Signal::Init {
            client_id: client_id.into(),
        })
    }

    /// Create a `join` request.
    #[must_use]
    pub fn join(room: impl Into<String>, username: impl Into<String>) -> Self {
        Self::new(Signal::Join {
            room: room.into(),
            username: username.into(),
        })
    }

    /// Create a `leave` request.
    #[must_use]
    pub fn leave() -> Self {
        Self::new(Signal::Leave)
    }

    /// Create an `offer`.
    #[must_use]
    pub fn offer(relay: Relay) -> Self {
        Self::new(Signal::Offer(relay))
    }

    /// Create an `answer`.
    #[must_use]
    pub fn answer(relay: Relay) -> Self {
        Self::new(Signal::Answer(relay))
    }

    /// Create an `ice-candidate`.
    #[must_use]
    pub fn ice_candidate(relay: Relay) -> Self {
        Self::new(Signal::IceCandidate(relay))
    }

    /// Create a `room-joined` confirmation.
    #[must_use]
    pub fn room_joined(room: impl Into<String>, peers: Vec<PeerInfo>) -> Self {
        Self::new(Signal::RoomJoined {
            room: room.into(),
            peers,
        })
    }

    /// Create a `new-peer` notification; the sender is the newcomer.
    #[must_use]
    pub fn new_peer(peer: PeerInfo) -> Self {
        let sender = peer.id.clone();
        Self::new(Signal::NewPeer(peer)).with_sender(sender)
    }

    /// Create a `peer-left` notification naming the departed session.
    #[must_use]
    pub fn peer_left(id: impl Into<String>) -> Self {
        Self::new(Signal::PeerLeft).with_sender(id)
    }
}

/// The flat wire shape of an envelope.
///
/// Optional fields are kept as raw JSON so a wrongly typed field is read as
/// absent instead of failing the whole message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawEnvelope {
    /// Message kind name.
    #[serde(rename = "type")]
    pub kind: String,
    /// Originating session id.
    #[serde(default)]
    pub sender: Option<Value>,
    /// Directed delivery target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<Value>,
    /// Room name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<Value>,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<Value>,
    /// Kind-specific payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Deserialize)]
struct InitData {
    #[serde(rename = "clientId")]
    client_id: String,
}

#[derive(Deserialize)]
struct RoomJoinedData {
    room: String,
    #[serde(default)]
    peers: Vec<PeerInfo>,
}

/// The string content of an optional field, if it is a string.
fn string_field(value: Option<&Value>) -> Option<String> {
    value.and_then(Value::as_str).map(str::to_string)
}

fn non_empty(value: Option<&Value>) -> Option<String> {
    string_field(value).filter(|s| !s.is_empty())
}

fn data_as<T: serde::de::DeserializeOwned>(
    kind: MessageKind,
    data: Option<Value>,
) -> Result<T, ProtocolError> {
    let data = data.ok_or(ProtocolError::MissingField {
        kind,
        field: "data",
    })?;
    serde_json::from_value(data).map_err(|e| ProtocolError::InvalidField {
        kind,
        field: "data",
        reason: e.to_string(),
    })
}

fn parse_join(raw: RawEnvelope) -> Result<Signal, ProtocolError> {
    let data = raw.data.as_ref().and_then(Value::as_object);

    // A room inside `data` wins; the top-level field is only a fallback
    let room = match data.and_then(|d| d.get("room")) {
        Some(Value::String(room)) => room.clone(),
        Some(other) => {
            return Err(ProtocolError::InvalidField {
                kind: MessageKind::Join,
                field: "room",
                reason: format!("expected a string, got {}", other),
            })
        }
        None => non_empty(raw.room.as_ref()).ok_or(ProtocolError::MissingField {
            kind: MessageKind::Join,
            field: "room",
        })?,
    };

    let username = string_field(data.and_then(|d| d.get("username")))
        .or_else(|| string_field(raw.username.as_ref()))
        .unwrap_or_else(|| DEFAULT_USERNAME.to_string());

    Ok(Signal::Join { room, username })
}

fn relay_from(raw: RawEnvelope) -> Relay {
    Relay {
        recipient: non_empty(raw.recipient.as_ref()),
        room: non_empty(raw.room.as_ref()),
        username: string_field(raw.username.as_ref()),
        data: raw.data,
    }
}

impl TryFrom<RawEnvelope> for Envelope {
    type Error = ProtocolError;

    fn try_from(raw: RawEnvelope) -> Result<Self, Self::Error> {
        let kind = MessageKind::try_from(raw.kind.as_str())?;
        // Client senders are overwritten by the relay, so a bad one is dropped
        let sender = string_field(raw.sender.as_ref()).unwrap_or_default();

        let signal = match kind {
            MessageKind::Init => {
                let init: InitData = data_as(kind, raw.data)?;
                Signal::Init {
                    client_id: init.client_id,
                }
            }
            MessageKind::Join => parse_join(raw)?,
            MessageKind::Offer => Signal::Offer(relay_from(raw)),
            MessageKind::Answer => Signal::Answer(relay_from(raw)),
            MessageKind::IceCandidate => Signal::IceCandidate(relay_from(raw)),
            MessageKind::Leave => Signal::Leave,
            MessageKind::RoomJoined => {
                let joined: RoomJoinedData = data_as(kind, raw.data)?;
                Signal::RoomJoined {
                    room: joined.room,
                    peers: joined.peers,
                }
            }
            MessageKind::NewPeer => Signal::NewPeer(data_as(kind, raw.data)?),
            MessageKind::PeerLeft => Signal::PeerLeft,
        };

        Ok(Envelope { sender, signal })
    }
}

impl From<Envelope> for RawEnvelope {
    fn from(envelope: Envelope) -> Self {
        let mut raw = RawEnvelope {
            kind: envelope.kind().as_str().to_string(),
            sender: Some(Value::String(envelope.sender)),
            ..Default::default()
        };

        match envelope.signal {
            Signal::Init { client_id } => {
                raw.data = Some(json!({ "clientId": client_id }));
            }
            Signal::Join { room, username } => {
                raw.data = Some(json!({ "room": room, "username": username }));
            }
            Signal::Offer(relay) | Signal::Answer(relay) | Signal::IceCandidate(relay) => {
                raw.recipient = relay.recipient.map(Value::String);
                raw.room = relay.room.map(Value::String);
                raw.username = relay.username.map(Value::String);
                raw.data = relay.data;
            }
            Signal::RoomJoined { room, peers } => {
                raw.data = Some(json!({ "room": room, "peers": peers }));
            }
            Signal::NewPeer(peer) => {
                raw.data = Some(json!({ "id": peer.id, "username": peer.username }));
            }
            Signal::Leave | Signal::PeerLeft => {}
        }

        raw
    }
}
