//! # rendezvous-protocol
//!
//! Wire protocol definitions for the Rendezvous signaling relay.
//!
//! Peers exchange JSON envelopes keyed by a `type` field. This crate defines
//! the nine message kinds, the typed [`Signal`] they decode into, and the
//! codec used by transports.
//!
//! ## Message Kinds
//!
//! - `init` - Server greeting with the assigned session id
//! - `join` / `leave` - Room membership
//! - `offer` / `answer` / `ice-candidate` - Relayed between peers
//! - `room-joined` / `new-peer` / `peer-left` - Presence notifications
//!
//! ## Example
//!
//! ```rust
//! use rendezvous_protocol::{codec, Envelope, Signal};
//!
//! let envelope = codec::decode(br#"{"type":"join","data":{"room":"lobby"}}"#).unwrap();
//! assert!(matches!(envelope.signal, Signal::Join { .. }));
//!
//! let text = codec::encode(&Envelope::init("abc")).unwrap();
//! assert!(text.contains("clientId"));
//! ```

pub mod codec;
pub mod envelope;
pub mod kind;

pub use codec::{decode, encode, EnvelopeCodec, ProtocolError, MAX_ENVELOPE_SIZE};
pub use envelope::{Envelope, PeerInfo, RawEnvelope, Relay, Signal, DEFAULT_USERNAME};
pub use kind::MessageKind;
