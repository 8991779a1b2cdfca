//! # rendezvous-transport
//!
//! Transport abstraction layer for the Rendezvous signaling relay.
//!
//! The relay core never sees sockets. It works with a [`SignalReader`] and a
//! [`SignalWriter`] per session:
//!
//! - **WebSocket** - axum upgraded sockets (`websocket` feature)
//! - **Memory** - in-process channels, for embedding and tests
//!
//! ```rust,ignore
//! use rendezvous_transport::SignalReader;
//!
//! async fn drain(mut reader: impl SignalReader) {
//!     while let Ok(Some(envelope)) = reader.recv().await {
//!         // Process envelope
//!     }
//! }
//! ```

pub mod memory;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod ws;

pub use traits::{SessionId, SignalReader, SignalWriter, TransportError};

#[cfg(feature = "websocket")]
pub use ws::{WebSocketReader, WebSocketWriter};
