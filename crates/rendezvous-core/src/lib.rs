//! # rendezvous-core
//!
//! Connection hub, room registry, and session loop for the Rendezvous
//! signaling relay.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **Hub** - Serial executor owning all session and room state
//! - **Registry** - Sessions by id and room membership
//! - **Session** - Per-peer handle with a non-blocking outbound queue
//! - **Connection** - Read loop turning inbound envelopes into hub events
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐  events   ┌─────────────┐          ┌─────────────┐
//! │ Connection  │──────────▶│     Hub     │─────────▶│  Registry   │
//! └─────────────┘ (bounded) └─────────────┘          └─────────────┘
//!        ▲                         │ try_send
//!        │                         ▼
//! ┌─────────────┐           ┌─────────────┐
//! │   Reader    │           │  Outbound   │──▶ pump ──▶ Writer
//! └─────────────┘           └─────────────┘
//! ```

pub mod connection;
pub mod hub;
pub mod registry;
pub mod session;

pub use connection::{pump, serve, Connection};
pub use hub::{Hub, HubConfig, HubError, HubEvent, HubHandle, HubStats, RouteOutcome};
pub use registry::{Departure, Registry, RegistryError};
pub use session::{Outbound, SendError, Session, SessionHandle, SessionState};
