//! The connection hub.
//!
//! The hub owns the [`Registry`] and applies events strictly one at a time
//! on a single task. Sessions talk to it through a cloneable [`HubHandle`];
//! nothing else ever touches registry state, so no locking is needed.
//!
//! The event queue is bounded. When it is full, submitting an event waits,
//! which slows down only the session whose reader is producing it. Delivery
//! from the hub to sessions goes through each session's bounded
//! [`Outbound`](crate::session::Outbound) queue without waiting, so a slow
//! peer loses messages instead of stalling routing for everyone else.

use rendezvous_protocol::{Envelope, PeerInfo};
use rendezvous_transport::SessionId;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

use crate::registry::Registry;
use crate::session::{SendError, Session, SessionHandle, DEFAULT_OUTBOUND_CAPACITY};

/// Hub errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HubError {
    /// The hub task is no longer running.
    #[error("Hub has stopped")]
    Stopped,
}

/// Hub configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubConfig {
    /// Capacity of the event queue into the hub.
    pub queue_capacity: usize,
    /// Capacity of each session's outbound queue.
    pub outbound_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
        }
    }
}

/// Hub statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStats {
    /// Number of joined sessions.
    pub session_count: usize,
    /// Number of non-empty rooms.
    pub room_count: usize,
    /// Envelopes handed to session outbound queues.
    pub delivered: u64,
    /// Routed messages that matched no recipient or room.
    pub dropped_routes: u64,
    /// Envelopes dropped because a session's outbound queue was full.
    pub outbound_drops: u64,
}

/// Where a routed message went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Delivered to the named recipient.
    Direct,
    /// Broadcast to this many room members.
    Broadcast(usize),
    /// No matching target.
    Dropped,
}

/// An event for the hub's serial loop.
#[derive(Debug)]
pub enum HubEvent {
    /// Add a session to a room and run peer discovery.
    Register {
        handle: SessionHandle,
        room: String,
        username: String,
    },
    /// Remove a session and notify its room.
    Unregister { id: SessionId },
    /// Deliver a peer signal on behalf of `sender`.
    Route { sender: SessionId, envelope: Envelope },
    /// Report statistics.
    Stats(oneshot::Sender<HubStats>),
    /// Report the members of a room.
    RoomMembers {
        room: String,
        reply: oneshot::Sender<Option<Vec<SessionId>>>,
    },
}

/// Cloneable handle for submitting events to the hub.
#[derive(Debug, Clone)]
pub struct HubHandle {
    tx: mpsc::Sender<HubEvent>,
    config: HubConfig,
}

impl HubHandle {
    /// Get the hub configuration.
    #[must_use]
    pub fn config(&self) -> HubConfig {
        self.config
    }

    /// Submit an event, waiting for queue space.
    ///
    /// # Errors
    ///
    /// Returns an error if the hub has stopped.
    pub async fn submit(&self, event: HubEvent) -> Result<(), HubError> {
        self.tx.send(event).await.map_err(|_| HubError::Stopped)
    }

    /// Register a session in a room.
    ///
    /// # Errors
    ///
    /// Returns an error if the hub has stopped.
    pub async fn register(
        &self,
        handle: SessionHandle,
        room: impl Into<String>,
        username: impl Into<String>,
    ) -> Result<(), HubError> {
        self.submit(HubEvent::Register {
            handle,
            room: room.into(),
            username: username.into(),
        })
        .await
    }

    /// Unregister a session.
    ///
    /// # Errors
    ///
    /// Returns an error if the hub has stopped.
    pub async fn unregister(&self, id: SessionId) -> Result<(), HubError> {
        self.submit(HubEvent::Unregister { id }).await
    }

    /// Route a peer signal.
    ///
    /// # Errors
    ///
    /// Returns an error if the hub has stopped.
    pub async fn route(&self, sender: SessionId, envelope: Envelope) -> Result<(), HubError> {
        self.submit(HubEvent::Route { sender, envelope }).await
    }

    /// Get hub statistics.
    ///
    /// The answer reflects every event submitted before this call.
    ///
    /// # Errors
    ///
    /// Returns an error if the hub has stopped.
    pub async fn stats(&self) -> Result<HubStats, HubError> {
        let (reply, rx) = oneshot::channel();
        self.submit(HubEvent::Stats(reply)).await?;
        rx.await.map_err(|_| HubError::Stopped)
    }

    /// Get the member ids of a room, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the hub has stopped.
    pub async fn room_members(
        &self,
        room: impl Into<String>,
    ) -> Result<Option<Vec<SessionId>>, HubError> {
        let (reply, rx) = oneshot::channel();
        self.submit(HubEvent::RoomMembers {
            room: room.into(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| HubError::Stopped)
    }
}

#[derive(Debug, Default)]
struct Counters {
    delivered: u64,
    dropped_routes: u64,
    outbound_drops: u64,
}

/// Queue an envelope for one session, counting the outcome.
fn deliver(counters: &mut Counters, target: &Session, envelope: Envelope) -> bool {
    let kind = envelope.kind();
    match target.outbound().send(envelope) {
        Ok(()) => {
            counters.delivered += 1;
            true
        }
        Err(SendError::Full) => {
            counters.outbound_drops += 1;
            warn!(session = %target.id(), kind = %kind, "Outbound queue full, dropping message");
            false
        }
        Err(SendError::Closed) => {
            debug!(session = %target.id(), kind = %kind, "Session writer gone, dropping message");
            false
        }
    }
}

/// The hub: registry owner and serial event loop.
pub struct Hub {
    registry: Registry,
    counters: Counters,
    events: mpsc::Receiver<HubEvent>,
}

impl Hub {
    /// Create a hub and a handle to it. The hub does nothing until
    /// [`Hub::run`] is polled.
    #[must_use]
    pub fn new(config: HubConfig) -> (Self, HubHandle) {
        let (tx, events) = mpsc::channel(config.queue_capacity.max(1));
        info!("Creating hub with config: {:?}", config);

        let hub = Self {
            registry: Registry::new(),
            counters: Counters::default(),
            events,
        };
        (hub, HubHandle { tx, config })
    }

    /// Create a hub and run it on a new task.
    #[must_use]
    pub fn spawn(config: HubConfig) -> HubHandle {
        let (hub, handle) = Self::new(config);
        tokio::spawn(hub.run());
        handle
    }

    /// Process events until every handle has been dropped.
    pub async fn run(mut self) {
        while let Some(event) = self.events.recv().await {
            self.apply(event);
        }
        info!("Hub stopped");
    }

    /// Get the registry.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Get hub statistics.
    #[must_use]
    pub fn stats(&self) -> HubStats {
        HubStats {
            session_count: self.registry.session_count(),
            room_count: self.registry.room_count(),
            delivered: self.counters.delivered,
            dropped_routes: self.counters.dropped_routes,
            outbound_drops: self.counters.outbound_drops,
        }
    }

    /// Apply one event.
    pub fn apply(&mut self, event: HubEvent) {
        match event {
            HubEvent::Register {
                handle,
                room,
                username,
            } => self.register(handle, room, username),
            HubEvent::Unregister { id } => self.unregister(&id),
            HubEvent::Route { sender, envelope } => {
                self.route(&sender, envelope);
            }
            HubEvent::Stats(reply) => {
                let _ = reply.send(self.stats());
            }
            HubEvent::RoomMembers { room, reply } => {
                let _ = reply.send(self.registry.room_members(&room));
            }
        }

        debug_assert_eq!(self.registry.verify(), Ok(()));
    }

    /// Add a session to a room, then tell it who is there and tell them
    /// about it.
    pub fn register(&mut self, handle: SessionHandle, room: String, username: String) {
        if self.registry.get(handle.id.as_str()).is_some() {
            warn!(session = %handle.id, "Session registered twice, moving it");
            self.unregister(&handle.id);
        }

        let session = handle.join(room, username);
        let id = session.id().clone();
        let room = session.room().to_string();
        self.registry.insert(session.clone());

        info!(session = %id, room = %room, username = %session.username(), "Session joined");

        let peers: Vec<PeerInfo> = self
            .registry
            .members(&room)
            .filter(|member| member.id() != &id)
            .map(Session::peer_info)
            .collect();
        deliver(
            &mut self.counters,
            &session,
            Envelope::room_joined(room.as_str(), peers),
        );

        let notice = Envelope::new_peer(session.peer_info());
        for member in self.registry.members(&room) {
            if member.id() != &id {
                deliver(&mut self.counters, member, notice.clone());
            }
        }
    }

    /// Remove a session and tell the rest of its room. Unknown ids are
    /// ignored.
    pub fn unregister(&mut self, id: &SessionId) {
        let Some(departure) = self.registry.remove(id.as_str()) else {
            trace!(session = %id, "Unregister for unknown session");
            return;
        };

        let room = departure.session.room();
        if departure.room_closed {
            info!(session = %id, room = %room, "Session left, room closed");
            return;
        }

        info!(session = %id, room = %room, "Session left");
        let notice = Envelope::peer_left(id.as_str());
        for member in self.registry.members(room) {
            deliver(&mut self.counters, member, notice.clone());
        }
    }

    /// Deliver a peer signal. The sender field is always overwritten with
    /// `sender`.
    ///
    /// A set recipient means directed delivery only; if that session is gone
    /// the message is dropped. Otherwise a set room means broadcast to all
    /// members except the sender.
    pub fn route(&mut self, sender: &SessionId, envelope: Envelope) -> RouteOutcome {
        let envelope = envelope.with_sender(sender.as_str());

        let Some(relay) = envelope.signal.relay() else {
            debug!(session = %sender, kind = %envelope.kind(), "Not a routable message");
            self.counters.dropped_routes += 1;
            return RouteOutcome::Dropped;
        };

        if let Some(recipient) = relay.recipient.as_deref() {
            return match self.registry.get(recipient) {
                Some(target) => {
                    trace!(session = %sender, recipient = %recipient, kind = %envelope.kind(), "Direct");
                    deliver(&mut self.counters, target, envelope);
                    RouteOutcome::Direct
                }
                None => {
                    debug!(session = %sender, recipient = %recipient, "Recipient gone, dropping");
                    self.counters.dropped_routes += 1;
                    RouteOutcome::Dropped
                }
            };
        }

        if let Some(room) = relay.room.clone() {
            if self.registry.contains_room(&room) {
                let mut count = 0;
                for member in self.registry.members(&room) {
                    if member.id() != sender {
                        deliver(&mut self.counters, member, envelope.clone());
                        count += 1;
                    }
                }
                trace!(session = %sender, room = %room, recipients = count, "Broadcast");
                return RouteOutcome::Broadcast(count);
            }
        }

        debug!(session = %sender, kind = %envelope.kind(), "No route, dropping");
        self.counters.dropped_routes += 1;
        RouteOutcome::Dropped
    }
}
