//! Per-session message loop.
//!
//! Each connected peer gets two tasks: the read loop below, which turns
//! inbound envelopes into hub events, and an outbound pump draining the
//! session's queue into its transport writer. Leaving and disconnecting
//! take the same exit path, so every session ends with exactly one
//! unregister.

use rendezvous_protocol::{Envelope, Signal};
use rendezvous_transport::{SessionId, SignalReader, SignalWriter};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::hub::HubHandle;
use crate::session::{Outbound, SessionHandle, SessionState};

/// The hub-facing side of one connected session.
pub struct Connection {
    handle: SessionHandle,
    hub: HubHandle,
    state: SessionState,
}

impl Connection {
    /// Open a session with a fresh id and queue its `init` greeting.
    ///
    /// Returns the connection and the receiver to drain into the transport.
    #[must_use]
    pub fn open(hub: HubHandle) -> (Self, mpsc::Receiver<Envelope>) {
        let id = SessionId::generate();
        let (outbound, rx) = Outbound::channel(hub.config().outbound_capacity);

        // The queue is empty, so the greeting always fits
        if outbound.send(Envelope::init(id.as_str())).is_err() {
            warn!(session = %id, "Failed to queue init message");
        }

        let connection = Self {
            handle: SessionHandle::new(id, outbound),
            hub,
            state: SessionState::Connected,
        };
        (connection, rx)
    }

    /// Get the session ID.
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.handle.id
    }

    /// Get the current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Apply one inbound envelope.
    ///
    /// Returns `false` when the session should end.
    pub async fn handle(&mut self, envelope: Envelope) -> bool {
        let kind = envelope.kind();
        if kind.is_server_originated() {
            debug!(session = %self.id(), kind = %kind, "Ignoring server-only message");
            return true;
        }
        if kind.is_relay() {
            trace!(session = %self.id(), kind = %kind, "Relaying");
            return self.hub.route(self.id().clone(), envelope).await.is_ok();
        }

        match envelope.signal {
            Signal::Join { room, username } => {
                if self.state != SessionState::Connected {
                    debug!(session = %self.id(), room = %room, "Already joined, ignoring join");
                    return true;
                }
                if self
                    .hub
                    .register(self.handle.clone(), room, username)
                    .await
                    .is_err()
                {
                    return false;
                }
                self.state = SessionState::Joined;
                true
            }
            Signal::Leave => {
                debug!(session = %self.id(), "Leave requested");
                false
            }
            _ => true,
        }
    }

    /// Read envelopes until the peer leaves or the transport fails, then
    /// unregister.
    pub async fn run<R: SignalReader>(mut self, mut reader: R) -> SessionState {
        loop {
            let envelope = match reader.recv().await {
                Ok(Some(envelope)) => envelope,
                Ok(None) => {
                    debug!(session = %self.id(), "Connection closed by peer");
                    break;
                }
                Err(e) if e.is_recoverable() => {
                    debug!(session = %self.id(), error = %e, "Ignoring malformed message");
                    continue;
                }
                Err(e) => {
                    debug!(session = %self.id(), error = %e, "Read failed");
                    break;
                }
            };

            if !self.handle(envelope).await {
                break;
            }
        }

        self.close().await
    }

    async fn close(&mut self) -> SessionState {
        if let Err(e) = self.hub.unregister(self.id().clone()).await {
            warn!(session = %self.id(), error = %e, "Failed to unregister");
        }
        self.state = SessionState::Closed;
        self.state
    }
}

/// Drain a session's outbound queue into its transport, then close it.
///
/// Ends when every [`Outbound`] clone is gone or the transport refuses a
/// write.
pub async fn pump<W: SignalWriter>(id: SessionId, mut rx: mpsc::Receiver<Envelope>, mut writer: W) {
    while let Some(envelope) = rx.recv().await {
        if let Err(e) = writer.send(envelope).await {
            debug!(session = %id, error = %e, "Write failed");
            break;
        }
    }
    rx.close();

    if let Err(e) = writer.close().await {
        debug!(session = %id, error = %e, "Close failed");
    }
    trace!(session = %id, "Outbound pump finished");
}

/// Serve one transport session to completion.
///
/// Sends `init`, runs the read loop, and returns once the session has been
/// unregistered and its transport closed.
pub async fn serve<R, W>(reader: R, writer: W, hub: HubHandle) -> SessionId
where
    R: SignalReader,
    W: SignalWriter + 'static,
{
    let (connection, rx) = Connection::open(hub);
    let id = connection.id().clone();

    info!(session = %id, remote = ?reader.remote_addr(), "Session connected");

    let writer_task = tokio::spawn(pump(id.clone(), rx, writer));
    connection.run(reader).await;

    if let Err(e) = writer_task.await {
        warn!(session = %id, error = %e, "Outbound pump panicked");
    }

    info!(session = %id, "Session closed");
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::{Hub, HubConfig};
    use rendezvous_protocol::{PeerInfo, ProtocolError, Relay};
    use rendezvous_transport::memory::{self, MemoryPeer};
    use rendezvous_transport::TransportError;
    use serde_json::json;
    use std::time::Duration;
    use tokio::task::JoinHandle;

    /// Connect a fake client and return it with its id.
    async fn connect(hub: &HubHandle) -> (MemoryPeer, SessionId, JoinHandle<SessionId>) {
        let (reader, writer, mut peer) = memory::pair();
        let task = tokio::spawn(serve(reader, writer, hub.clone()));

        let init = peer.recv().await.unwrap();
        let Signal::Init { client_id } = &init.signal else {
            panic!("Expected init, got {:?}", init);
        };
        (peer, SessionId::from(client_id.as_str()), task)
    }

    async fn recv(peer: &mut MemoryPeer) -> Envelope {
        tokio::time::timeout(Duration::from_secs(5), peer.recv())
            .await
            .expect("timed out")
            .expect("connection closed")
    }

    #[tokio::test]
    async fn test_join_and_relay() {
        let hub = Hub::spawn(HubConfig::default());

        let (mut alice, alice_id, _) = connect(&hub).await;
        alice.send(Envelope::join("R", "Alice"));
        assert_eq!(recv(&mut alice).await, Envelope::room_joined("R", vec![]));

        let (mut bob, bob_id, _) = connect(&hub).await;
        bob.send(Envelope::join("R", "Bob"));
        assert_eq!(
            recv(&mut bob).await,
            Envelope::room_joined("R", vec![PeerInfo::new(alice_id.as_str(), "Alice")])
        );
        assert_eq!(
            recv(&mut alice).await,
            Envelope::new_peer(PeerInfo::new(bob_id.as_str(), "Bob"))
        );

        let sdp = json!({ "type": "offer", "sdp": "v=0" });
        alice.send(
            Envelope::offer(Relay::to_peer(bob_id.as_str(), sdp.clone())).with_sender(bob_id.as_str()),
        );

        let offer = recv(&mut bob).await;
        assert_eq!(offer.sender, alice_id.as_str());
        assert_eq!(offer.signal.relay().unwrap().data, Some(sdp));
    }

    #[tokio::test]
    async fn test_disconnect_notifies_room() {
        let hub = Hub::spawn(HubConfig::default());

        let (mut alice, alice_id, alice_task) = connect(&hub).await;
        alice.send(Envelope::join("R", "Alice"));
        recv(&mut alice).await;

        let (mut bob, bob_id, _) = connect(&hub).await;
        bob.send(Envelope::join("R", "Bob"));
        recv(&mut bob).await;

        alice.hang_up();
        assert_eq!(alice_task.await.unwrap(), alice_id);
        assert!(alice.is_closed());

        assert_eq!(recv(&mut bob).await, Envelope::peer_left(alice_id.as_str()));
        assert_eq!(hub.room_members("R").await.unwrap(), Some(vec![bob_id]));
    }

    #[tokio::test]
    async fn test_leave_closes_session() {
        let hub = Hub::spawn(HubConfig::default());

        let (mut alice, alice_id, alice_task) = connect(&hub).await;
        alice.send(Envelope::join("R", "Alice"));
        recv(&mut alice).await;

        alice.send(Envelope::leave());
        assert_eq!(alice_task.await.unwrap(), alice_id);

        // Writer dropped and closed once the hub released the session
        assert_eq!(alice.recv().await, None);
        assert!(alice.is_closed());
        assert_eq!(hub.room_members("R").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_read_error_before_join() {
        let hub = Hub::spawn(HubConfig::default());

        let (alice, alice_id, alice_task) = connect(&hub).await;
        alice.fail(TransportError::ReceiveFailed("reset".into()));

        assert_eq!(alice_task.await.unwrap(), alice_id);
        let stats = hub.stats().await.unwrap();
        assert_eq!(stats.session_count, 0);
    }

    #[tokio::test]
    async fn test_malformed_and_unknown_are_ignored() {
        let hub = Hub::spawn(HubConfig::default());

        let (mut alice, _, _) = connect(&hub).await;
        alice.fail(TransportError::Protocol(ProtocolError::UnknownKind("chat".into())));
        alice.fail(TransportError::Protocol(ProtocolError::MissingField {
            kind: rendezvous_protocol::MessageKind::Join,
            field: "room",
        }));
        alice.send(Envelope::peer_left("spoof"));
        alice.send(Envelope::join("R", "Alice"));

        assert_eq!(recv(&mut alice).await, Envelope::room_joined("R", vec![]));
    }

    #[tokio::test]
    async fn test_second_join_is_ignored() {
        let hub = Hub::spawn(HubConfig::default());

        let (mut alice, alice_id, _) = connect(&hub).await;
        alice.send(Envelope::join("A", "Alice"));
        recv(&mut alice).await;
        alice.send(Envelope::join("B", "Alice"));

        // A relay to ourselves is processed after the second join
        alice.send(Envelope::answer(Relay::to_peer(alice_id.as_str(), json!({}))));
        assert_eq!(recv(&mut alice).await.kind(), rendezvous_protocol::MessageKind::Answer);

        assert_eq!(hub.room_members("A").await.unwrap(), Some(vec![alice_id]));
        assert_eq!(hub.room_members("B").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_handle_classifies_kinds() {
        use rendezvous_protocol::MessageKind;

        let hub = Hub::spawn(HubConfig::default());
        let (mut connection, mut rx) = Connection::open(hub.clone());
        rx.recv().await;
        assert!(connection.handle(Envelope::join("R", "Alice")).await);

        let me = connection.id().as_str().to_string();
        for envelope in [
            Envelope::init("x"),
            Envelope::room_joined("R", vec![]),
            Envelope::new_peer(PeerInfo::new("x", "X")),
            Envelope::peer_left(me.as_str()),
        ] {
            assert!(connection.handle(envelope).await);
            assert_eq!(connection.state(), SessionState::Joined);
        }
        for envelope in [
            Envelope::offer(Relay::to_peer(me.as_str(), json!(1))),
            Envelope::answer(Relay::to_peer(me.as_str(), json!(2))),
            Envelope::ice_candidate(Relay::to_peer(me.as_str(), json!(3))),
        ] {
            assert!(connection.handle(envelope).await);
        }

        // Server-only kinds never reach the router
        let stats = hub.stats().await.unwrap();
        assert_eq!(stats.dropped_routes, 0);

        assert_eq!(rx.try_recv().unwrap().kind(), MessageKind::RoomJoined);
        for kind in [MessageKind::Offer, MessageKind::Answer, MessageKind::IceCandidate] {
            let received = rx.try_recv().unwrap();
            assert_eq!(received.kind(), kind);
            assert_eq!(received.sender, me);
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_state_machine() {
        let (hub_task, hub) = Hub::new(HubConfig::default());
        tokio::spawn(hub_task.run());

        let (mut connection, mut rx) = Connection::open(hub.clone());
        assert_eq!(connection.state(), SessionState::Connected);
        assert_eq!(
            rx.recv().await,
            Some(Envelope::init(connection.id().as_str()))
        );

        assert!(connection.handle(Envelope::offer(Relay::default())).await);
        assert_eq!(connection.state(), SessionState::Connected);

        assert!(connection.handle(Envelope::join("R", "Alice")).await);
        assert_eq!(connection.state(), SessionState::Joined);

        assert!(!connection.handle(Envelope::leave()).await);

        let (reader, _writer, mut peer) = memory::pair();
        peer.hang_up();
        assert_eq!(connection.run(reader).await, SessionState::Closed);
        assert_eq!(hub.stats().await.unwrap().session_count, 0);
    }
}
