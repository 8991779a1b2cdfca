//! Shared fixtures for the Rendezvous benchmarks.

use rendezvous_core::{Hub, HubConfig, Outbound, SessionHandle};
use rendezvous_protocol::Envelope;
use rendezvous_transport::SessionId;
use tokio::sync::mpsc;

/// A registered session's id and the receiving end of its outbound queue.
pub struct BenchPeer {
    pub id: SessionId,
    pub rx: mpsc::Receiver<Envelope>,
}

impl BenchPeer {
    /// Discard everything queued so far, returning how many envelopes there were.
    pub fn drain(&mut self) -> usize {
        let mut n = 0;
        while self.rx.try_recv().is_ok() {
            n += 1;
        }
        n
    }
}

/// Create a session handle with the given outbound capacity.
pub fn session(id: impl Into<SessionId>, capacity: usize) -> (SessionHandle, BenchPeer) {
    let id = id.into();
    let (outbound, rx) = Outbound::channel(capacity);
    (
        SessionHandle::new(id.clone(), outbound),
        BenchPeer { id, rx },
    )
}

/// Build a hub with `size` sessions in one room, with join notices drained.
///
/// The hub is driven synchronously; its event queue is never polled. Queues
/// smaller than the room overflow during setup, which only bumps the hub's
/// drop counter.
pub fn populated_hub(room: &str, size: usize, capacity: usize) -> (Hub, Vec<BenchPeer>) {
    let (mut hub, _handle) = Hub::new(HubConfig::default());
    let mut peers = Vec::with_capacity(size);

    for i in 0..size {
        let (handle, peer) = session(format!("peer-{}", i), capacity);
        hub.register(handle, room.to_string(), format!("user-{}", i));
        peers.push(peer);
    }
    for peer in &mut peers {
        peer.drain();
    }

    (hub, peers)
}
