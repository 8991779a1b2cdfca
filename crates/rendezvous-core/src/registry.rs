//! Session and room registry.
//!
//! Two maps kept consistent as a pair: sessions by id, and room name to
//! member ids. Every member id is a registered session, rooms are never
//! empty, and a session sits in exactly one room. The registry is owned
//! by the hub and never shared.

use rendezvous_transport::SessionId;
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;
use tracing::debug;

use crate::session::Session;

/// Registry consistency violations. These indicate a bug in the hub.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A room lists a member that is not registered.
    #[error("Room {room} lists unknown session {session}")]
    DanglingMember { room: String, session: SessionId },

    /// A room with no members was left behind.
    #[error("Room {0} is empty")]
    EmptyRoom(String),

    /// A registered session is missing from the room it claims.
    #[error("Session {session} is not a member of its room {room}")]
    MissingMembership { room: String, session: SessionId },

    /// A session is listed in more than one room.
    #[error("Session {0} is a member of several rooms")]
    MultipleRooms(SessionId),
}

/// A session removed from the registry.
#[derive(Debug)]
pub struct Departure {
    /// The removed session.
    pub session: Session,
    /// Whether its room became empty and was deleted.
    pub room_closed: bool,
}

/// Authoritative session and room state.
#[derive(Debug, Default)]
pub struct Registry {
    /// Sessions indexed by id.
    sessions: HashMap<SessionId, Session>,
    /// Room name -> member ids, ordered for deterministic iteration.
    rooms: HashMap<String, BTreeSet<SessionId>>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a session into its room, creating the room if needed.
    ///
    /// If the id was already registered the old entry is removed first and
    /// returned, so a session never sits in two rooms.
    pub fn insert(&mut self, session: Session) -> Option<Departure> {
        let previous = self.remove(session.id().as_str());

        let room = session.room().to_string();
        let members = self.rooms.entry(room).or_insert_with(|| {
            debug!(room = %session.room(), "Creating room");
            BTreeSet::new()
        });
        members.insert(session.id().clone());
        self.sessions.insert(session.id().clone(), session);

        previous
    }

    /// Remove a session, pruning its room if it became empty.
    ///
    /// Returns `None` if the session was not registered.
    pub fn remove(&mut self, id: &str) -> Option<Departure> {
        let session = self.sessions.remove(id)?;

        let mut room_closed = false;
        if let Some(members) = self.rooms.get_mut(session.room()) {
            members.remove(id);
            if members.is_empty() {
                self.rooms.remove(session.room());
                room_closed = true;
                debug!(room = %session.room(), "Deleted empty room");
            }
        }

        Some(Departure {
            session,
            room_closed,
        })
    }

    /// Look up a session.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Session> {
        self.sessions.get(id)
    }

    /// Iterate over the members of a room, in id order.
    pub fn members<'a>(&'a self, room: &str) -> impl Iterator<Item = &'a Session> + 'a {
        self.rooms
            .get(room)
            .into_iter()
            .flatten()
            .filter_map(move |id| self.sessions.get(id))
    }

    /// Get the member ids of a room, if it exists.
    #[must_use]
    pub fn room_members(&self, room: &str) -> Option<Vec<SessionId>> {
        self.rooms
            .get(room)
            .map(|members| members.iter().cloned().collect())
    }

    /// Check if a room exists.
    #[must_use]
    pub fn contains_room(&self, room: &str) -> bool {
        self.rooms.contains_key(room)
    }

    /// Get the number of registered sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Get the number of rooms.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Check the registry invariants.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn verify(&self) -> Result<(), RegistryError> {
        let mut seen: HashMap<&SessionId, &str> = HashMap::new();

        for (room, members) in &self.rooms {
            if members.is_empty() {
                return Err(RegistryError::EmptyRoom(room.clone()));
            }
            for id in members {
                if !self.sessions.contains_key(id) {
                    return Err(RegistryError::DanglingMember {
                        room: room.clone(),
                        session: id.clone(),
                    });
                }
                if seen.insert(id, room).is_some() {
                    return Err(RegistryError::MultipleRooms(id.clone()));
                }
            }
        }

        for (id, session) in &self.sessions {
            if seen.get(id).copied() != Some(session.room()) {
                return Err(RegistryError::MissingMembership {
                    room: session.room().to_string(),
                    session: id.clone(),
                });
            }
        }

        Ok(())
    }
}
