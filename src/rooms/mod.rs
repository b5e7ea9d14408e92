mod room;

use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::Arc,
};

use tokio::sync::{Mutex, OwnedMutexGuard, mpsc};
use uuid::Uuid;

use crate::protocol::ServerEvent;

use room::Room;

pub type RoomId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Sending half of one live connection.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    outbound: mpsc::UnboundedSender<ServerEvent>,
}

impl SessionHandle {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ServerEvent>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        let session = Self {
            id: SessionId(Uuid::now_v7()),
            outbound,
        };
        (session, rx)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Queues `event` for this session only. False once the connection is gone.
    pub fn send(&self, event: ServerEvent) -> bool {
        self.outbound.send(event).is_ok()
    }
}

#[derive(Default)]
struct Rooms {
    rooms: HashMap<RoomId, Room>,
    memberships: HashMap<SessionId, HashSet<RoomId>>,
}

#[derive(Clone, Default)]
pub struct RoomRegistry {
    inner: Arc<Mutex<Rooms>>,
    turns: Arc<Mutex<HashMap<RoomId, Arc<Mutex<()>>>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the room's turn for a persist-then-broadcast step.
    ///
    /// Holding the guard across the store write and the broadcast makes
    /// members see a room's events in commit order.
    pub async fn turn(&self, room_id: &str) -> OwnedMutexGuard<()> {
        let turn = {
            let mut turns = self.turns.lock().await;
            turns.retain(|_, turn| Arc::strong_count(turn) > 1);
            turns.entry(room_id.to_owned()).or_default().clone()
        };
        turn.lock_owned().await
    }

    /// Returns false when the session already was a member.
    pub async fn join(&self, session: &SessionHandle, room_id: &str) -> bool {
        let mut inner = self.inner.lock().await;

        let joined = inner.rooms.entry(room_id.to_owned()).or_default().join(session);
        if joined {
            inner
                .memberships
                .entry(session.id())
                .or_default()
                .insert(room_id.to_owned());
        }
        joined
    }

    pub async fn leave(&self, session: SessionId, room_id: &str) -> bool {
        let mut inner = self.inner.lock().await;

        if let Some(rooms) = inner.memberships.get_mut(&session) {
            rooms.remove(room_id);
            if rooms.is_empty() {
                inner.memberships.remove(&session);
            }
        }
        inner.leave_room(session, room_id)
    }

    /// Drops every membership of `session`; returns how many there were.
    pub async fn leave_all(&self, session: SessionId) -> usize {
        let mut inner = self.inner.lock().await;

        let Some(rooms) = inner.memberships.remove(&session) else {
            return 0;
        };
        rooms
            .iter()
            .filter(|room_id| inner.leave_room(session, room_id))
            .count()
    }

    /// Delivers `event` to every member of `room_id` except `exclude`.
    ///
    /// Members observe a room's broadcasts in the order they were issued here.
    /// An empty or unknown room is a no-op. Returns the number of members
    /// the event was queued for.
    pub async fn broadcast(
        &self,
        room_id: &str,
        event: ServerEvent,
        exclude: Option<SessionId>,
    ) -> usize {
        let inner = self.inner.lock().await;

        let Some(room) = inner.rooms.get(room_id) else {
            tracing::debug!(room_id, "no members to receive event");
            return 0;
        };
        room.broadcast(room_id, &event, exclude)
    }

    pub async fn members(&self, room_id: &str) -> Vec<SessionId> {
        let inner = self.inner.lock().await;
        inner
            .rooms
            .get(room_id)
            .map(|room| room.members().collect())
            .unwrap_or_default()
    }

    pub async fn rooms_of(&self, session: SessionId) -> Vec<RoomId> {
        let inner = self.inner.lock().await;
        let mut rooms: Vec<RoomId> = inner
            .memberships
            .get(&session)
            .map(|rooms| rooms.iter().cloned().collect())
            .unwrap_or_default();
        rooms.sort();
        rooms
    }
}

impl Rooms {
    fn leave_room(&mut self, session: SessionId, room_id: &str) -> bool {
        let Some(room) = self.rooms.get_mut(room_id) else {
            return false;
        };
        let left = room.leave(session);
        if room.is_empty() {
            self.rooms.remove(room_id);
        }
        left
    }
}
