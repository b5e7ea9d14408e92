mod chat;
mod markers;
mod ws;

use crate::{
    AppResult,
    appresult::ErrorKind,
    protocol::{ClientEvent, ServerEvent},
    rooms::{RoomRegistry, SessionHandle},
    store::Store,
};

pub use ws::sync_ws;

#[derive(Clone)]
pub struct SyncService {
    store: Store,
    rooms: RoomRegistry,
}

impl SyncService {
    pub fn new(store: Store, rooms: RoomRegistry) -> Self {
        Self { store, rooms }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    pub async fn handle(&self, session: &SessionHandle, event: ClientEvent) -> AppResult<()> {
        match event {
            ClientEvent::JoinRoom(room_id) => self.join_room(session, &room_id).await,
            ClientEvent::LeaveRoom(room_id) => self.leave_room(session, &room_id).await,
            ClientEvent::NewMarker(req) => self.add_marker(req).await,
            ClientEvent::DeleteMarker(req) => self.delete_marker(req).await,
            ClientEvent::SendMessage(message) => self.send_chat_message(message).await,
        }
    }

    /// Like [`SyncService::handle`], but reports a failure back to `session`
    /// as an `error` event instead of returning it.
    pub async fn dispatch(&self, session: &SessionHandle, event: ClientEvent) {
        let name = event.name();
        let Err(err) = self.handle(session, event).await else {
            return;
        };

        match err.kind() {
            ErrorKind::Persistence => {
                tracing::error!(session_id = %session.id(), event = name, "{err}")
            }
            ErrorKind::NotFound | ErrorKind::Validation => {
                tracing::warn!(session_id = %session.id(), event = name, "dropped: {err}")
            }
        }
        session.send(ServerEvent::error(name, &err));
    }

    pub async fn join_room(&self, session: &SessionHandle, room_id: &str) -> AppResult<()> {
        crate::protocol::require_id("room", room_id)?;
        if self.rooms.join(session, room_id).await {
            tracing::info!(session_id = %session.id(), room_id, "joined room");
        }
        Ok(())
    }

    pub async fn leave_room(&self, session: &SessionHandle, room_id: &str) -> AppResult<()> {
        if self.rooms.leave(session.id(), room_id).await {
            tracing::info!(session_id = %session.id(), room_id, "left room");
        }
        Ok(())
    }

    pub async fn disconnect(&self, session: &SessionHandle) {
        let left = self.rooms.leave_all(session.id()).await;
        tracing::debug!(session_id = %session.id(), rooms = left, "memberships cleared");
    }
}
