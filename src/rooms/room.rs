use std::collections::HashMap;

use crate::protocol::ServerEvent;

use super::{SessionHandle, SessionId};

/// Members of one room. Delivery pushes straight into each member's outbound
/// queue, so an event is never dropped while the member stays connected.
#[derive(Default)]
pub(super) struct Room {
    members: HashMap<SessionId, SessionHandle>,
}

impl Room {
    pub(super) fn join(&mut self, session: &SessionHandle) -> bool {
        if self.members.contains_key(&session.id()) {
            return false;
        }
        self.members.insert(session.id(), session.clone());
        true
    }

    pub(super) fn leave(&mut self, session: SessionId) -> bool {
        self.members.remove(&session).is_some()
    }

    pub(super) fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub(super) fn members(&self) -> impl Iterator<Item = SessionId> + '_ {
        self.members.keys().copied()
    }

    /// Returns how many members the event was queued for.
    pub(super) fn broadcast(
        &self,
        room_id: &str,
        event: &ServerEvent,
        exclude: Option<SessionId>,
    ) -> usize {
        let mut reached = 0;
        for (id, session) in &self.members {
            if exclude == Some(*id) {
                continue;
            }
            if session.send(event.clone()) {
                reached += 1;
            } else {
                tracing::debug!(room_id, session_id = %id, "session already gone, skipped");
            }
        }
        reached
    }
}
