use crate::{
    AppResult,
    db::ChatMessage,
    protocol::{ServerEvent, validate_chat_message},
};

use super::SyncService;

impl SyncService {
    pub async fn send_chat_message(&self, message: ChatMessage) -> AppResult<()> {
        validate_chat_message(&message)?;

        let _turn = self.rooms.turn(&message.room).await;
        self.store.append_chat_message(&message).await?;

        tracing::debug!(room_id = %message.room, user = %message.user, "chat message stored");
        let room = message.room.clone();
        self.rooms
            .broadcast(&room, ServerEvent::ChatMessageReceived(message), None)
            .await;
        Ok(())
    }
}
