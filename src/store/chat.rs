use sqlx::SqlitePool;

use crate::{AppResult, db::ChatMessage};

use super::Store;

impl Store {
    /// Appends to the room's thread, creating the thread on first use.
    pub async fn append_chat_message(&self, message: &ChatMessage) -> AppResult<()> {
        self.bounded(append_chat_message(&self.pool, message)).await
    }

    pub async fn chat_history(&self, room_id: &str) -> AppResult<Vec<ChatMessage>> {
        self.bounded(chat_history(&self.pool, room_id)).await
    }
}

async fn append_chat_message(db_pool: &SqlitePool, message: &ChatMessage) -> AppResult<()> {
    let mut tx = db_pool.begin().await?;

    sqlx::query("INSERT INTO chat_threads (room_id) VALUES (?) ON CONFLICT (room_id) DO NOTHING")
        .bind(&message.room)
        .execute(&mut *tx)
        .await?;

    sqlx::query("INSERT INTO chat_messages (room_id,author,body,timestamp) VALUES (?,?,?,?)")
        .bind(&message.room)
        .bind(&message.user)
        .bind(&message.message)
        .bind(&message.timestamp)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

async fn chat_history(db_pool: &SqlitePool, room_id: &str) -> AppResult<Vec<ChatMessage>> {
    let rows: Vec<(String, String, String)> = sqlx::query_as(
        "SELECT author,body,timestamp FROM chat_messages WHERE room_id=? ORDER BY seq",
    )
    .bind(room_id)
    .fetch_all(db_pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(user, message, timestamp)| ChatMessage {
            room: room_id.to_owned(),
            user,
            message,
            timestamp,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(room: &str, body: &str) -> ChatMessage {
        ChatMessage {
            room: room.to_owned(),
            user: "u1".to_owned(),
            message: body.to_owned(),
            timestamp: "2024-05-01T09:00:00.000Z".to_owned(),
        }
    }

    #[tokio::test]
    async fn history_is_per_room_in_append_order() {
        let store = Store::in_memory().await.unwrap();

        store.append_chat_message(&msg("r1", "hello")).await.unwrap();
        store.append_chat_message(&msg("r2", "elsewhere")).await.unwrap();
        store.append_chat_message(&msg("r1", "bring water")).await.unwrap();

        let bodies: Vec<String> = store
            .chat_history("r1")
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.message)
            .collect();
        assert_eq!(bodies, vec!["hello", "bring water"]);
    }

    #[tokio::test]
    async fn unknown_room_has_empty_history() {
        let store = Store::in_memory().await.unwrap();
        assert!(store.chat_history("nobody-here").await.unwrap().is_empty());
    }
}
