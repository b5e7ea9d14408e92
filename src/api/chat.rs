use axum::{
    Json, debug_handler,
    extract::{Path, State},
};

use crate::{AppResult, db::ChatMessage, store::Store};

#[debug_handler(state = crate::AppState)]
pub(crate) async fn chat_messages(
    Path(room): Path<String>,
    State(store): State<Store>,
) -> AppResult<Json<Vec<ChatMessage>>> {
    Ok(Json(store.chat_history(&room).await?))
}
