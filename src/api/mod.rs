mod chat;
mod paths;

use axum::{Router, routing::get};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/user-paths/{user_id}", get(paths::user_paths).post(paths::create_route))
        .route("/markers/latest/{user_id}/{route_id}", get(paths::latest_markers))
        .route("/chat-messages/{room}", get(chat::chat_messages))
}
