use axum::{
    debug_handler,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};

use crate::{
    AppError,
    protocol::{ClientEvent, ServerEvent},
    rooms::SessionHandle,
};

use super::SyncService;

#[debug_handler(state = crate::AppState)]
pub async fn sync_ws(
    State(service): State<SyncService>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |stream| serve_connection(service, stream))
}

async fn serve_connection(service: SyncService, stream: WebSocket) {
    let (session, mut outbound) = SessionHandle::new();
    let session_id = session.id();
    tracing::info!(%session_id, "client connected");

    let (mut sender, mut receiver) = stream.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(event) = outbound.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(%session_id, "could not encode {event:?}: {e}");
                    continue;
                }
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = {
        let service = service.clone();
        let session = session.clone();
        tokio::spawn(async move {
            while let Some(Ok(msg)) = receiver.next().await {
                let parsed = match msg {
                    Message::Text(text) => serde_json::from_str::<ClientEvent>(text.as_str()),
                    Message::Binary(data) => serde_json::from_slice::<ClientEvent>(&data),
                    Message::Close(_) => break,
                    _ => continue,
                };

                let event = match parsed {
                    Ok(event) => event,
                    Err(e) => {
                        let err = AppError::validation(format!("unreadable frame: {e}"));
                        tracing::warn!(%session_id, "{err}");
                        session.send(ServerEvent::error("unknown", &err));
                        continue;
                    }
                };

                // events run one at a time, each in its own task so that a dropped
                // connection cannot cancel a store write halfway through
                let (service, session) = (service.clone(), session.clone());
                let handled =
                    tokio::spawn(async move { service.dispatch(&session, event).await }).await;
                if let Err(e) = handled {
                    tracing::error!(%session_id, "event handler panicked: {e}");
                }
            }
        })
    };

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    };

    service.disconnect(&session).await;
    tracing::info!(%session_id, "client disconnected");
}
