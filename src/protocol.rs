use serde::{Deserialize, Deserializer, Serialize};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::{
    AppError, AppResult,
    appresult::ErrorKind,
    db::{ChatMessage, Day, LngLat, Marker},
};

const MAX_ID_LEN: usize = 128;
const MAX_NAME_LEN: usize = 256;
const MAX_MESSAGE_LEN: usize = 4000;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "join-room")]
    JoinRoom(String),
    #[serde(rename = "leave-room")]
    LeaveRoom(String),
    #[serde(rename = "new-marker")]
    NewMarker(NewMarkerRequest),
    #[serde(rename = "delete-marker")]
    DeleteMarker(DeleteMarkerRequest),
    #[serde(rename = "sendMessage")]
    SendMessage(ChatMessage),
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::JoinRoom(_) => "join-room",
            ClientEvent::LeaveRoom(_) => "leave-room",
            ClientEvent::NewMarker(_) => "new-marker",
            ClientEvent::DeleteMarker(_) => "delete-marker",
            ClientEvent::SendMessage(_) => "sendMessage",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMarkerRequest {
    pub lng_lat: LngLat,
    #[serde(deserialize_with = "id_string")]
    pub user_id: String,
    #[serde(deserialize_with = "id_string")]
    pub route_id: String,
    pub room: String,
    #[serde(default)]
    pub place_name: String,
    #[serde(default)]
    pub day: Day,
    #[serde(default)]
    pub time: String,
    /// Left unchanged when absent.
    #[serde(default)]
    pub route_name: Option<String>,
}

impl NewMarkerRequest {
    pub fn validate(&self) -> AppResult<()> {
        require_id("userId", &self.user_id)?;
        require_id("routeId", &self.route_id)?;
        require_id("room", &self.room)?;
        self.lng_lat.validate()?;
        limit_len("placeName", &self.place_name, MAX_NAME_LEN)?;
        limit_len("time", &self.time, MAX_ID_LEN)?;
        if let Some(route_name) = &self.route_name {
            limit_len("routeName", route_name, MAX_NAME_LEN)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteMarkerRequest {
    pub room: String,
    #[serde(default)]
    pub marker_id: Option<String>,
    #[serde(default)]
    pub lng_lat: Option<LngLat>,
    #[serde(default)]
    pub day: Option<Day>,
}

impl DeleteMarkerRequest {
    pub fn validate(&self) -> AppResult<()> {
        require_id("room", &self.room)?;
        match (&self.marker_id, &self.lng_lat) {
            (Some(marker_id), _) => require_id("markerId", marker_id),
            (None, Some(lng_lat)) => lng_lat.validate(),
            (None, None) => Err(AppError::validation("either markerId or lngLat is required")),
        }
    }
}

pub fn validate_chat_message(message: &ChatMessage) -> AppResult<()> {
    require_id("room", &message.room)?;
    require_id("user", &message.user)?;
    if message.message.trim().is_empty() {
        return Err(AppError::validation("message is empty"));
    }
    limit_len("message", &message.message, MAX_MESSAGE_LEN)?;
    OffsetDateTime::parse(&message.timestamp, &Rfc3339)
        .map_err(|e| AppError::validation(format!("timestamp {:?}: {e}", message.timestamp)))?;
    Ok(())
}

pub fn require_id(field: &str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::validation(format!("{field} is empty")));
    }
    if value.chars().any(char::is_control) {
        return Err(AppError::validation(format!("{field} contains control characters")));
    }
    limit_len(field, value, MAX_ID_LEN)
}

fn limit_len(field: &str, value: &str, max: usize) -> AppResult<()> {
    if value.chars().count() > max {
        return Err(AppError::validation(format!("{field} is longer than {max} characters")));
    }
    Ok(())
}

/// Ids arrive as strings or, from older clients, as bare numbers.
fn id_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(text) => text,
        Raw::Number(number) => number.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "new-marker")]
    NewMarker(MarkerAdded),
    #[serde(rename = "delete-marker")]
    MarkerDeleted(MarkerRemoved),
    #[serde(rename = "receiveMessage")]
    ChatMessageReceived(ChatMessage),
    #[serde(rename = "error")]
    Error(ErrorAck),
}

impl ServerEvent {
    pub fn marker_added(route_id: &str, marker: Marker) -> Self {
        ServerEvent::NewMarker(MarkerAdded {
            lng_lat: marker.lng_lat,
            marker_id: marker.id,
            route_id: route_id.to_owned(),
            day: marker.day,
            place_name: marker.place_name,
            time: marker.time,
        })
    }

    pub fn marker_removed(route_id: &str, marker: Marker) -> Self {
        ServerEvent::MarkerDeleted(MarkerRemoved {
            lng_lat: marker.lng_lat,
            marker_id: marker.id,
            route_id: route_id.to_owned(),
            day: marker.day,
        })
    }

    pub fn error(event: &str, err: &AppError) -> Self {
        ServerEvent::Error(ErrorAck {
            event: event.to_owned(),
            kind: err.kind(),
            message: err.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerAdded {
    pub lng_lat: LngLat,
    pub marker_id: String,
    pub route_id: String,
    pub day: Day,
    pub place_name: String,
    pub time: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerRemoved {
    pub lng_lat: LngLat,
    pub marker_id: String,
    pub route_id: String,
    pub day: Day,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorAck {
    /// Name of the client event that failed, or `unknown` for unreadable frames.
    pub event: String,
    pub kind: ErrorKind,
    pub message: String,
}
