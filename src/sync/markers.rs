use crate::{
    AppError, AppResult,
    db::Day,
    protocol::{DeleteMarkerRequest, NewMarkerRequest, ServerEvent},
    store::{MarkerSelector, NewMarker},
};

use super::SyncService;

impl SyncService {
    /// Rooms are scoped by route, so the room of a marker is its route id.
    pub async fn add_marker(&self, req: NewMarkerRequest) -> AppResult<()> {
        req.validate()?;
        if req.room != req.route_id {
            return Err(AppError::validation(format!(
                "room {} does not belong to route {}",
                req.room, req.route_id
            )));
        }

        let NewMarkerRequest {
            lng_lat,
            user_id,
            route_id,
            room,
            place_name,
            day,
            time,
            route_name,
        } = req;

        let _turn = self.rooms.turn(&room).await;
        let marker = self
            .store
            .append_marker(
                &user_id,
                &route_id,
                route_name.as_deref(),
                NewMarker {
                    lng_lat,
                    place_name,
                    day,
                    time,
                },
            )
            .await?;

        tracing::info!(
            user_id = %user_id,
            route_id = %route_id,
            marker_id = %marker.id,
            day = %marker.day,
            "marker added"
        );
        self.rooms
            .broadcast(&room, ServerEvent::marker_added(&route_id, marker), None)
            .await;
        Ok(())
    }

    /// Removes one marker of the room's route, by id or else by exact position.
    pub async fn delete_marker(&self, req: DeleteMarkerRequest) -> AppResult<()> {
        req.validate()?;

        let DeleteMarkerRequest {
            room,
            marker_id,
            lng_lat,
            day,
        } = req;

        let selector = match (marker_id, lng_lat) {
            (Some(marker_id), _) => MarkerSelector::Id(marker_id),
            (None, Some(lng_lat)) => MarkerSelector::At {
                day: day.unwrap_or(Day::FIRST),
                lng_lat,
            },
            (None, None) => {
                return Err(AppError::validation("either markerId or lngLat is required"));
            }
        };

        let route_id = &room;
        let _turn = self.rooms.turn(&room).await;
        let marker = self.store.remove_marker(route_id, selector).await?;

        tracing::info!(route_id = %route_id, marker_id = %marker.id, "marker deleted");
        self.rooms
            .broadcast(&room, ServerEvent::marker_removed(route_id, marker), None)
            .await;
        Ok(())
    }
}
