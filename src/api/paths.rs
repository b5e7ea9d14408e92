use axum::{
    Json, debug_handler,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::{
    AppResult,
    db::{Day, Marker, Permissions, UserRouteCollection},
    protocol::require_id,
    store::{NewRoute, Store},
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateRouteBody {
    name: String,
    #[serde(default)]
    permissions: Permissions,
    #[serde(default)]
    route_id: Option<String>,
}

/// Flat marker shape of the read path: map clients place it from `lng` and `lat`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LatestMarker {
    marker_id: String,
    lng: f64,
    lat: f64,
    place_name: String,
    day: Day,
    time: String,
}

impl From<Marker> for LatestMarker {
    fn from(marker: Marker) -> Self {
        Self {
            marker_id: marker.id,
            lng: marker.lng_lat.lng,
            lat: marker.lng_lat.lat,
            place_name: marker.place_name,
            day: marker.day,
            time: marker.time,
        }
    }
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn user_paths(
    Path(user_id): Path<String>,
    State(store): State<Store>,
) -> AppResult<Json<UserRouteCollection>> {
    require_id("userId", &user_id)?;
    Ok(Json(store.collection(&user_id).await?))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn create_route(
    Path(user_id): Path<String>,
    State(store): State<Store>,
    Json(CreateRouteBody { name, permissions, route_id }): Json<CreateRouteBody>,
) -> AppResult<Response> {
    require_id("userId", &user_id)?;
    require_id("name", &name)?;
    if let Some(route_id) = &route_id {
        require_id("routeId", route_id)?;
    }

    let route = store
        .create_route(&user_id, NewRoute { route_id, name, permissions })
        .await?;

    Ok((StatusCode::CREATED, Json(route)).into_response())
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn latest_markers(
    Path((user_id, route_id)): Path<(String, String)>,
    State(store): State<Store>,
) -> AppResult<Json<Vec<LatestMarker>>> {
    let markers = store.markers_for(&user_id, &route_id).await?;
    Ok(Json(markers.into_iter().map(LatestMarker::from).collect()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{AppError, db::LngLat, store::NewMarker};

    fn new_route(route_id: &str) -> NewRoute {
        NewRoute {
            route_id: Some(route_id.to_owned()),
            name: "mine".to_owned(),
            permissions: Permissions::Private,
        }
    }

    #[tokio::test]
    async fn created_route_shows_up_in_the_collection() {
        let store = Store::in_memory().await.unwrap();

        let response = create_route(
            Path("u1".to_owned()),
            State(store.clone()),
            Json(CreateRouteBody {
                name: "Kyoto loop".to_owned(),
                permissions: Permissions::Friends,
                route_id: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let Json(collection) = user_paths(Path("u1".to_owned()), State(store)).await.unwrap();
        assert_eq!(collection.paths.len(), 1);
        assert_eq!(collection.paths[0].route_name, "Kyoto loop");
        assert_eq!(collection.paths[0].permissions, Permissions::Friends);
    }

    #[tokio::test]
    async fn markers_of_someone_elses_route_are_not_found() {
        let store = Store::in_memory().await.unwrap();
        store.create_route("u1", new_route("r1")).await.unwrap();

        let err = latest_markers(Path(("u2".to_owned(), "r1".to_owned())), State(store))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn latest_markers_carry_flat_coordinates() {
        let store = Store::in_memory().await.unwrap();
        store.create_route("u1", new_route("r1")).await.unwrap();
        let marker = store
            .append_marker(
                "u1",
                "r1",
                None,
                NewMarker {
                    lng_lat: LngLat { lng: 121.5, lat: 25.2 },
                    place_name: "Taipei 101".to_owned(),
                    day: Day::FIRST,
                    time: "09:00".to_owned(),
                },
            )
            .await
            .unwrap();

        let Json(latest) = latest_markers(Path(("u1".to_owned(), "r1".to_owned())), State(store))
            .await
            .unwrap();
        assert_eq!(
            serde_json::to_value(&latest).unwrap(),
            json!([{
                "markerId": marker.id,
                "lng": 121.5,
                "lat": 25.2,
                "placeName": "Taipei 101",
                "day": 1,
                "time": "09:00"
            }])
        );
    }

    #[tokio::test]
    async fn taken_route_id_is_a_conflict() {
        let store = Store::in_memory().await.unwrap();
        store.create_route("u1", new_route("r1")).await.unwrap();

        let err = create_route(
            Path("u2".to_owned()),
            State(store),
            Json(CreateRouteBody {
                name: "copycat".to_owned(),
                permissions: Permissions::Public,
                route_id: Some("r1".to_owned()),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }
}
