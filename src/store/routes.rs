use std::collections::BTreeMap;

use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::{
    AppError, AppResult,
    db::{Day, LngLat, Marker, Permissions, Route, UserRouteCollection},
};

use super::Store;

#[derive(Debug, Clone)]
pub struct NewRoute {
    /// Generated when absent.
    pub route_id: Option<String>,
    pub name: String,
    pub permissions: Permissions,
}

#[derive(Debug, Clone)]
pub struct NewMarker {
    pub lng_lat: LngLat,
    pub place_name: String,
    pub day: Day,
    pub time: String,
}

/// Which marker of a route a removal targets.
#[derive(Debug, Clone)]
pub enum MarkerSelector {
    Id(String),
    /// The earliest marker of `day` at exactly these coordinates.
    At { day: Day, lng_lat: LngLat },
}

#[derive(sqlx::FromRow)]
struct MarkerRow {
    route_id: String,
    id: String,
    day: i64,
    lng: f64,
    lat: f64,
    place_name: String,
    time: String,
}

impl TryFrom<MarkerRow> for Marker {
    type Error = AppError;

    fn try_from(row: MarkerRow) -> AppResult<Self> {
        let day = u32::try_from(row.day)
            .map_err(|_| AppError::validation(format!("stored day {} is invalid", row.day)))
            .and_then(Day::new)?;

        Ok(Marker {
            id: row.id,
            lng_lat: LngLat { lng: row.lng, lat: row.lat },
            place_name: row.place_name,
            day,
            time: row.time,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RouteRow {
    id: String,
    name: String,
    permissions: String,
}

impl Store {
    /// Persists an empty collection for `user_id` unless one exists.
    pub async fn ensure_collection(&self, user_id: &str) -> AppResult<()> {
        self.bounded(upsert_collection(&self.pool, user_id)).await
    }

    pub async fn create_route(&self, user_id: &str, route: NewRoute) -> AppResult<Route> {
        self.bounded(create_route(&self.pool, user_id, route)).await
    }

    /// Renames the route (when `route_name` is given) and appends `marker` to
    /// its day, in one transaction.
    ///
    /// The user's collection is created first if missing and stays persisted
    /// even when the route turns out not to exist.
    pub async fn append_marker(
        &self,
        user_id: &str,
        route_id: &str,
        route_name: Option<&str>,
        marker: NewMarker,
    ) -> AppResult<Marker> {
        self.bounded(append_marker(&self.pool, user_id, route_id, route_name, marker))
            .await
    }

    pub async fn remove_marker(
        &self,
        route_id: &str,
        selector: MarkerSelector,
    ) -> AppResult<Marker> {
        self.bounded(remove_marker(&self.pool, route_id, selector)).await
    }

    /// Markers of a route owned by `user_id`, ordered by day then append order.
    pub async fn markers_for(&self, user_id: &str, route_id: &str) -> AppResult<Vec<Marker>> {
        self.bounded(markers_for(&self.pool, user_id, route_id)).await
    }

    pub async fn collection(&self, user_id: &str) -> AppResult<UserRouteCollection> {
        self.bounded(collection(&self.pool, user_id)).await
    }
}

async fn upsert_collection(db_pool: &SqlitePool, user_id: &str) -> AppResult<()> {
    let mut conn = db_pool.acquire().await?;
    ensure_collection(&mut conn, user_id).await
}

async fn ensure_collection(conn: &mut SqliteConnection, user_id: &str) -> AppResult<()> {
    let inserted = sqlx::query(
        "INSERT INTO collections (user_id) VALUES (?) ON CONFLICT (user_id) DO NOTHING",
    )
    .bind(user_id)
    .execute(conn)
    .await?
    .rows_affected();

    if inserted > 0 {
        tracing::info!(user_id, "created route collection");
    }
    Ok(())
}

async fn create_route(db_pool: &SqlitePool, user_id: &str, route: NewRoute) -> AppResult<Route> {
    let route_id = route
        .route_id
        .unwrap_or_else(|| Uuid::now_v7().to_string());

    let mut tx = db_pool.begin().await?;
    ensure_collection(&mut tx, user_id).await?;

    let result = sqlx::query("INSERT INTO routes (id,user_id,name,permissions) VALUES (?,?,?,?)")
        .bind(&route_id)
        .bind(user_id)
        .bind(&route.name)
        .bind(route.permissions.as_str())
        .execute(&mut *tx)
        .await;

    match result {
        Ok(_) => {}
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            return Err(AppError::Conflict(format!("route {route_id}")));
        }
        Err(e) => return Err(e.into()),
    }
    tx.commit().await?;

    tracing::info!(user_id, route_id = %route_id, "created route");
    Ok(Route {
        route_id,
        route_name: route.name,
        permissions: route.permissions,
        markers: BTreeMap::new(),
    })
}

async fn append_marker(
    db_pool: &SqlitePool,
    user_id: &str,
    route_id: &str,
    route_name: Option<&str>,
    marker: NewMarker,
) -> AppResult<Marker> {
    upsert_collection(db_pool, user_id).await?;

    let mut tx = db_pool.begin().await?;

    let renamed = sqlx::query("UPDATE routes SET name=COALESCE(?,name) WHERE id=? AND user_id=?")
        .bind(route_name)
        .bind(route_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    if renamed == 0 {
        return Err(AppError::not_found(format!("route {route_id} of user {user_id}")));
    }

    let id = Uuid::now_v7().to_string();
    sqlx::query(
        "INSERT INTO markers (id,route_id,day,lng,lat,place_name,time) VALUES (?,?,?,?,?,?,?)",
    )
    .bind(&id)
    .bind(route_id)
    .bind(i64::from(marker.day.get()))
    .bind(marker.lng_lat.lng)
    .bind(marker.lng_lat.lat)
    .bind(&marker.place_name)
    .bind(&marker.time)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(Marker {
        id,
        lng_lat: marker.lng_lat,
        place_name: marker.place_name,
        day: marker.day,
        time: marker.time,
    })
}

async fn remove_marker(
    db_pool: &SqlitePool,
    route_id: &str,
    selector: MarkerSelector,
) -> AppResult<Marker> {
    let row: Option<MarkerRow> = match &selector {
        MarkerSelector::Id(marker_id) => {
            sqlx::query_as(
                "DELETE FROM markers WHERE id=? AND route_id=? \
                 RETURNING route_id,id,day,lng,lat,place_name,time",
            )
            .bind(marker_id)
            .bind(route_id)
            .fetch_optional(db_pool)
            .await?
        }
        MarkerSelector::At { day, lng_lat } => {
            sqlx::query_as(
                "DELETE FROM markers WHERE seq = ( \
                     SELECT seq FROM markers WHERE route_id=? AND day=? AND lng=? AND lat=? \
                     ORDER BY seq LIMIT 1 \
                 ) RETURNING route_id,id,day,lng,lat,place_name,time",
            )
            .bind(route_id)
            .bind(i64::from(day.get()))
            .bind(lng_lat.lng)
            .bind(lng_lat.lat)
            .fetch_optional(db_pool)
            .await?
        }
    };

    let Some(row) = row else {
        return Err(AppError::not_found(format!("marker {selector:?} on route {route_id}")));
    };
    row.try_into()
}

async fn markers_for(
    db_pool: &SqlitePool,
    user_id: &str,
    route_id: &str,
) -> AppResult<Vec<Marker>> {
    if sqlx::query("SELECT 1 FROM routes WHERE id=? AND user_id=?")
        .bind(route_id)
        .bind(user_id)
        .fetch_optional(db_pool)
        .await?
        .is_none()
    {
        return Err(AppError::not_found(format!("route {route_id} of user {user_id}")));
    }

    sqlx::query_as::<_, MarkerRow>(
        "SELECT route_id,id,day,lng,lat,place_name,time FROM markers \
         WHERE route_id=? ORDER BY day,seq",
    )
    .bind(route_id)
    .fetch_all(db_pool)
    .await?
    .into_iter()
    .map(Marker::try_from)
    .collect()
}

async fn collection(db_pool: &SqlitePool, user_id: &str) -> AppResult<UserRouteCollection> {
    if sqlx::query("SELECT 1 FROM collections WHERE user_id=?")
        .bind(user_id)
        .fetch_optional(db_pool)
        .await?
        .is_none()
    {
        return Err(AppError::not_found(format!("route collection of user {user_id}")));
    }

    let routes: Vec<RouteRow> =
        sqlx::query_as("SELECT id,name,permissions FROM routes WHERE user_id=? ORDER BY seq")
            .bind(user_id)
            .fetch_all(db_pool)
            .await?;

    let markers: Vec<MarkerRow> = sqlx::query_as(
        "SELECT m.route_id,m.id,m.day,m.lng,m.lat,m.place_name,m.time \
         FROM markers m JOIN routes r ON r.id = m.route_id \
         WHERE r.user_id=? ORDER BY m.day,m.seq",
    )
    .bind(user_id)
    .fetch_all(db_pool)
    .await?;

    let mut paths = routes
        .into_iter()
        .map(|row| -> AppResult<Route> {
            Ok(Route {
                route_id: row.id,
                route_name: row.name,
                permissions: row.permissions.parse()?,
                markers: BTreeMap::new(),
            })
        })
        .collect::<AppResult<Vec<_>>>()?;

    for row in markers {
        let Some(route) = paths.iter_mut().find(|route| route.route_id == row.route_id) else {
            continue;
        };
        let marker = Marker::try_from(row)?;
        route.markers.entry(marker.day).or_default().push(marker);
    }

    Ok(UserRouteCollection {
        user_id: user_id.to_owned(),
        paths,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_route(id: &str) -> NewRoute {
        NewRoute {
            route_id: Some(id.to_owned()),
            name: "Day hike".to_owned(),
            permissions: Permissions::Private,
        }
    }

    fn marker_at(lng: f64, lat: f64, day: u32) -> NewMarker {
        NewMarker {
            lng_lat: LngLat { lng, lat },
            place_name: format!("{lng},{lat}"),
            day: Day::new(day).unwrap(),
            time: "09:00".to_owned(),
        }
    }

    async fn store_with_route(user_id: &str, route_id: &str) -> Store {
        let store = Store::in_memory().await.unwrap();
        store.create_route(user_id, new_route(route_id)).await.unwrap();
        store
    }

    #[tokio::test]
    async fn append_renames_and_keeps_append_order_per_day() {
        let store = store_with_route("u1", "r1").await;

        store.append_marker("u1", "r1", Some("Coast walk"), marker_at(1.0, 1.0, 1)).await.unwrap();
        store.append_marker("u1", "r1", Some("Coast walk"), marker_at(2.0, 2.0, 2)).await.unwrap();
        store.append_marker("u1", "r1", Some("Coast path"), marker_at(3.0, 3.0, 1)).await.unwrap();

        let collection = store.collection("u1").await.unwrap();
        let route = &collection.paths[0];
        assert_eq!(route.route_name, "Coast path");

        let day1: Vec<f64> = route.day(Day::FIRST).iter().map(|m| m.lng_lat.lng).collect();
        assert_eq!(day1, vec![1.0, 3.0]);
        assert_eq!(route.day(Day::new(2).unwrap()).len(), 1);
    }

    #[tokio::test]
    async fn missing_route_name_keeps_the_current_one() {
        let store = store_with_route("u1", "r1").await;
        store.append_marker("u1", "r1", None, marker_at(1.0, 1.0, 1)).await.unwrap();

        let collection = store.collection("u1").await.unwrap();
        assert_eq!(collection.paths[0].route_name, "Day hike");
    }

    #[tokio::test]
    async fn append_to_unknown_route_is_not_found_but_persists_collection() {
        let store = Store::in_memory().await.unwrap();

        let err = store
            .append_marker("fresh", "nope", Some("x"), marker_at(1.0, 1.0, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let collection = store.collection("fresh").await.unwrap();
        assert!(collection.paths.is_empty());
    }

    #[tokio::test]
    async fn append_is_scoped_to_the_owning_user() {
        let store = store_with_route("u1", "r1").await;

        let err = store
            .append_marker("u2", "r1", Some("stolen"), marker_at(1.0, 1.0, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(store.markers_for("u1", "r1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_appends_to_one_route_are_all_kept() {
        let store = store_with_route("u1", "r1").await;

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .append_marker("u1", "r1", Some("busy"), marker_at(f64::from(i), 0.0, 1))
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(store.markers_for("u1", "r1").await.unwrap().len(), 16);
    }

    #[tokio::test]
    async fn appends_never_cross_routes() {
        let store = store_with_route("u1", "a").await;
        store.create_route("u1", new_route("b")).await.unwrap();

        store.append_marker("u1", "a", Some("A"), marker_at(1.0, 1.0, 1)).await.unwrap();
        store.append_marker("u1", "b", Some("B"), marker_at(2.0, 2.0, 1)).await.unwrap();

        let a = store.markers_for("u1", "a").await.unwrap();
        let b = store.markers_for("u1", "b").await.unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].lng_lat.lng, 1.0);
        assert_eq!(b.len(), 1);
        assert_eq!(b[0].lng_lat.lng, 2.0);
    }

    #[tokio::test]
    async fn remove_by_coordinates_takes_only_the_earliest_match() {
        let store = store_with_route("u1", "r1").await;
        let first = store
            .append_marker("u1", "r1", Some("r"), marker_at(5.0, 5.0, 1))
            .await
            .unwrap();
        let second = store
            .append_marker("u1", "r1", Some("r"), marker_at(5.0, 5.0, 1))
            .await
            .unwrap();

        let removed = store
            .remove_marker(
                "r1",
                MarkerSelector::At { day: Day::FIRST, lng_lat: LngLat { lng: 5.0, lat: 5.0 } },
            )
            .await
            .unwrap();
        assert_eq!(removed.id, first.id);

        let left = store.markers_for("u1", "r1").await.unwrap();
        assert_eq!(left, vec![second]);
    }

    #[tokio::test]
    async fn remove_by_id_ignores_other_routes() {
        let store = store_with_route("u1", "a").await;
        store.create_route("u1", new_route("b")).await.unwrap();
        let marker = store
            .append_marker("u1", "a", Some("A"), marker_at(1.0, 1.0, 1))
            .await
            .unwrap();

        let err = store
            .remove_marker("b", MarkerSelector::Id(marker.id.clone()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let removed = store
            .remove_marker("a", MarkerSelector::Id(marker.id.clone()))
            .await
            .unwrap();
        assert_eq!(removed, marker);
        assert!(store.markers_for("u1", "a").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_route_ids_are_rejected() {
        let store = store_with_route("u1", "r1").await;
        let err = store.create_route("u2", new_route("r1")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn collection_lists_routes_in_creation_order() {
        let store = store_with_route("u1", "first").await;
        store.create_route("u1", new_route("second")).await.unwrap();

        let ids: Vec<String> = store
            .collection("u1")
            .await
            .unwrap()
            .paths
            .into_iter()
            .map(|route| route.route_id)
            .collect();
        assert_eq!(ids, vec!["first", "second"]);
    }
}
