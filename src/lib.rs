pub mod api;
pub mod appresult;
pub mod config;
pub mod db;
pub mod protocol;
pub mod res;
pub mod rooms;
pub mod store;
pub mod sync;

use axum::{
    Router,
    extract::FromRef,
    http::{HeaderValue, Method, header},
    routing::get,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

pub use appresult::{AppError, AppResult};
pub use config::Config;

use rooms::RoomRegistry;
use store::Store;
use sync::SyncService;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub store: Store,
    pub service: SyncService,
}

impl AppState {
    pub fn new(store: Store, rooms: RoomRegistry) -> Self {
        Self {
            service: SyncService::new(store.clone(), rooms),
            store,
        }
    }
}

pub fn app(state: AppState, config: &Config) -> AppResult<Router> {
    let origins = config
        .allowed_origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin).map_err(|_| {
                AppError::Config(format!("allowed origin {origin:?} is not a header value"))
            })
        })
        .collect::<AppResult<Vec<_>>>()?;

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true);

    Ok(Router::new()
        .route("/ws", get(sync::sync_ws))
        .merge(api::router())
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http()))
}
