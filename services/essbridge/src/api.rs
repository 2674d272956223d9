//! HTTP API
//!
//! | Method | Path              | Response                     |
//! |--------|-------------------|------------------------------|
//! | GET    | `/api/multimeter` | 200, current [`Snapshot`] JSON |
//! | other  | any               | 404, empty body              |
//!
//! Every response carries `Access-Control-Allow-Origin: *`.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::snapshot::{Snapshot, SnapshotStore};

pub const MULTIMETER_PATH: &str = "/api/multimeter";

#[derive(Clone)]
pub struct AppState {
    pub store: SnapshotStore,
}

pub fn create_api_routes(store: SnapshotStore) -> Router {
    Router::new()
        .route(MULTIMETER_PATH, get(get_multimeter).head(not_found).fallback(not_found))
        .fallback(not_found)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { store })
}

async fn get_multimeter(State(state): State<AppState>) -> Json<Snapshot> {
    Json(state.store.get())
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}
