mod list;

pub use list::*;

use axum::{routing::get, Router};

use super::TwinState;

pub fn router(state: TwinState) -> Router {
    Router::new()
        .route("/", get(get_active_buses))
        .route("/{id_or_label}", get(get_bus))
        .route("/trip/{trip_id}/position", get(get_trip_position))
        .route("/trip/{trip_id}/route", get(get_trip_route))
        .route("/trip/{trip_id}/path", get(get_trip_path))
        .with_state(state)
}
