mod list;

pub use list::*;

use axum::{routing::get, Router};

use super::TwinState;

pub fn router(state: TwinState) -> Router {
    Router::new()
        .route("/", get(get_all_routes))
        .route("/{route_id}", get(get_route))
        .route("/{route_id}/buses", get(get_route_buses))
        .route("/{route_id}/trips", get(get_route_trips))
        .route("/{route_id}/path", get(get_route_path))
        .route("/{route_id}/status", get(get_route_status))
        .with_state(state)
}
