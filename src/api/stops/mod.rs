mod list;

pub use list::*;

use axum::{routing::get, Router};

use super::TwinState;

pub fn router(state: TwinState) -> Router {
    Router::new()
        .route("/", get(get_all_stops))
        .route("/{stop_id}", get(get_stop))
        .route("/{stop_id}/arrivals", get(get_upcoming_arrivals))
        .with_state(state)
}
