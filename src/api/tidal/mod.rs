mod list;

pub use list::*;

use axum::{routing::get, Router};

use super::TwinState;

pub fn router(state: TwinState) -> Router {
    Router::new()
        .route("/current", get(get_current_reading))
        .route("/impact", get(get_all_impacts))
        .route("/impact/{route_id}", get(get_route_impact))
        .route("/historical", get(get_historical_readings))
        .with_state(state)
}
