use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use utoipa::ToSchema;

use super::TwinState;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Whether the service is running
    pub healthy: bool,
    /// Number of stops in the loaded schedule
    pub gtfs_stop_count: usize,
    /// Number of routes in the loaded schedule
    pub gtfs_route_count: usize,
    /// Number of trips in the loaded schedule
    pub gtfs_trip_count: usize,
    /// When the schedule was loaded, RFC 3339
    pub schedule_loaded_at: String,
    /// The CDIP station the readings come from
    pub tidal_station_id: String,
    /// Wave height of the current reading, in meters
    pub current_wave_height: f64,
    /// Number of historical readings the rotation cycles through
    pub historical_reading_count: usize,
    /// Current position of the rotation cursor
    pub rotation_index: usize,
}

/// Service health: schedule counts and reading rotation state
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service health status", body = HealthResponse)
    ),
    tag = "health"
)]
pub async fn health_check(State(state): State<TwinState>) -> Json<HealthResponse> {
    let reading = state.current_reading.read().await;
    let historical = state.historical.read().await;
    let rotation = state.rotation.read().await;

    Json(HealthResponse {
        healthy: true,
        gtfs_stop_count: state.schedule.stops.len(),
        gtfs_route_count: state.schedule.routes.len(),
        gtfs_trip_count: state.schedule.trips.len(),
        schedule_loaded_at: state.schedule.loaded_at.to_rfc3339(),
        tidal_station_id: state.station_id.clone(),
        current_wave_height: reading.wave_height,
        historical_reading_count: historical.len(),
        rotation_index: rotation.index(),
    })
}

pub fn router(state: TwinState) -> Router {
    Router::new().route("/", get(health_check)).with_state(state)
}
