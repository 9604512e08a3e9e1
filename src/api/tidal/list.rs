use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use super::super::{canonical_route_id, TwinState};
use crate::engine::RouteImpact;
use crate::providers::tidal::TidalReading;

#[derive(Debug, Serialize, ToSchema)]
pub struct CurrentReadingResponse {
    pub station_id: String,
    pub station_name: String,
    /// ISO local timestamp of the observation
    pub timestamp: String,
    pub wave_height: f64,
    pub wave_period: f64,
    pub wave_direction: f64,
    pub direction_name: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ImpactSummaryResponse {
    pub route_impacts: Vec<RouteImpact>,
    pub last_updated: String,
    pub current_wave_height: f64,
    pub current_wave_direction: String,
}

fn format_timestamp(reading: &TidalReading) -> String {
    reading.timestamp.format("%Y-%m-%dT%H:%M:%S").to_string()
}

/// The current wave reading
#[utoipa::path(
    get,
    path = "/api/tidal/current",
    responses(
        (status = 200, description = "Current reading", body = CurrentReadingResponse)
    ),
    tag = "tidal"
)]
pub async fn get_current_reading(State(state): State<TwinState>) -> Json<CurrentReadingResponse> {
    let reading = state.current_reading.read().await.clone();
    Json(CurrentReadingResponse {
        station_id: reading.station_id.clone(),
        station_name: reading.station_name.clone(),
        timestamp: format_timestamp(&reading),
        wave_height: reading.wave_height,
        wave_period: reading.wave_period,
        wave_direction: reading.wave_direction,
        direction_name: reading.sector().as_str().to_string(),
        latitude: reading.latitude,
        longitude: reading.longitude,
    })
}

/// Impacts for both routes against the current reading
#[utoipa::path(
    get,
    path = "/api/tidal/impact",
    responses(
        (status = 200, description = "All route impacts", body = ImpactSummaryResponse)
    ),
    tag = "tidal"
)]
pub async fn get_all_impacts(State(state): State<TwinState>) -> Json<ImpactSummaryResponse> {
    let route_impacts = state.impact.all_impacts().await;
    let reading = state.current_reading.read().await.clone();

    Json(ImpactSummaryResponse {
        route_impacts,
        last_updated: format_timestamp(&reading),
        current_wave_height: reading.wave_height,
        current_wave_direction: reading.sector().as_str().to_string(),
    })
}

/// One route's impact. Unknown routes report "no impact" rather than 404,
/// since the impact model is defined for any route id.
#[utoipa::path(
    get,
    path = "/api/tidal/impact/{route_id}",
    params(("route_id" = String, Path, description = "Route id, or the shorthand A/B")),
    responses(
        (status = 200, description = "The route impact", body = RouteImpact)
    ),
    tag = "tidal"
)]
pub async fn get_route_impact(
    State(state): State<TwinState>,
    Path(route_id): Path<String>,
) -> Json<RouteImpact> {
    let route_id = canonical_route_id(&route_id);
    Json(state.impact.impact(&route_id).await)
}

/// The in-memory historical reading sequence the rotation cycles through
#[utoipa::path(
    get,
    path = "/api/tidal/historical",
    responses(
        (status = 200, description = "Historical readings, oldest first", body = [TidalReading])
    ),
    tag = "tidal"
)]
pub async fn get_historical_readings(State(state): State<TwinState>) -> Json<Vec<TidalReading>> {
    Json(state.historical.read().await.clone())
}
