use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use super::super::buses::TripPathResponse;
use super::super::{canonical_route_id, not_found, ApiError, ErrorResponse, TimeQuery, TwinState};
use crate::engine::{BusPosition, InundationLevel, TwinError};
use crate::providers::gtfs::format_gtfs_time;

#[derive(Debug, Serialize, ToSchema)]
pub struct RouteResponse {
    pub route_id: String,
    pub short_name: Option<String>,
    pub long_name: Option<String>,
    pub route_type: Option<i32>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TripSummary {
    pub trip_id: String,
    pub route_name: String,
    pub headsign: Option<String>,
    pub direction_id: Option<i32>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

/// Dashboard summary: the route's impact plus the reading behind it.
#[derive(Debug, Serialize, ToSchema)]
pub struct RouteStatusResponse {
    pub route_id: String,
    pub serviceable: bool,
    pub impact_level: crate::engine::ImpactLevel,
    pub delay_multiplier: f64,
    pub estimated_delay_minutes: i64,
    pub reason: String,
    pub affected_segments: Vec<String>,
    pub current_wave_height: f64,
    pub wave_direction: String,
    pub inundation_risk: f64,
    pub inundation_level: InundationLevel,
    pub inundation_description: String,
}

/// All routes in the loaded schedule
#[utoipa::path(
    get,
    path = "/api/routes",
    responses(
        (status = 200, description = "Route metadata", body = [RouteResponse])
    ),
    tag = "routes"
)]
pub async fn get_all_routes(State(state): State<TwinState>) -> Json<Vec<RouteResponse>> {
    let mut routes: Vec<RouteResponse> = state
        .schedule
        .routes
        .values()
        .map(|r| RouteResponse {
            route_id: r.route_id.clone(),
            short_name: r.route_short_name.clone(),
            long_name: r.route_long_name.clone(),
            route_type: r.route_type,
        })
        .collect();
    routes.sort_by(|a, b| a.route_id.cmp(&b.route_id));
    Json(routes)
}

/// One route's metadata
#[utoipa::path(
    get,
    path = "/api/routes/{route_id}",
    params(("route_id" = String, Path, description = "Route id, or the shorthand A/B")),
    responses(
        (status = 200, description = "The route", body = RouteResponse),
        (status = 404, description = "Unknown route", body = ErrorResponse)
    ),
    tag = "routes"
)]
pub async fn get_route(
    State(state): State<TwinState>,
    Path(route_id): Path<String>,
) -> Result<Json<RouteResponse>, ApiError> {
    let route_id = canonical_route_id(&route_id);
    let route = state
        .schedule
        .route(&route_id)
        .ok_or_else(|| not_found(TwinError::RouteNotFound(route_id.clone()).to_string()))?;
    Ok(Json(RouteResponse {
        route_id: route.route_id.clone(),
        short_name: route.route_short_name.clone(),
        long_name: route.route_long_name.clone(),
        route_type: route.route_type,
    }))
}

/// All operational trips on a route, without vehicle dedup
#[utoipa::path(
    get,
    path = "/api/routes/{route_id}/buses",
    params(
        ("route_id" = String, Path, description = "Route id, or the shorthand A/B"),
        TimeQuery
    ),
    responses(
        (status = 200, description = "Operational trip positions", body = [BusPosition]),
        (status = 404, description = "Unknown route", body = ErrorResponse)
    ),
    tag = "routes"
)]
pub async fn get_route_buses(
    State(state): State<TwinState>,
    Path(route_id): Path<String>,
    Query(time): Query<TimeQuery>,
) -> Result<Json<Vec<BusPosition>>, ApiError> {
    let route_id = canonical_route_id(&route_id);
    let now = time.resolve(state.timezone);
    state
        .fleet
        .active_trips_for_route(&route_id, now)
        .await
        .map(Json)
        .map_err(|e| not_found(e.to_string()))
}

/// All trips serving a route, with start and end times
#[utoipa::path(
    get,
    path = "/api/routes/{route_id}/trips",
    params(("route_id" = String, Path, description = "Route id, or the shorthand A/B")),
    responses(
        (status = 200, description = "Trip list", body = [TripSummary]),
        (status = 404, description = "Unknown route", body = ErrorResponse)
    ),
    tag = "routes"
)]
pub async fn get_route_trips(
    State(state): State<TwinState>,
    Path(route_id): Path<String>,
) -> Result<Json<Vec<TripSummary>>, ApiError> {
    let route_id = canonical_route_id(&route_id);
    let route = state
        .schedule
        .route(&route_id)
        .ok_or_else(|| not_found(TwinError::RouteNotFound(route_id.clone()).to_string()))?;
    let route_name = route
        .route_short_name
        .clone()
        .unwrap_or_else(|| route.route_id.clone());

    let trips = state
        .schedule
        .trips_for_route(&route_id)
        .into_iter()
        .map(|trip| {
            let stop_times = state.schedule.stop_times_for(&trip.trip_id);
            TripSummary {
                trip_id: trip.trip_id.clone(),
                route_name: route_name.clone(),
                headsign: trip.trip_headsign.clone(),
                direction_id: trip.direction_id,
                start_time: stop_times
                    .first()
                    .and_then(|st| st.departure_time)
                    .map(format_gtfs_time),
                end_time: stop_times
                    .last()
                    .and_then(|st| st.arrival_time)
                    .map(format_gtfs_time),
            }
        })
        .collect();
    Ok(Json(trips))
}

/// Representative polyline for a route (all its trips share one path)
#[utoipa::path(
    get,
    path = "/api/routes/{route_id}/path",
    params(("route_id" = String, Path, description = "Route id, or the shorthand A/B")),
    responses(
        (status = 200, description = "The route path", body = TripPathResponse),
        (status = 404, description = "Unknown route or route without trips", body = ErrorResponse)
    ),
    tag = "routes"
)]
pub async fn get_route_path(
    State(state): State<TwinState>,
    Path(route_id): Path<String>,
) -> Result<Json<TripPathResponse>, ApiError> {
    let route_id = canonical_route_id(&route_id);
    let trips = state.schedule.trips_for_route(&route_id);
    let trip = trips
        .first()
        .ok_or_else(|| not_found(TwinError::RouteNotFound(route_id.clone()).to_string()))?;
    let route_name = state
        .schedule
        .route(&route_id)
        .and_then(|r| r.route_short_name.clone())
        .unwrap_or_else(|| route_id.clone());

    let path = state
        .paths
        .path_for_trip(&trip.trip_id)
        .await
        .map_err(|e| not_found(e.to_string()))?;

    Ok(Json(TripPathResponse {
        trip_id: trip.trip_id.clone(),
        route_name,
        headsign: trip.trip_headsign.clone(),
        direction_id: trip.direction_id,
        path: path.as_ref().clone(),
    }))
}

/// Impact and current-reading summary for a route
#[utoipa::path(
    get,
    path = "/api/routes/{route_id}/status",
    params(("route_id" = String, Path, description = "Route id, or the shorthand A/B")),
    responses(
        (status = 200, description = "Route status", body = RouteStatusResponse)
    ),
    tag = "routes"
)]
pub async fn get_route_status(
    State(state): State<TwinState>,
    Path(route_id): Path<String>,
) -> Json<RouteStatusResponse> {
    let route_id = canonical_route_id(&route_id);
    let impact = state.impact.impact(&route_id).await;
    let reading = state.current_reading.read().await.clone();

    Json(RouteStatusResponse {
        route_id: impact.route_id,
        serviceable: impact.serviceable,
        impact_level: impact.impact_level,
        delay_multiplier: impact.delay_multiplier,
        estimated_delay_minutes: impact.estimated_delay_minutes,
        reason: impact.reason,
        affected_segments: impact.affected_segments,
        current_wave_height: reading.wave_height,
        wave_direction: reading.sector().as_str().to_string(),
        inundation_risk: impact.inundation_risk,
        inundation_level: impact.inundation_level,
        inundation_description: impact.inundation_description,
    })
}
