use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use super::super::{not_found, ApiError, ErrorResponse, TimeQuery, TwinState};
use crate::engine::{BusPosition, ImpactLevel, RoutePathPoint, TwinError};
use crate::providers::gtfs::format_gtfs_time;

/// One scheduled stop on a trip's timeline, with delay-adjusted estimates.
#[derive(Debug, Serialize, ToSchema)]
pub struct TimelineStop {
    pub stop_id: String,
    pub stop_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub sequence: i32,
    pub scheduled_arrival_time: Option<String>,
    pub scheduled_departure_time: Option<String>,
    pub estimated_arrival_time: Option<String>,
    pub estimated_departure_time: Option<String>,
    pub tidal_delay_minutes: i64,
    pub inundation_level: crate::engine::InundationLevel,
    /// The bus has already departed this stop
    pub passed: bool,
    /// The stop the bus is currently at or heading to
    pub current: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TripTimelineResponse {
    pub trip_id: String,
    pub route_name: String,
    pub headsign: Option<String>,
    pub direction_id: Option<i32>,
    pub stops: Vec<TimelineStop>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TripPathResponse {
    pub trip_id: String,
    pub route_name: String,
    pub headsign: Option<String>,
    pub direction_id: Option<i32>,
    pub path: Vec<RoutePathPoint>,
}

/// All active buses, one entry per physical vehicle
#[utoipa::path(
    get,
    path = "/api/buses",
    params(TimeQuery),
    responses(
        (status = 200, description = "Deduplicated active fleet", body = [BusPosition])
    ),
    tag = "buses"
)]
pub async fn get_active_buses(
    State(state): State<TwinState>,
    Query(time): Query<TimeQuery>,
) -> Json<Vec<BusPosition>> {
    let now = time.resolve(state.timezone);
    Json(state.fleet.active_positions(now).await)
}

/// One bus, looked up by trip id or by numeric bus id among active buses
#[utoipa::path(
    get,
    path = "/api/buses/{id_or_label}",
    params(
        ("id_or_label" = String, Path, description = "Trip id, or the numeric bus id of an active bus"),
        TimeQuery
    ),
    responses(
        (status = 200, description = "The bus position", body = BusPosition),
        (status = 404, description = "No such bus", body = ErrorResponse)
    ),
    tag = "buses"
)]
pub async fn get_bus(
    State(state): State<TwinState>,
    Path(id_or_label): Path<String>,
    Query(time): Query<TimeQuery>,
) -> Result<Json<BusPosition>, ApiError> {
    let now = time.resolve(state.timezone);

    match state.engine.position(&id_or_label, now).await {
        Ok(position) => return Ok(Json(position)),
        Err(TwinError::TripNotFound(_)) => {}
        Err(e) => return Err(not_found(e.to_string())),
    }

    // Not a trip id: fall back to the numeric bus id of an active bus
    if let Ok(bus_id) = id_or_label.parse::<i32>() {
        let active = state.fleet.active_positions(now).await;
        if let Some(bus) = active.into_iter().find(|b| b.bus_id == bus_id) {
            return Ok(Json(bus));
        }
    }

    Err(not_found(
        TwinError::BusNotFound(id_or_label).to_string(),
    ))
}

/// Position of one trip's bus
#[utoipa::path(
    get,
    path = "/api/buses/trip/{trip_id}/position",
    params(
        ("trip_id" = String, Path, description = "GTFS trip id"),
        TimeQuery
    ),
    responses(
        (status = 200, description = "The derived position", body = BusPosition),
        (status = 404, description = "Unknown trip", body = ErrorResponse)
    ),
    tag = "buses"
)]
pub async fn get_trip_position(
    State(state): State<TwinState>,
    Path(trip_id): Path<String>,
    Query(time): Query<TimeQuery>,
) -> Result<Json<BusPosition>, ApiError> {
    let now = time.resolve(state.timezone);
    state
        .engine
        .position(&trip_id, now)
        .await
        .map(Json)
        .map_err(|e| not_found(e.to_string()))
}

/// Stop-by-stop timeline of a trip with delay-adjusted times
#[utoipa::path(
    get,
    path = "/api/buses/trip/{trip_id}/route",
    params(
        ("trip_id" = String, Path, description = "GTFS trip id"),
        TimeQuery
    ),
    responses(
        (status = 200, description = "The trip timeline", body = TripTimelineResponse),
        (status = 404, description = "Unknown trip", body = ErrorResponse)
    ),
    tag = "buses"
)]
pub async fn get_trip_route(
    State(state): State<TwinState>,
    Path(trip_id): Path<String>,
    Query(time): Query<TimeQuery>,
) -> Result<Json<TripTimelineResponse>, ApiError> {
    let now = time.resolve(state.timezone);
    let trip = state
        .schedule
        .trip(&trip_id)
        .ok_or_else(|| not_found(TwinError::TripNotFound(trip_id.clone()).to_string()))?;
    let route_name = state
        .schedule
        .route(&trip.route_id)
        .and_then(|r| r.route_short_name.clone())
        .unwrap_or_else(|| trip.route_id.clone());

    let impact = state.impact.impact(&trip.route_id).await;
    let delay_minutes = if impact.impact_level == ImpactLevel::None {
        0
    } else {
        impact.estimated_delay_minutes
    };
    let delay_secs = (delay_minutes as i32).saturating_mul(60);

    let stop_times = state.schedule.stop_times_for(&trip_id);
    let current_idx = stop_times
        .iter()
        .position(|st| st.departure_time.map(|d| d >= now).unwrap_or(true));

    let stops = stop_times
        .iter()
        .enumerate()
        .filter_map(|(i, st)| {
            let stop = state.schedule.stop(&st.stop_id)?;
            Some(TimelineStop {
                stop_id: stop.stop_id.clone(),
                stop_name: stop.display_name().to_string(),
                latitude: stop.lat,
                longitude: stop.lon,
                sequence: st.stop_sequence,
                scheduled_arrival_time: st.arrival_time.map(format_gtfs_time),
                scheduled_departure_time: st.departure_time.map(format_gtfs_time),
                estimated_arrival_time: st.arrival_time.map(|t| format_gtfs_time(t + delay_secs)),
                estimated_departure_time: st
                    .departure_time
                    .map(|t| format_gtfs_time(t + delay_secs)),
                tidal_delay_minutes: delay_minutes,
                inundation_level: impact.inundation_level,
                passed: st.departure_time.map(|d| d < now).unwrap_or(false),
                current: current_idx == Some(i),
            })
        })
        .collect();

    Ok(Json(TripTimelineResponse {
        trip_id,
        route_name,
        headsign: trip.trip_headsign.clone(),
        direction_id: trip.direction_id,
        stops,
    }))
}

/// Road-following polyline for a trip, with stop-tagged points
#[utoipa::path(
    get,
    path = "/api/buses/trip/{trip_id}/path",
    params(("trip_id" = String, Path, description = "GTFS trip id")),
    responses(
        (status = 200, description = "The cached path", body = TripPathResponse),
        (status = 404, description = "Unknown trip", body = ErrorResponse)
    ),
    tag = "buses"
)]
pub async fn get_trip_path(
    State(state): State<TwinState>,
    Path(trip_id): Path<String>,
) -> Result<Json<TripPathResponse>, ApiError> {
    let trip = state
        .schedule
        .trip(&trip_id)
        .ok_or_else(|| not_found(TwinError::TripNotFound(trip_id.clone()).to_string()))?;
    let route_name = state
        .schedule
        .route(&trip.route_id)
        .and_then(|r| r.route_short_name.clone())
        .unwrap_or_else(|| trip.route_id.clone());

    let path = state
        .paths
        .path_for_trip(&trip_id)
        .await
        .map_err(|e| not_found(e.to_string()))?;

    Ok(Json(TripPathResponse {
        trip_id,
        route_name,
        headsign: trip.trip_headsign.clone(),
        direction_id: trip.direction_id,
        path: path.as_ref().clone(),
    }))
}
