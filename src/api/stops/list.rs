use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::super::{not_found, ApiError, ErrorResponse, TwinState};
use crate::engine::{ImpactLevel, InundationLevel, RouteImpact, TwinError};
use crate::providers::gtfs::{format_gtfs_time, parse_gtfs_time};

#[derive(Debug, Serialize, ToSchema)]
pub struct StopResponse {
    pub stop_id: String,
    pub stop_name: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ArrivalsQuery {
    /// Maximum number of arrivals to return (default 5)
    pub limit: Option<usize>,
    /// Simulated local time as HH:MM:SS; defaults to the current
    /// Pacific/Majuro wall clock
    pub at: Option<String>,
}

/// One upcoming arrival at a stop, with the route's delay applied.
#[derive(Debug, Serialize, ToSchema)]
pub struct ArrivalResponse {
    pub trip_id: String,
    pub route_name: String,
    pub headsign: Option<String>,
    pub scheduled_arrival_time: String,
    pub estimated_arrival_time: String,
    pub tidal_delay_minutes: i64,
    pub inundation_level: InundationLevel,
    pub inundation_risk: f64,
    /// ON_TIME, MINOR_DELAY, MAJOR_DELAY or SHUTDOWN
    pub service_status: String,
}

fn service_status(level: ImpactLevel) -> &'static str {
    match level {
        ImpactLevel::None => "ON_TIME",
        ImpactLevel::SlightDelays => "MINOR_DELAY",
        ImpactLevel::MajorDelays => "MAJOR_DELAY",
        ImpactLevel::Shutdown => "SHUTDOWN",
    }
}

/// All stops in the loaded schedule
#[utoipa::path(
    get,
    path = "/api/stops",
    responses(
        (status = 200, description = "Stop metadata", body = [StopResponse])
    ),
    tag = "stops"
)]
pub async fn get_all_stops(State(state): State<TwinState>) -> Json<Vec<StopResponse>> {
    let mut stops: Vec<StopResponse> = state
        .schedule
        .stops
        .values()
        .map(|s| StopResponse {
            stop_id: s.stop_id.clone(),
            stop_name: s.display_name().to_string(),
            latitude: s.lat,
            longitude: s.lon,
        })
        .collect();
    stops.sort_by(|a, b| a.stop_id.cmp(&b.stop_id));
    Json(stops)
}

/// One stop's metadata
#[utoipa::path(
    get,
    path = "/api/stops/{stop_id}",
    params(("stop_id" = String, Path, description = "GTFS stop id")),
    responses(
        (status = 200, description = "The stop", body = StopResponse),
        (status = 404, description = "Unknown stop", body = ErrorResponse)
    ),
    tag = "stops"
)]
pub async fn get_stop(
    State(state): State<TwinState>,
    Path(stop_id): Path<String>,
) -> Result<Json<StopResponse>, ApiError> {
    let stop = state
        .schedule
        .stop(&stop_id)
        .ok_or_else(|| not_found(TwinError::StopNotFound(stop_id.clone()).to_string()))?;
    Ok(Json(StopResponse {
        stop_id: stop.stop_id.clone(),
        stop_name: stop.display_name().to_string(),
        latitude: stop.lat,
        longitude: stop.lon,
    }))
}

/// Next arrivals at a stop with delay-adjusted estimates
#[utoipa::path(
    get,
    path = "/api/stops/{stop_id}/arrivals",
    params(
        ("stop_id" = String, Path, description = "GTFS stop id"),
        ArrivalsQuery
    ),
    responses(
        (status = 200, description = "Upcoming arrivals", body = [ArrivalResponse]),
        (status = 404, description = "Unknown stop", body = ErrorResponse)
    ),
    tag = "stops"
)]
pub async fn get_upcoming_arrivals(
    State(state): State<TwinState>,
    Path(stop_id): Path<String>,
    Query(query): Query<ArrivalsQuery>,
) -> Result<Json<Vec<ArrivalResponse>>, ApiError> {
    if state.schedule.stop(&stop_id).is_none() {
        return Err(not_found(TwinError::StopNotFound(stop_id).to_string()));
    }

    let now = query
        .at
        .as_deref()
        .and_then(parse_gtfs_time)
        .unwrap_or_else(|| {
            use chrono::Timelike;
            chrono::Utc::now()
                .with_timezone(&state.timezone)
                .num_seconds_from_midnight() as i32
        });
    let limit = query.limit.unwrap_or(5);

    let arrivals = state.schedule.upcoming_arrivals(&stop_id, now, limit);

    // Two routes at most, so impacts are computed once per route
    let mut impacts: HashMap<String, RouteImpact> = HashMap::new();
    for (trip, _) in &arrivals {
        if !impacts.contains_key(&trip.route_id) {
            let impact = state.impact.impact(&trip.route_id).await;
            impacts.insert(trip.route_id.clone(), impact);
        }
    }

    let responses = arrivals
        .into_iter()
        .filter_map(|(trip, stop_time)| {
            let scheduled = stop_time.arrival_time?;
            let impact = impacts.get(&trip.route_id)?;
            let route_name = state
                .schedule
                .route(&trip.route_id)
                .and_then(|r| r.route_short_name.clone())
                .unwrap_or_else(|| trip.route_id.clone());

            let delay_minutes = if impact.impact_level == ImpactLevel::None {
                0
            } else {
                impact.estimated_delay_minutes
            };
            Some(ArrivalResponse {
                trip_id: trip.trip_id.clone(),
                route_name,
                headsign: trip.trip_headsign.clone(),
                scheduled_arrival_time: format_gtfs_time(scheduled),
                estimated_arrival_time: format_gtfs_time(
                    scheduled + (delay_minutes as i32).saturating_mul(60),
                ),
                tidal_delay_minutes: delay_minutes,
                inundation_level: impact.inundation_level,
                inundation_risk: impact.inundation_risk,
                service_status: service_status(impact.impact_level).to_string(),
            })
        })
        .collect();

    Ok(Json(responses))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_status_labels() {
        assert_eq!(service_status(ImpactLevel::None), "ON_TIME");
        assert_eq!(service_status(ImpactLevel::SlightDelays), "MINOR_DELAY");
        assert_eq!(service_status(ImpactLevel::MajorDelays), "MAJOR_DELAY");
        assert_eq!(service_status(ImpactLevel::Shutdown), "SHUTDOWN");
    }
}
