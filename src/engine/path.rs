//! Road-following route paths, memoized per trip.
//!
//! A path is the trip's stop sequence expanded into a polyline that follows
//! real roads, with cumulative distance annotated and points within 50 m of
//! a scheduled stop tagged with that stop's identity. When the routing
//! provider is unavailable the path degrades to straight lines between
//! stops; path construction never fails.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use utoipa::ToSchema;

use crate::providers::gtfs::{GtfsStop, GtfsStopTime, ScheduleIndex};
use crate::providers::routing::RoutingClient;

use super::TwinError;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// A stop is considered to coincide with a path point within this distance.
const STOP_MATCH_KM: f64 = 0.05;

/// One point along a trip's road path.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RoutePathPoint {
    pub latitude: f64,
    pub longitude: f64,
    /// Set when this point coincides with a scheduled stop
    pub stop_id: Option<String>,
    pub stop_name: Option<String>,
    pub sequence: Option<i32>,
    /// Cumulative distance from the start of the route, in kilometers
    pub distance_from_start: f64,
    pub is_stop: bool,
}

/// Great-circle distance between two points, in kilometers.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// The sub-path between two tagged stops: from the first point tagged with
/// `from_stop_id` to the first point tagged with `to_stop_id` after it,
/// inclusive. None if either tag is missing or out of order.
pub fn segment_between<'a>(
    path: &'a [RoutePathPoint],
    from_stop_id: &str,
    to_stop_id: &str,
) -> Option<&'a [RoutePathPoint]> {
    let from_idx = path
        .iter()
        .position(|p| p.stop_id.as_deref() == Some(from_stop_id))?;
    let to_idx = path[from_idx..]
        .iter()
        .position(|p| p.stop_id.as_deref() == Some(to_stop_id))?
        + from_idx;
    if to_idx > from_idx {
        Some(&path[from_idx..=to_idx])
    } else {
        None
    }
}

/// Total length of a path segment, in kilometers.
pub fn segment_length_km(segment: &[RoutePathPoint]) -> f64 {
    segment
        .windows(2)
        .map(|w| haversine_km(w[0].latitude, w[0].longitude, w[1].latitude, w[1].longitude))
        .sum()
}

/// Walk the segment accumulating distance until `target_km` is reached and
/// interpolate within the straddling leg. Past the end, clamps to the final
/// point.
pub fn point_at_distance(segment: &[RoutePathPoint], target_km: f64) -> (f64, f64) {
    let mut accumulated = 0.0;
    for w in segment.windows(2) {
        let leg = haversine_km(w[0].latitude, w[0].longitude, w[1].latitude, w[1].longitude);
        if accumulated + leg >= target_km && leg > 0.0 {
            let ratio = (target_km - accumulated) / leg;
            let lat = w[0].latitude + (w[1].latitude - w[0].latitude) * ratio;
            let lon = w[0].longitude + (w[1].longitude - w[0].longitude) * ratio;
            return (lat, lon);
        }
        accumulated += leg;
    }
    let last = &segment[segment.len() - 1];
    (last.latitude, last.longitude)
}

/// Memoizing cache of road paths, keyed by trip id.
///
/// Entries are immutable once written. Concurrent misses for the same trip
/// may both call the routing provider; the duplicate call is idempotent and
/// the last writer wins with an identical value, so misses are computed
/// outside the lock rather than serialized behind it.
pub struct RoutePathCache {
    schedule: Arc<ScheduleIndex>,
    routing: RoutingClient,
    cache: RwLock<HashMap<String, Arc<Vec<RoutePathPoint>>>>,
}

impl RoutePathCache {
    pub fn new(schedule: Arc<ScheduleIndex>, routing: RoutingClient) -> Self {
        Self {
            schedule,
            routing,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// The road path for a trip, computed on first access.
    pub async fn path_for_trip(&self, trip_id: &str) -> Result<Arc<Vec<RoutePathPoint>>, TwinError> {
        if self.schedule.trip(trip_id).is_none() {
            return Err(TwinError::TripNotFound(trip_id.to_string()));
        }

        if let Some(path) = self.cache.read().await.get(trip_id) {
            return Ok(path.clone());
        }

        let path = Arc::new(self.build_path(trip_id).await);
        self.cache
            .write()
            .await
            .insert(trip_id.to_string(), path.clone());
        Ok(path)
    }

    async fn build_path(&self, trip_id: &str) -> Vec<RoutePathPoint> {
        let stops = self.trip_stops(trip_id);
        if stops.is_empty() {
            return Vec::new();
        }

        let waypoints: Vec<(f64, f64)> = stops.iter().map(|(_, s)| (s.lat, s.lon)).collect();

        match self.routing.route(&waypoints).await {
            Ok(polyline) if polyline.len() >= 2 => {
                debug!(trip_id, points = polyline.len(), "Built road-based path");
                annotate_road_path(&polyline, &stops)
            }
            Ok(_) => {
                warn!(trip_id, "Routing returned a degenerate polyline, using simple path");
                simple_path(&stops)
            }
            Err(e) => {
                warn!(trip_id, error = %e, "Routing unavailable, using simple path");
                simple_path(&stops)
            }
        }
    }

    /// The trip's scheduled stops in sequence order, with their stop-times.
    /// Stop ids missing from the index are skipped.
    fn trip_stops(&self, trip_id: &str) -> Vec<(GtfsStopTime, GtfsStop)> {
        self.schedule
            .stop_times_for(trip_id)
            .iter()
            .filter_map(|st| {
                self.schedule
                    .stop(&st.stop_id)
                    .map(|stop| (st.clone(), stop.clone()))
            })
            .collect()
    }
}

/// Annotate a road polyline with cumulative distance and stop tags.
///
/// Each stop-time is claimed by at most one path point: the first point
/// within 50 m of a not-yet-claimed stop takes its identity, so coincident
/// polyline points near a stop do not all become stops.
fn annotate_road_path(
    polyline: &[(f64, f64)],
    stops: &[(GtfsStopTime, GtfsStop)],
) -> Vec<RoutePathPoint> {
    let mut claimed = vec![false; stops.len()];
    let mut total_distance = 0.0;
    let mut path = Vec::with_capacity(polyline.len());

    for (i, &(lat, lon)) in polyline.iter().enumerate() {
        if i > 0 {
            let (plat, plon) = polyline[i - 1];
            total_distance += haversine_km(plat, plon, lat, lon);
        }

        let matched = stops.iter().enumerate().find(|(j, (_, stop))| {
            !claimed[*j] && haversine_km(lat, lon, stop.lat, stop.lon) < STOP_MATCH_KM
        });

        match matched {
            Some((j, (st, stop))) => {
                claimed[j] = true;
                path.push(RoutePathPoint {
                    latitude: lat,
                    longitude: lon,
                    stop_id: Some(stop.stop_id.clone()),
                    stop_name: stop.stop_name.clone(),
                    sequence: Some(st.stop_sequence),
                    distance_from_start: total_distance,
                    is_stop: true,
                });
            }
            None => path.push(RoutePathPoint {
                latitude: lat,
                longitude: lon,
                stop_id: None,
                stop_name: None,
                sequence: None,
                distance_from_start: total_distance,
                is_stop: false,
            }),
        }
    }

    path
}

/// Fallback path connecting the stops with straight segments.
fn simple_path(stops: &[(GtfsStopTime, GtfsStop)]) -> Vec<RoutePathPoint> {
    let mut total_distance = 0.0;
    let mut path = Vec::with_capacity(stops.len());

    for (i, (st, stop)) in stops.iter().enumerate() {
        if i > 0 {
            let (_, prev) = &stops[i - 1];
            total_distance += haversine_km(prev.lat, prev.lon, stop.lat, stop.lon);
        }
        path.push(RoutePathPoint {
            latitude: stop.lat,
            longitude: stop.lon,
            stop_id: Some(stop.stop_id.clone()),
            stop_name: stop.stop_name.clone(),
            sequence: Some(st.stop_sequence),
            distance_from_start: total_distance,
            is_stop: true,
        });
    }

    path
}
