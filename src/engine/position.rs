//! Live bus position derivation.
//!
//! A bus's state at any wall-clock second is fully determined by its trip's
//! stop-time windows: not yet started, dwelling at the origin, moving
//! between two stops, or finished. Moving buses are placed on the cached
//! road path by schedule progress, and the next-stop ETA is stretched by
//! the route's current tidal impact.

use std::sync::Arc;

use serde::Serialize;
use tracing::warn;
use utoipa::ToSchema;

use crate::providers::gtfs::{format_gtfs_time, GtfsStopTime, ScheduleIndex};

use super::impact::{ImpactLevel, TidalImpactCalculator};
use super::path::{point_at_distance, segment_between, segment_length_km, RoutePathCache};
use super::TwinError;

/// Lifecycle state of a bus at a queried instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BusStatus {
    Moving,
    AtStop,
    TripCompleted,
    NotOperational,
    TidalShutdown,
}

impl BusStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BusStatus::Moving => "MOVING",
            BusStatus::AtStop => "AT_STOP",
            BusStatus::TripCompleted => "TRIP_COMPLETED",
            BusStatus::NotOperational => "NOT_OPERATIONAL",
            BusStatus::TidalShutdown => "TIDAL_SHUTDOWN",
        }
    }
}

/// Stop identity attached to a position report.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StopRef {
    pub stop_id: String,
    pub stop_name: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// One bus's derived position and delay state.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BusPosition {
    /// Stable numeric id derived from the trip id
    pub bus_id: i32,
    /// The trip id, doubling as the display label
    pub bus_label: String,
    pub route_id: String,
    pub route_name: String,
    pub status: BusStatus,
    pub operational: bool,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub current_stop: Option<StopRef>,
    pub next_stop: Option<StopRef>,
    /// Progress through the current inter-stop segment, 0-100
    pub progress_percent: f64,
    /// Minutes until the next scheduled stop, after delay adjustment
    pub minutes_to_next_stop: i64,
    pub tidal_delay_applied: bool,
    pub estimated_delay_minutes: i64,
    pub tidal_impact_level: ImpactLevel,
    /// Local wall-clock ETA at the next stop, HH:MM:SS
    pub estimated_arrival_time: Option<String>,
}

/// Stable 32-bit polynomial hash of a trip id. The same trip always maps
/// to the same bus id, across calls and across process runs.
pub fn bus_id(trip_id: &str) -> i32 {
    trip_id
        .chars()
        .fold(0i32, |h, c| h.wrapping_mul(31).wrapping_add(c as i32))
}

/// Effective (arrival, departure) seconds of one stop-time. Missing times
/// borrow the other one; a stop-time with neither is a data inconsistency.
fn effective_times(st: &GtfsStopTime) -> Option<(i32, i32)> {
    match (st.arrival_time, st.departure_time) {
        (Some(a), Some(d)) => Some((a, d)),
        (Some(a), None) => Some((a, a)),
        (None, Some(d)) => Some((d, d)),
        (None, None) => None,
    }
}

pub struct PositionEngine {
    schedule: Arc<ScheduleIndex>,
    paths: Arc<RoutePathCache>,
    impact: Arc<TidalImpactCalculator>,
}

impl PositionEngine {
    pub fn new(
        schedule: Arc<ScheduleIndex>,
        paths: Arc<RoutePathCache>,
        impact: Arc<TidalImpactCalculator>,
    ) -> Self {
        Self {
            schedule,
            paths,
            impact,
        }
    }

    /// Derive the bus position for a trip at `now` seconds since midnight.
    ///
    /// Only an unknown trip id is an error; every schedule or upstream
    /// anomaly degrades to a well-formed NOT_OPERATIONAL or fallback
    /// answer.
    pub async fn position(&self, trip_id: &str, now: i32) -> Result<BusPosition, TwinError> {
        let trip = self
            .schedule
            .trip(trip_id)
            .ok_or_else(|| TwinError::TripNotFound(trip_id.to_string()))?;
        let route_name = self
            .schedule
            .route(&trip.route_id)
            .and_then(|r| r.route_short_name.clone())
            .unwrap_or_else(|| trip.route_id.clone());

        let stop_times = self.schedule.stop_times_for(trip_id);
        let Some(windows) = time_windows(stop_times) else {
            return Ok(self.not_operational(trip_id, &trip.route_id, &route_name));
        };

        let (first_arrival, first_departure) = windows[0];
        let last_arrival = windows[windows.len() - 1].0;

        if now < first_arrival {
            return Ok(self.not_operational(trip_id, &trip.route_id, &route_name));
        }
        if now >= last_arrival {
            return Ok(self.completed(trip_id, &trip.route_id, &route_name, stop_times));
        }
        if now < first_departure {
            return Ok(self
                .at_stop(trip_id, &trip.route_id, &route_name, stop_times, &windows, now)
                .await);
        }

        // Between the origin's departure and the final arrival there is
        // always a stop whose departure lies strictly ahead
        let next_idx = windows
            .iter()
            .position(|&(_, dep)| now < dep)
            .unwrap_or(windows.len() - 1);
        self.moving(
            trip_id,
            &trip.route_id,
            &route_name,
            stop_times,
            &windows,
            next_idx,
            now,
        )
        .await
        .map(Ok)
        .unwrap_or_else(|| Ok(self.not_operational(trip_id, &trip.route_id, &route_name)))
    }

    async fn moving(
        &self,
        trip_id: &str,
        route_id: &str,
        route_name: &str,
        stop_times: &[GtfsStopTime],
        windows: &[(i32, i32)],
        next_idx: usize,
        now: i32,
    ) -> Option<BusPosition> {
        if next_idx == 0 {
            return None;
        }
        let from = &stop_times[next_idx - 1];
        let to = &stop_times[next_idx];
        let departed = windows[next_idx - 1].1;
        let arrives = windows[next_idx].0;

        let duration = arrives - departed;
        let ratio = if duration > 0 {
            (f64::from(now - departed) / f64::from(duration)).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let (latitude, longitude) = self.locate(trip_id, from, to, ratio).await?;

        let base_minutes = i64::from((arrives - now).max(0) + 59) / 60;
        let mut position = BusPosition {
            bus_id: bus_id(trip_id),
            bus_label: trip_id.to_string(),
            route_id: route_id.to_string(),
            route_name: route_name.to_string(),
            status: BusStatus::Moving,
            operational: true,
            latitude: Some(latitude),
            longitude: Some(longitude),
            current_stop: self.stop_ref(&from.stop_id),
            next_stop: self.stop_ref(&to.stop_id),
            progress_percent: ratio * 100.0,
            minutes_to_next_stop: base_minutes,
            tidal_delay_applied: false,
            estimated_delay_minutes: 0,
            tidal_impact_level: ImpactLevel::None,
            estimated_arrival_time: None,
        };
        self.apply_tidal_impact(&mut position, route_id, base_minutes, now)
            .await;
        Some(position)
    }

    async fn at_stop(
        &self,
        trip_id: &str,
        route_id: &str,
        route_name: &str,
        stop_times: &[GtfsStopTime],
        windows: &[(i32, i32)],
        now: i32,
    ) -> BusPosition {
        let origin = self.stop_ref(&stop_times[0].stop_id);
        let next = self.stop_ref(&stop_times[1].stop_id);
        let next_arrival = windows[1].0;
        let base_minutes = i64::from((next_arrival - now).max(0) + 59) / 60;

        let mut position = BusPosition {
            bus_id: bus_id(trip_id),
            bus_label: trip_id.to_string(),
            route_id: route_id.to_string(),
            route_name: route_name.to_string(),
            status: BusStatus::AtStop,
            operational: true,
            latitude: origin.as_ref().map(|s| s.latitude),
            longitude: origin.as_ref().map(|s| s.longitude),
            current_stop: origin,
            next_stop: next,
            progress_percent: 0.0,
            minutes_to_next_stop: base_minutes,
            tidal_delay_applied: false,
            estimated_delay_minutes: 0,
            tidal_impact_level: ImpactLevel::None,
            estimated_arrival_time: None,
        };
        self.apply_tidal_impact(&mut position, route_id, base_minutes, now)
            .await;
        position
    }

    fn completed(
        &self,
        trip_id: &str,
        route_id: &str,
        route_name: &str,
        stop_times: &[GtfsStopTime],
    ) -> BusPosition {
        let last = self.stop_ref(&stop_times[stop_times.len() - 1].stop_id);
        BusPosition {
            bus_id: bus_id(trip_id),
            bus_label: trip_id.to_string(),
            route_id: route_id.to_string(),
            route_name: route_name.to_string(),
            status: BusStatus::TripCompleted,
            operational: false,
            latitude: last.as_ref().map(|s| s.latitude),
            longitude: last.as_ref().map(|s| s.longitude),
            current_stop: last,
            next_stop: None,
            progress_percent: 100.0,
            minutes_to_next_stop: 0,
            tidal_delay_applied: false,
            estimated_delay_minutes: 0,
            tidal_impact_level: ImpactLevel::None,
            estimated_arrival_time: None,
        }
    }

    fn not_operational(&self, trip_id: &str, route_id: &str, route_name: &str) -> BusPosition {
        BusPosition {
            bus_id: bus_id(trip_id),
            bus_label: trip_id.to_string(),
            route_id: route_id.to_string(),
            route_name: route_name.to_string(),
            status: BusStatus::NotOperational,
            operational: false,
            latitude: None,
            longitude: None,
            current_stop: None,
            next_stop: None,
            progress_percent: 0.0,
            minutes_to_next_stop: 0,
            tidal_delay_applied: false,
            estimated_delay_minutes: 0,
            tidal_impact_level: ImpactLevel::None,
            estimated_arrival_time: None,
        }
    }

    /// Place the bus along the road path between two stops, falling back
    /// to straight-line interpolation when the path or its stop tags are
    /// unusable. None only when both stops are missing from the index.
    async fn locate(
        &self,
        trip_id: &str,
        from: &GtfsStopTime,
        to: &GtfsStopTime,
        ratio: f64,
    ) -> Option<(f64, f64)> {
        if let Ok(path) = self.paths.path_for_trip(trip_id).await {
            if let Some(segment) = segment_between(&path, &from.stop_id, &to.stop_id) {
                if segment.len() >= 2 {
                    let target = segment_length_km(segment) * ratio;
                    return Some(point_at_distance(segment, target));
                }
            }
        }

        let from_stop = self.schedule.stop(&from.stop_id)?;
        let to_stop = self.schedule.stop(&to.stop_id)?;
        Some((
            from_stop.lat + (to_stop.lat - from_stop.lat) * ratio,
            from_stop.lon + (to_stop.lon - from_stop.lon) * ratio,
        ))
    }

    fn stop_ref(&self, stop_id: &str) -> Option<StopRef> {
        self.schedule.stop(stop_id).map(|s| StopRef {
            stop_id: s.stop_id.clone(),
            stop_name: s.display_name().to_string(),
            latitude: s.lat,
            longitude: s.lon,
        })
    }

    /// Stretch the next-stop ETA by the route's current impact. Shutdown
    /// reclassifies the bus; anything short of that only adjusts minutes.
    async fn apply_tidal_impact(
        &self,
        position: &mut BusPosition,
        route_id: &str,
        base_minutes: i64,
        now: i32,
    ) {
        let impact = self.impact.impact(route_id).await;

        let adjusted = if impact.impact_level != ImpactLevel::None {
            let adjusted = (base_minutes as f64 * impact.delay_multiplier).ceil() as i64;
            position.tidal_delay_applied = true;
            position.estimated_delay_minutes = impact.estimated_delay_minutes;
            position.tidal_impact_level = impact.impact_level;
            if impact.impact_level == ImpactLevel::Shutdown {
                warn!(
                    route_id,
                    bus_label = position.bus_label,
                    "Tidal shutdown in effect, bus marked non-operational"
                );
                position.operational = false;
                position.status = BusStatus::TidalShutdown;
            }
            adjusted
        } else {
            base_minutes
        };

        position.minutes_to_next_stop = adjusted;
        position.estimated_arrival_time =
            Some(format_gtfs_time(now + (adjusted as i32).saturating_mul(60)));
    }
}

/// The (arrival, departure) windows of a trip, validated: at least two
/// stop-times, every time present, and the flattened sequence
/// non-decreasing. None marks the trip as inconsistent.
fn time_windows(stop_times: &[GtfsStopTime]) -> Option<Vec<(i32, i32)>> {
    if stop_times.len() < 2 {
        return None;
    }
    let windows: Vec<(i32, i32)> = stop_times
        .iter()
        .map(effective_times)
        .collect::<Option<_>>()?;

    let mut previous = 0;
    for &(arrival, departure) in &windows {
        if arrival < previous || departure < arrival {
            return None;
        }
        previous = departure;
    }
    Some(windows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::RwLock;

    use crate::config::RoutingConfig;
    use crate::providers::gtfs::{parse_gtfs_time, GtfsRoute, GtfsStop, GtfsTrip};
    use crate::providers::routing::RoutingClient;
    use crate::providers::tidal::TidalReading;
    use crate::sync::ReadingStore;

    fn stop_time(seq: i32, stop_id: &str, arrival: &str, departure: &str) -> GtfsStopTime {
        GtfsStopTime {
            stop_sequence: seq,
            stop_id: stop_id.to_string(),
            arrival_time: parse_gtfs_time(arrival),
            departure_time: parse_gtfs_time(departure),
        }
    }

    fn schedule() -> Arc<ScheduleIndex> {
        let mut stops = HashMap::new();
        for (id, lat, lon) in [
            ("DUD", 7.0890, 171.3803),
            ("RITA", 7.1178, 171.3608),
            ("DELAP", 7.0930, 171.3780),
        ] {
            stops.insert(
                id.to_string(),
                GtfsStop {
                    stop_id: id.to_string(),
                    stop_name: Some(id.to_string()),
                    lat,
                    lon,
                },
            );
        }

        let mut routes = HashMap::new();
        routes.insert(
            "ROUTE_A".to_string(),
            GtfsRoute {
                route_id: "ROUTE_A".to_string(),
                route_short_name: Some("Route A".to_string()),
                route_long_name: None,
                route_type: Some(3),
            },
        );

        let mut trips = HashMap::new();
        trips.insert(
            "ROUTE_A_BUS1_TRIP001".to_string(),
            GtfsTrip {
                trip_id: "ROUTE_A_BUS1_TRIP001".to_string(),
                route_id: "ROUTE_A".to_string(),
                service_id: "daily".to_string(),
                trip_headsign: None,
                direction_id: None,
            },
        );

        let mut stop_times = HashMap::new();
        stop_times.insert(
            "ROUTE_A_BUS1_TRIP001".to_string(),
            vec![
                stop_time(1, "DUD", "08:00:00", "08:00:00"),
                stop_time(2, "RITA", "08:20:00", "08:20:00"),
                stop_time(3, "DELAP", "08:40:00", "08:40:00"),
            ],
        );

        Arc::new(ScheduleIndex::from_parts(
            stops,
            routes,
            trips,
            stop_times,
            HashMap::new(),
        ))
    }

    fn engine_with_reading(height: f64, direction: f64) -> PositionEngine {
        let schedule = schedule();
        // Unreachable routing endpoint keeps path construction on the
        // straight-line fallback without waiting on a real server
        let routing = RoutingClient::new(RoutingConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout_secs: 1,
            max_waypoints: 100,
        })
        .unwrap();
        let paths = Arc::new(RoutePathCache::new(schedule.clone(), routing));
        let store: ReadingStore = Arc::new(RwLock::new(TidalReading {
            wave_height: height,
            wave_direction: direction,
            ..TidalReading::default_reading()
        }));
        let impact = Arc::new(TidalImpactCalculator::new(store));
        PositionEngine::new(schedule, paths, impact)
    }

    #[test]
    fn bus_id_is_stable_and_order_sensitive() {
        assert_eq!(bus_id("ROUTE_A_BUS1_TRIP001"), bus_id("ROUTE_A_BUS1_TRIP001"));
        assert_ne!(bus_id("ROUTE_A_BUS1_TRIP001"), bus_id("ROUTE_A_BUS1_TRIP002"));
        // Known polynomial values
        assert_eq!(bus_id(""), 0);
        assert_eq!(bus_id("a"), 97);
        assert_eq!(bus_id("ab"), 31 * 97 + 98);
    }

    #[test]
    fn time_windows_reject_inconsistent_trips() {
        assert!(time_windows(&[]).is_none());
        assert!(time_windows(&[stop_time(1, "DUD", "08:00:00", "08:00:00")]).is_none());
        // Times going backwards (e.g. wrapped past midnight) are rejected
        assert!(time_windows(&[
            stop_time(1, "DUD", "23:50:00", "23:50:00"),
            stop_time(2, "RITA", "00:10:00", "00:10:00"),
        ])
        .is_none());
        assert!(time_windows(&[
            stop_time(1, "DUD", "08:00:00", "08:00:00"),
            stop_time(2, "RITA", "08:20:00", "08:20:00"),
        ])
        .is_some());
    }

    #[tokio::test]
    async fn unknown_trip_is_not_found() {
        let engine = engine_with_reading(1.0, 180.0);
        let err = engine.position("NOPE", 0).await.unwrap_err();
        assert!(matches!(err, TwinError::TripNotFound(_)));
    }

    #[tokio::test]
    async fn midway_between_stops_is_moving_at_half_progress() {
        let engine = engine_with_reading(1.0, 180.0);
        let pos = engine
            .position("ROUTE_A_BUS1_TRIP001", parse_gtfs_time("08:10:00").unwrap())
            .await
            .unwrap();

        assert_eq!(pos.status, BusStatus::Moving);
        assert!(pos.operational);
        assert!((pos.progress_percent - 50.0).abs() < 0.01);
        assert_eq!(pos.minutes_to_next_stop, 10);
        assert!(!pos.tidal_delay_applied);
        assert_eq!(pos.tidal_impact_level, ImpactLevel::None);
        assert_eq!(pos.estimated_arrival_time.as_deref(), Some("08:20:00"));
        assert_eq!(pos.current_stop.as_ref().unwrap().stop_id, "DUD");
        assert_eq!(pos.next_stop.as_ref().unwrap().stop_id, "RITA");

        // Midpoint of the straight line between DUD and RITA
        let lat = pos.latitude.unwrap();
        assert!((lat - (7.0890 + 7.1178) / 2.0).abs() < 1e-6, "lat {lat}");
    }

    #[tokio::test]
    async fn major_delays_stretch_the_eta() {
        let engine = engine_with_reading(4.5, 180.0);
        let pos = engine
            .position("ROUTE_A_BUS1_TRIP001", parse_gtfs_time("08:10:00").unwrap())
            .await
            .unwrap();

        assert_eq!(pos.status, BusStatus::Moving);
        assert!(pos.tidal_delay_applied);
        assert_eq!(pos.tidal_impact_level, ImpactLevel::MajorDelays);
        // ceil(10 * 1.5) = 15
        assert_eq!(pos.minutes_to_next_stop, 15);
        // ceil(40 * 0.5) = 20 for ROUTE_A
        assert_eq!(pos.estimated_delay_minutes, 20);
        assert_eq!(pos.estimated_arrival_time.as_deref(), Some("08:25:00"));
    }

    #[tokio::test]
    async fn shutdown_overrides_moving() {
        let engine = engine_with_reading(5.5, 180.0);
        let pos = engine
            .position("ROUTE_A_BUS1_TRIP001", parse_gtfs_time("08:10:00").unwrap())
            .await
            .unwrap();

        assert_eq!(pos.status, BusStatus::TidalShutdown);
        assert!(!pos.operational);
        assert!(pos.tidal_delay_applied);
        assert_eq!(pos.tidal_impact_level, ImpactLevel::Shutdown);
        assert_eq!(pos.minutes_to_next_stop, 0);
    }

    #[tokio::test]
    async fn high_seas_from_an_unexposed_sector_change_nothing() {
        let engine = engine_with_reading(5.5, 90.0);
        let pos = engine
            .position("ROUTE_A_BUS1_TRIP001", parse_gtfs_time("08:10:00").unwrap())
            .await
            .unwrap();

        assert_eq!(pos.status, BusStatus::Moving);
        assert!(!pos.tidal_delay_applied);
        assert_eq!(pos.minutes_to_next_stop, 10);
    }

    #[tokio::test]
    async fn before_first_arrival_is_not_operational() {
        let engine = engine_with_reading(5.5, 180.0);
        let pos = engine
            .position("ROUTE_A_BUS1_TRIP001", parse_gtfs_time("07:30:00").unwrap())
            .await
            .unwrap();

        assert_eq!(pos.status, BusStatus::NotOperational);
        assert!(!pos.operational);
        assert_eq!(pos.progress_percent, 0.0);
        assert_eq!(pos.minutes_to_next_stop, 0);
        assert!(pos.latitude.is_none());
        // Not reclassified by the shutdown: the bus is not on the road
        assert_eq!(pos.tidal_impact_level, ImpactLevel::None);
    }

    #[tokio::test]
    async fn after_last_arrival_is_completed() {
        let engine = engine_with_reading(5.5, 180.0);
        let pos = engine
            .position("ROUTE_A_BUS1_TRIP001", parse_gtfs_time("09:00:00").unwrap())
            .await
            .unwrap();

        assert_eq!(pos.status, BusStatus::TripCompleted);
        assert!(!pos.operational);
        assert_eq!(pos.progress_percent, 100.0);
        assert!(!pos.tidal_delay_applied);
        assert_eq!(pos.current_stop.as_ref().unwrap().stop_id, "DELAP");
        assert!(pos.next_stop.is_none());
        assert!(pos.estimated_arrival_time.is_none());
    }

    #[tokio::test]
    async fn boundary_instants_pin_to_stops() {
        let engine = engine_with_reading(1.0, 180.0);

        // Exactly at the origin departure: moving with ratio 0
        let pos = engine
            .position("ROUTE_A_BUS1_TRIP001", parse_gtfs_time("08:00:00").unwrap())
            .await
            .unwrap();
        assert_eq!(pos.status, BusStatus::Moving);
        assert_eq!(pos.progress_percent, 0.0);
        assert!((pos.latitude.unwrap() - 7.0890).abs() < 1e-9);

        // Exactly at the final arrival: completed
        let pos = engine
            .position("ROUTE_A_BUS1_TRIP001", parse_gtfs_time("08:40:00").unwrap())
            .await
            .unwrap();
        assert_eq!(pos.status, BusStatus::TripCompleted);
    }
}
