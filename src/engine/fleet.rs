//! Deduplicated fleet view.
//!
//! The schedule models each physical bus as a chain of trips. This view
//! collapses that chain back into one observable vehicle per bus, showing
//! the trip currently in progress.

use std::sync::Arc;

use futures::future::join_all;

use crate::providers::gtfs::ScheduleIndex;

use super::position::{BusPosition, BusStatus, PositionEngine};
use super::TwinError;

/// Identity of a physical vehicle across its trips.
///
/// Trip ids follow the `ROUTE_X_BUSn_TRIPnnn[_RETURN]` convention; when a
/// trip id matches it, the key is the structured (route, bus number) pair.
/// Ids outside the convention key on the label prefix before `_TRIP`, or
/// the whole label as a last resort, so one odd trip id never merges two
/// vehicles.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VehicleKey {
    Bus { route: String, number: u32 },
    Label(String),
}

impl VehicleKey {
    pub fn from_trip_id(trip_id: &str) -> Self {
        if let Some((route, rest)) = trip_id.split_once("_BUS") {
            let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
            let tail = &rest[digits.len()..];
            if !route.is_empty() && !digits.is_empty() && tail.starts_with("_TRIP") {
                if let Ok(number) = digits.parse() {
                    return VehicleKey::Bus {
                        route: route.to_string(),
                        number,
                    };
                }
            }
        }
        match trip_id.split_once("_TRIP") {
            Some((prefix, _)) if !prefix.is_empty() => VehicleKey::Label(prefix.to_string()),
            _ => VehicleKey::Label(trip_id.to_string()),
        }
    }
}

/// Aggregates per-trip positions into one entry per physical vehicle.
pub struct FleetView {
    schedule: Arc<ScheduleIndex>,
    engine: Arc<PositionEngine>,
}

impl FleetView {
    pub fn new(schedule: Arc<ScheduleIndex>, engine: Arc<PositionEngine>) -> Self {
        Self { schedule, engine }
    }

    /// One position per active physical vehicle at `now`.
    ///
    /// Trips are scanned in sorted trip-id order and non-operational
    /// results dropped, so both the grouping and the fallback
    /// representative are deterministic.
    pub async fn active_positions(&self, now: i32) -> Vec<BusPosition> {
        let positions = self.positions_for(self.schedule.trip_ids(), now).await;
        dedup_by_vehicle(positions)
    }

    /// All operational trip positions on one route, without dedup.
    pub async fn active_trips_for_route(
        &self,
        route_id: &str,
        now: i32,
    ) -> Result<Vec<BusPosition>, TwinError> {
        if self.schedule.route(route_id).is_none() {
            return Err(TwinError::RouteNotFound(route_id.to_string()));
        }
        let trip_ids: Vec<String> = self
            .schedule
            .trips_for_route(route_id)
            .iter()
            .map(|t| t.trip_id.clone())
            .collect();
        Ok(self.positions_for(&trip_ids, now).await)
    }

    async fn positions_for(&self, trip_ids: &[String], now: i32) -> Vec<BusPosition> {
        let lookups = trip_ids.iter().map(|id| self.engine.position(id, now));
        join_all(lookups)
            .await
            .into_iter()
            .flatten()
            .filter(|p| p.operational)
            .collect()
    }
}

/// Collapse trip positions into one per vehicle, preferring the trip
/// actually in progress (MOVING or AT_STOP), else the first of the group.
fn dedup_by_vehicle(positions: Vec<BusPosition>) -> Vec<BusPosition> {
    let mut groups: Vec<(VehicleKey, BusPosition)> = Vec::new();

    for position in positions {
        let key = VehicleKey::from_trip_id(&position.bus_label);
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, current)) => {
                let current_active =
                    matches!(current.status, BusStatus::Moving | BusStatus::AtStop);
                let candidate_active =
                    matches!(position.status, BusStatus::Moving | BusStatus::AtStop);
                if candidate_active && !current_active {
                    *current = position;
                }
            }
            None => groups.push((key, position)),
        }
    }

    groups.into_iter().map(|(_, p)| p).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::RwLock;

    use crate::config::RoutingConfig;
    use crate::engine::impact::TidalImpactCalculator;
    use crate::engine::path::RoutePathCache;
    use crate::providers::gtfs::{parse_gtfs_time, GtfsRoute, GtfsStop, GtfsStopTime, GtfsTrip};
    use crate::providers::routing::RoutingClient;
    use crate::providers::tidal::TidalReading;

    #[test]
    fn vehicle_key_parses_the_trip_id_convention() {
        assert_eq!(
            VehicleKey::from_trip_id("ROUTE_A_BUS1_TRIP001"),
            VehicleKey::Bus {
                route: "ROUTE_A".to_string(),
                number: 1
            }
        );
        // The return leg belongs to the same vehicle
        assert_eq!(
            VehicleKey::from_trip_id("ROUTE_A_BUS1_TRIP001_RETURN"),
            VehicleKey::from_trip_id("ROUTE_A_BUS1_TRIP003")
        );
        assert_ne!(
            VehicleKey::from_trip_id("ROUTE_A_BUS1_TRIP001"),
            VehicleKey::from_trip_id("ROUTE_A_BUS2_TRIP001")
        );
        assert_ne!(
            VehicleKey::from_trip_id("ROUTE_A_BUS1_TRIP001"),
            VehicleKey::from_trip_id("ROUTE_B_BUS1_TRIP001")
        );
    }

    #[test]
    fn vehicle_key_falls_back_for_odd_ids() {
        assert_eq!(
            VehicleKey::from_trip_id("SHUTTLE_TRIP001"),
            VehicleKey::Label("SHUTTLE".to_string())
        );
        assert_eq!(
            VehicleKey::from_trip_id("morning-run"),
            VehicleKey::Label("morning-run".to_string())
        );
        // "_BUS" with no digits is not the convention
        assert_eq!(
            VehicleKey::from_trip_id("ROUTE_A_BUSX_TRIP001"),
            VehicleKey::Label("ROUTE_A_BUSX".to_string())
        );
    }

    fn stop_time(seq: i32, stop_id: &str, time: &str) -> GtfsStopTime {
        GtfsStopTime {
            stop_sequence: seq,
            stop_id: stop_id.to_string(),
            arrival_time: parse_gtfs_time(time),
            departure_time: parse_gtfs_time(time),
        }
    }

    /// One route, one physical bus, two back-to-back trips.
    fn fleet() -> FleetView {
        let mut stops = HashMap::new();
        for (id, lat, lon) in [("DUD", 7.0890, 171.3803), ("RITA", 7.1178, 171.3608)] {
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
        let mut stop_times = HashMap::new();
        for (trip_id, start, end) in [
            ("ROUTE_A_BUS1_TRIP001", "08:00:00", "08:20:00"),
            ("ROUTE_A_BUS1_TRIP002", "08:30:00", "08:50:00"),
        ] {
            trips.insert(
                trip_id.to_string(),
                GtfsTrip {
                    trip_id: trip_id.to_string(),
                    route_id: "ROUTE_A".to_string(),
                    service_id: "daily".to_string(),
                    trip_headsign: None,
                    direction_id: None,
                },
            );
            stop_times.insert(
                trip_id.to_string(),
                vec![stop_time(1, "DUD", start), stop_time(2, "RITA", end)],
            );
        }

        let schedule = Arc::new(ScheduleIndex::from_parts(
            stops,
            routes,
            trips,
            stop_times,
            HashMap::new(),
        ));
        let routing = RoutingClient::new(RoutingConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout_secs: 1,
            max_waypoints: 100,
        })
        .unwrap();
        let paths = Arc::new(RoutePathCache::new(schedule.clone(), routing));
        let store = Arc::new(RwLock::new(TidalReading {
            wave_height: 1.0,
            ..TidalReading::default_reading()
        }));
        let impact = Arc::new(TidalImpactCalculator::new(store));
        let engine = Arc::new(PositionEngine::new(schedule.clone(), paths, impact));
        FleetView::new(schedule, engine)
    }

    #[tokio::test]
    async fn one_entry_per_physical_bus() {
        let view = fleet();
        // 08:10: trip 1 is moving, trip 2 has not started
        let positions = view
            .active_positions(parse_gtfs_time("08:10:00").unwrap())
            .await;

        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].bus_label, "ROUTE_A_BUS1_TRIP001");
        assert_eq!(positions[0].status, BusStatus::Moving);
    }

    #[tokio::test]
    async fn gap_between_trips_leaves_no_active_bus() {
        let view = fleet();
        // 08:25: trip 1 completed, trip 2 not yet started; neither is
        // operational so the vehicle disappears from the active fleet
        let positions = view
            .active_positions(parse_gtfs_time("08:25:00").unwrap())
            .await;
        assert!(positions.is_empty());
    }

    #[tokio::test]
    async fn second_trip_takes_over_after_the_first() {
        let view = fleet();
        let positions = view
            .active_positions(parse_gtfs_time("08:40:00").unwrap())
            .await;

        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].bus_label, "ROUTE_A_BUS1_TRIP002");
    }

    #[tokio::test]
    async fn route_trips_are_not_deduplicated() {
        let view = fleet();
        let positions = view
            .active_trips_for_route("ROUTE_A", parse_gtfs_time("08:10:00").unwrap())
            .await
            .unwrap();
        // Only the in-progress trip is operational at this instant
        assert_eq!(positions.len(), 1);

        let err = view
            .active_trips_for_route("ROUTE_X", 0)
            .await
            .unwrap_err();
        assert!(matches!(err, TwinError::RouteNotFound(_)));
    }

    #[test]
    fn dedup_prefers_the_in_progress_trip() {
        fn pos(label: &str, status: BusStatus) -> BusPosition {
            BusPosition {
                bus_id: 0,
                bus_label: label.to_string(),
                route_id: "ROUTE_A".to_string(),
                route_name: "Route A".to_string(),
                status,
                operational: true,
                latitude: None,
                longitude: None,
                current_stop: None,
                next_stop: None,
                progress_percent: 0.0,
                minutes_to_next_stop: 0,
                tidal_delay_applied: false,
                estimated_delay_minutes: 0,
                tidal_impact_level: crate::engine::impact::ImpactLevel::None,
                estimated_arrival_time: None,
            }
        }

        let deduped = dedup_by_vehicle(vec![
            pos("ROUTE_A_BUS1_TRIP001", BusStatus::TripCompleted),
            pos("ROUTE_A_BUS1_TRIP002", BusStatus::Moving),
            pos("ROUTE_A_BUS2_TRIP001", BusStatus::AtStop),
        ]);

        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].bus_label, "ROUTE_A_BUS1_TRIP002");
        assert_eq!(deduped[1].bus_label, "ROUTE_A_BUS2_TRIP001");
    }
}
