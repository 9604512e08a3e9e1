use std::collections::HashMap;
use std::path::Path;

use chrono::NaiveDate;
use tracing::{info, warn};

use super::error::GtfsError;

// --- Public types for the in-memory schedule ---

/// A GTFS stop (from stops.txt).
///
/// Records without parseable coordinates are skipped at load time, so every
/// stop in the index can be placed on the map.
#[derive(Debug, Clone)]
pub struct GtfsStop {
    pub stop_id: String,
    pub stop_name: Option<String>,
    pub lat: f64,
    pub lon: f64,
}

impl GtfsStop {
    /// Display name, falling back to the stop id.
    pub fn display_name(&self) -> &str {
        self.stop_name.as_deref().unwrap_or(&self.stop_id)
    }
}

/// A GTFS route (from routes.txt).
#[derive(Debug, Clone)]
pub struct GtfsRoute {
    pub route_id: String,
    pub route_short_name: Option<String>,
    pub route_long_name: Option<String>,
    pub route_type: Option<i32>,
}

/// A GTFS trip (from trips.txt).
#[derive(Debug, Clone)]
pub struct GtfsTrip {
    pub trip_id: String,
    pub route_id: String,
    pub service_id: String,
    pub trip_headsign: Option<String>,
    pub direction_id: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct GtfsStopTime {
    pub stop_sequence: i32,
    pub stop_id: String,
    /// Seconds since midnight, normalized into [0, 86400)
    pub arrival_time: Option<i32>,
    /// Seconds since midnight, normalized into [0, 86400)
    pub departure_time: Option<i32>,
}

/// A GTFS calendar entry (from calendar.txt, optional file).
#[derive(Debug, Clone)]
pub struct GtfsCalendar {
    pub service_id: String,
    pub days: [bool; 7], // mon, tue, wed, thu, fri, sat, sun
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// The full in-memory schedule, immutable after loading.
///
/// `loaded_at` tracks when the schedule was parsed, used by the health
/// endpoint.
#[derive(Debug)]
pub struct ScheduleIndex {
    pub stops: HashMap<String, GtfsStop>,
    pub routes: HashMap<String, GtfsRoute>,
    pub trips: HashMap<String, GtfsTrip>,
    /// trip_id -> stop_times ordered by stop_sequence
    pub stop_times: HashMap<String, Vec<GtfsStopTime>>,
    pub calendars: HashMap<String, GtfsCalendar>,
    /// All trip ids in sorted order, for deterministic fleet iteration
    sorted_trip_ids: Vec<String>,
    pub loaded_at: chrono::DateTime<chrono::Utc>,
}

impl ScheduleIndex {
    /// Assemble an index from parsed parts, deriving the sorted trip-id
    /// index. Used by the loader and by fixture-building tests.
    pub fn from_parts(
        stops: HashMap<String, GtfsStop>,
        routes: HashMap<String, GtfsRoute>,
        trips: HashMap<String, GtfsTrip>,
        stop_times: HashMap<String, Vec<GtfsStopTime>>,
        calendars: HashMap<String, GtfsCalendar>,
    ) -> Self {
        let mut sorted_trip_ids: Vec<String> = trips.keys().cloned().collect();
        sorted_trip_ids.sort();
        Self {
            stops,
            routes,
            trips,
            stop_times,
            calendars,
            sorted_trip_ids,
            loaded_at: chrono::Utc::now(),
        }
    }

    pub fn stop(&self, stop_id: &str) -> Option<&GtfsStop> {
        self.stops.get(stop_id)
    }

    pub fn route(&self, route_id: &str) -> Option<&GtfsRoute> {
        self.routes.get(route_id)
    }

    pub fn trip(&self, trip_id: &str) -> Option<&GtfsTrip> {
        self.trips.get(trip_id)
    }

    /// Ordered stop-times for a trip. A known trip with no stop_times entry
    /// yields an empty slice.
    pub fn stop_times_for(&self, trip_id: &str) -> &[GtfsStopTime] {
        self.stop_times
            .get(trip_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All trip ids, sorted, so fleet scans iterate deterministically.
    pub fn trip_ids(&self) -> &[String] {
        &self.sorted_trip_ids
    }

    /// Trips serving a route, in trip-id order.
    pub fn trips_for_route(&self, route_id: &str) -> Vec<&GtfsTrip> {
        self.sorted_trip_ids
            .iter()
            .filter_map(|id| self.trips.get(id))
            .filter(|t| t.route_id == route_id)
            .collect()
    }

    /// The next scheduled arrivals at a stop, at or after `now` (seconds
    /// since midnight), ascending by arrival time.
    pub fn upcoming_arrivals(
        &self,
        stop_id: &str,
        now: i32,
        limit: usize,
    ) -> Vec<(&GtfsTrip, &GtfsStopTime)> {
        let mut arrivals: Vec<(&GtfsTrip, &GtfsStopTime)> = Vec::new();
        for trip_id in &self.sorted_trip_ids {
            let Some(trip) = self.trips.get(trip_id) else {
                continue;
            };
            for st in self.stop_times_for(trip_id) {
                if st.stop_id != stop_id {
                    continue;
                }
                if st.arrival_time.is_some_and(|a| a >= now) {
                    arrivals.push((trip, st));
                }
            }
        }
        arrivals.sort_by_key(|(_, st)| st.arrival_time);
        arrivals.truncate(limit);
        arrivals
    }
}

// --- Helper functions ---

/// Parse a GTFS time string "H:MM:SS" to seconds since midnight.
/// Hours >= 24 (trips past midnight) are normalized onto a same-day clock.
pub fn parse_gtfs_time(time_str: &str) -> Option<i32> {
    let parts: Vec<&str> = time_str.split(':').collect();
    if parts.len() != 3 {
        return None;
    }
    let hours: i32 = parts[0].parse().ok()?;
    let minutes: i32 = parts[1].parse().ok()?;
    let seconds: i32 = parts[2].parse().ok()?;
    if hours < 0 || !(0..60).contains(&minutes) || !(0..60).contains(&seconds) {
        return None;
    }
    Some((hours % 24) * 3600 + minutes * 60 + seconds)
}

/// Format seconds since midnight as "HH:MM:SS", wrapping at midnight.
pub fn format_gtfs_time(secs: i32) -> String {
    let s = secs.rem_euclid(86400);
    format!("{:02}:{:02}:{:02}", s / 3600, (s % 3600) / 60, s % 60)
}

/// Parse a GTFS date string "YYYYMMDD" to NaiveDate.
fn parse_gtfs_date(s: &str) -> Option<NaiveDate> {
    if s.len() != 8 {
        return None;
    }
    let year: i32 = s[0..4].parse().ok()?;
    let month: u32 = s[4..6].parse().ok()?;
    let day: u32 = s[6..8].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

// --- Directory loading ---

/// Load the GTFS directory into an in-memory schedule (blocking — call on
/// spawn_blocking).
pub fn load_schedule(dir: &Path) -> Result<ScheduleIndex, GtfsError> {
    if !dir.is_dir() {
        return Err(GtfsError::ParseError(format!(
            "GTFS directory not found: {}",
            dir.display()
        )));
    }

    let stops = parse_stops(&dir.join("stops.txt"))?;
    info!(count = stops.len(), "Parsed GTFS stops");

    let routes = parse_routes(&dir.join("routes.txt"))?;
    info!(count = routes.len(), "Parsed GTFS routes");

    let trips = parse_trips(&dir.join("trips.txt"))?;
    info!(count = trips.len(), "Parsed GTFS trips");

    let stop_times = parse_stop_times(&dir.join("stop_times.txt"))?;
    let total_st: usize = stop_times.values().map(|v| v.len()).sum();
    info!(
        trips_with_times = stop_times.len(),
        total_stop_times = total_st,
        "Parsed GTFS stop_times"
    );

    let calendars = parse_calendar(&dir.join("calendar.txt"));
    info!(count = calendars.len(), "Parsed GTFS calendar");

    Ok(ScheduleIndex::from_parts(
        stops, routes, trips, stop_times, calendars,
    ))
}

fn parse_stops(path: &Path) -> Result<HashMap<String, GtfsStop>, GtfsError> {
    info!("Parsing stops.txt");
    let mut rdr = csv::Reader::from_path(path)?;
    let headers = rdr.headers()?.clone();

    let idx_id = headers
        .iter()
        .position(|h| h == "stop_id")
        .ok_or_else(|| GtfsError::ParseError("stops.txt missing stop_id".into()))?;
    let idx_name = headers.iter().position(|h| h == "stop_name");
    let idx_lat = headers.iter().position(|h| h == "stop_lat");
    let idx_lon = headers.iter().position(|h| h == "stop_lon");

    let mut stops = HashMap::new();
    let mut skipped = 0usize;
    for result in rdr.records() {
        let record = result?;
        let stop_id = record.get(idx_id).unwrap_or("").to_string();
        let lat: Option<f64> = idx_lat
            .and_then(|i| record.get(i))
            .and_then(|s| s.parse().ok());
        let lon: Option<f64> = idx_lon
            .and_then(|i| record.get(i))
            .and_then(|s| s.parse().ok());
        let (Some(lat), Some(lon)) = (lat, lon) else {
            skipped += 1;
            continue;
        };
        if stop_id.is_empty() {
            skipped += 1;
            continue;
        }
        stops.insert(
            stop_id.clone(),
            GtfsStop {
                stop_id,
                stop_name: idx_name.and_then(|i| record.get(i)).and_then(non_empty),
                lat,
                lon,
            },
        );
    }
    if skipped > 0 {
        warn!(skipped, "Skipped stops.txt records (empty id or bad coords)");
    }
    Ok(stops)
}

fn parse_routes(path: &Path) -> Result<HashMap<String, GtfsRoute>, GtfsError> {
    info!("Parsing routes.txt");
    let mut rdr = csv::Reader::from_path(path)?;
    let headers = rdr.headers()?.clone();

    let idx_id = headers
        .iter()
        .position(|h| h == "route_id")
        .ok_or_else(|| GtfsError::ParseError("routes.txt missing route_id".into()))?;
    let idx_short = headers.iter().position(|h| h == "route_short_name");
    let idx_long = headers.iter().position(|h| h == "route_long_name");
    let idx_type = headers.iter().position(|h| h == "route_type");

    let mut routes = HashMap::new();
    let mut skipped = 0usize;
    for result in rdr.records() {
        let record = result?;
        let route_id = record.get(idx_id).unwrap_or("").to_string();
        if route_id.is_empty() {
            skipped += 1;
            continue;
        }
        routes.insert(
            route_id.clone(),
            GtfsRoute {
                route_id,
                route_short_name: idx_short.and_then(|i| record.get(i)).and_then(non_empty),
                route_long_name: idx_long.and_then(|i| record.get(i)).and_then(non_empty),
                route_type: idx_type
                    .and_then(|i| record.get(i))
                    .and_then(|s| s.parse().ok()),
            },
        );
    }
    if skipped > 0 {
        warn!(skipped, "Skipped routes.txt records with empty route_id");
    }
    Ok(routes)
}

fn parse_trips(path: &Path) -> Result<HashMap<String, GtfsTrip>, GtfsError> {
    info!("Parsing trips.txt");
    let mut rdr = csv::Reader::from_path(path)?;
    let headers = rdr.headers()?.clone();

    let idx_trip = headers
        .iter()
        .position(|h| h == "trip_id")
        .ok_or_else(|| GtfsError::ParseError("trips.txt missing trip_id".into()))?;
    let idx_route = headers
        .iter()
        .position(|h| h == "route_id")
        .ok_or_else(|| GtfsError::ParseError("trips.txt missing route_id".into()))?;
    let idx_service = headers
        .iter()
        .position(|h| h == "service_id")
        .ok_or_else(|| GtfsError::ParseError("trips.txt missing service_id".into()))?;
    let idx_headsign = headers.iter().position(|h| h == "trip_headsign");
    let idx_dir = headers.iter().position(|h| h == "direction_id");

    let mut trips = HashMap::new();
    let mut skipped = 0usize;
    for result in rdr.records() {
        let record = result?;
        let trip_id = record.get(idx_trip).unwrap_or("").to_string();
        if trip_id.is_empty() {
            skipped += 1;
            continue;
        }
        trips.insert(
            trip_id.clone(),
            GtfsTrip {
                trip_id,
                route_id: record.get(idx_route).unwrap_or("").to_string(),
                service_id: record.get(idx_service).unwrap_or("").to_string(),
                trip_headsign: idx_headsign.and_then(|i| record.get(i)).and_then(non_empty),
                direction_id: idx_dir
                    .and_then(|i| record.get(i))
                    .and_then(|s| s.parse().ok()),
            },
        );
    }
    if skipped > 0 {
        warn!(skipped, "Skipped trips.txt records with empty trip_id");
    }
    Ok(trips)
}

fn parse_stop_times(path: &Path) -> Result<HashMap<String, Vec<GtfsStopTime>>, GtfsError> {
    info!("Parsing stop_times.txt");
    let mut rdr = csv::Reader::from_path(path)?;
    let headers = rdr.headers()?.clone();

    let idx_trip = headers
        .iter()
        .position(|h| h == "trip_id")
        .ok_or_else(|| GtfsError::ParseError("stop_times.txt missing trip_id".into()))?;
    let idx_seq = headers
        .iter()
        .position(|h| h == "stop_sequence")
        .ok_or_else(|| GtfsError::ParseError("stop_times.txt missing stop_sequence".into()))?;
    let idx_stop = headers
        .iter()
        .position(|h| h == "stop_id")
        .ok_or_else(|| GtfsError::ParseError("stop_times.txt missing stop_id".into()))?;
    let idx_arr = headers.iter().position(|h| h == "arrival_time");
    let idx_dep = headers.iter().position(|h| h == "departure_time");

    let mut stop_times: HashMap<String, Vec<GtfsStopTime>> = HashMap::new();
    let mut skipped = 0usize;
    for result in rdr.records() {
        let record = result?;
        let trip_id = record.get(idx_trip).unwrap_or("").to_string();
        if trip_id.is_empty() {
            skipped += 1;
            continue;
        }
        let st = GtfsStopTime {
            stop_sequence: record
                .get(idx_seq)
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            stop_id: record.get(idx_stop).unwrap_or("").to_string(),
            arrival_time: idx_arr.and_then(|i| record.get(i)).and_then(parse_gtfs_time),
            departure_time: idx_dep.and_then(|i| record.get(i)).and_then(parse_gtfs_time),
        };
        stop_times.entry(trip_id).or_default().push(st);
    }
    if skipped > 0 {
        warn!(skipped, "Skipped stop_times.txt records with empty trip_id");
    }

    // Sort each trip's stop_times by stop_sequence
    for sts in stop_times.values_mut() {
        sts.sort_by_key(|st| st.stop_sequence);
    }

    Ok(stop_times)
}

fn parse_calendar(path: &Path) -> HashMap<String, GtfsCalendar> {
    info!("Parsing calendar.txt");
    let mut rdr = match csv::Reader::from_path(path) {
        Ok(r) => r,
        Err(_) => {
            info!("No calendar.txt in GTFS directory (optional file)");
            return HashMap::new();
        }
    };
    let headers = match rdr.headers() {
        Ok(h) => h.clone(),
        Err(_) => return HashMap::new(),
    };

    let idx_service = headers.iter().position(|h| h == "service_id");
    let idx_days = [
        "monday",
        "tuesday",
        "wednesday",
        "thursday",
        "friday",
        "saturday",
        "sunday",
    ]
    .map(|day| headers.iter().position(|h| h == day));
    let idx_start = headers.iter().position(|h| h == "start_date");
    let idx_end = headers.iter().position(|h| h == "end_date");

    let Some(idx_service) = idx_service else {
        return HashMap::new();
    };

    let mut calendars = HashMap::new();
    let mut skipped = 0usize;
    for result in rdr.records() {
        let Ok(record) = result else {
            skipped += 1;
            continue;
        };
        let service_id = record.get(idx_service).unwrap_or("").to_string();
        if service_id.is_empty() {
            skipped += 1;
            continue;
        }

        let days = idx_days.map(|idx| {
            idx.and_then(|i| record.get(i))
                .and_then(|s| s.parse::<i32>().ok())
                .map(|v| v == 1)
                .unwrap_or(false)
        });

        let start_date = idx_start.and_then(|i| record.get(i)).and_then(parse_gtfs_date);
        let end_date = idx_end.and_then(|i| record.get(i)).and_then(parse_gtfs_date);

        let (Some(start_date), Some(end_date)) = (start_date, end_date) else {
            skipped += 1;
            continue;
        };

        calendars.insert(
            service_id.clone(),
            GtfsCalendar {
                service_id,
                days,
                start_date,
                end_date,
            },
        );
    }
    if skipped > 0 {
        warn!(skipped, "Skipped calendar.txt records (empty/unparseable)");
    }
    calendars
}
