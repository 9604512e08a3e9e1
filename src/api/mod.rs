pub mod buses;
pub mod error;
pub mod health;
pub mod routes;
pub mod stops;
pub mod tidal;

pub use error::{not_found, ApiError, ErrorResponse};

use std::sync::Arc;

use axum::Router;
use chrono::Timelike;
use serde::Deserialize;
use tokio::sync::RwLock;
use utoipa::IntoParams;

use crate::engine::{FleetView, PositionEngine, RoutePathCache, TidalImpactCalculator};
use crate::providers::gtfs::{parse_gtfs_time, ScheduleIndex};
use crate::sync::{HistoricalStore, ReadingRotation, ReadingStore};

/// Shared handles behind every endpoint. Cheap to clone; everything inside
/// is an Arc over immutable or lock-guarded data.
#[derive(Clone)]
pub struct TwinState {
    pub schedule: Arc<ScheduleIndex>,
    pub paths: Arc<RoutePathCache>,
    pub impact: Arc<TidalImpactCalculator>,
    pub engine: Arc<PositionEngine>,
    pub fleet: Arc<FleetView>,
    pub current_reading: ReadingStore,
    pub historical: HistoricalStore,
    pub rotation: Arc<RwLock<ReadingRotation>>,
    pub station_id: String,
    pub timezone: chrono_tz::Tz,
}

/// Optional simulated wall clock accepted by position-reporting endpoints.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct TimeQuery {
    /// Simulated local time as HH:MM:SS; defaults to the current
    /// Pacific/Majuro wall clock
    pub at: Option<String>,
}

impl TimeQuery {
    /// The queried instant in seconds since local midnight.
    pub fn resolve(&self, timezone: chrono_tz::Tz) -> i32 {
        self.at
            .as_deref()
            .and_then(parse_gtfs_time)
            .unwrap_or_else(|| {
                chrono::Utc::now()
                    .with_timezone(&timezone)
                    .num_seconds_from_midnight() as i32
            })
    }
}

/// Expand the `A`/`B` shorthand into the feed's full route ids.
pub fn canonical_route_id(raw: &str) -> String {
    match raw {
        "A" | "B" => format!("ROUTE_{raw}"),
        _ => raw.to_string(),
    }
}

pub fn router(state: TwinState) -> Router {
    Router::new()
        .nest("/buses", buses::router(state.clone()))
        .nest("/routes", routes::router(state.clone()))
        .nest("/stops", stops::router(state.clone()))
        .nest("/tidal", tidal::router(state.clone()))
        .nest("/health", health::router(state))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_shorthand_expands() {
        assert_eq!(canonical_route_id("A"), "ROUTE_A");
        assert_eq!(canonical_route_id("B"), "ROUTE_B");
        assert_eq!(canonical_route_id("ROUTE_A"), "ROUTE_A");
        assert_eq!(canonical_route_id("X"), "X");
    }

    #[test]
    fn time_query_prefers_the_simulated_clock() {
        let query = TimeQuery {
            at: Some("08:30:00".to_string()),
        };
        assert_eq!(query.resolve(chrono_tz::Pacific::Majuro), 30600);
    }

    #[test]
    fn unparseable_time_falls_back_to_the_wall_clock() {
        let query = TimeQuery {
            at: Some("later".to_string()),
        };
        let now = query.resolve(chrono_tz::Pacific::Majuro);
        assert!((0..86400).contains(&now));
    }
}
