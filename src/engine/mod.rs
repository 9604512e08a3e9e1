//! The digital-twin computation engine.
//!
//! Derives live bus positions from the static schedule and the wall clock,
//! interpolates them along cached road geometry, and folds the current wave
//! reading into delay estimates. Everything here is computed fresh per query
//! except the memoized road paths.

pub mod fleet;
pub mod impact;
pub mod path;
pub mod position;

use thiserror::Error;

pub use fleet::FleetView;
pub use impact::{ImpactLevel, InundationLevel, RouteImpact, RouteOrientations, TidalImpactCalculator};
pub use path::{RoutePathCache, RoutePathPoint};
pub use position::{BusPosition, BusStatus, PositionEngine, StopRef};

/// Request-level failures. Only "not found" ever reaches the API boundary;
/// upstream failures degrade to fallback values inside the engine.
#[derive(Debug, Error)]
pub enum TwinError {
    #[error("Trip not found: {0}")]
    TripNotFound(String),
    #[error("Route not found: {0}")]
    RouteNotFound(String),
    #[error("Stop not found: {0}")]
    StopNotFound(String),
    #[error("Bus not found: {0}")]
    BusNotFound(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_names_the_missing_id() {
        assert_eq!(
            TwinError::TripNotFound("ROUTE_A_BUS1_TRIP001".into()).to_string(),
            "Trip not found: ROUTE_A_BUS1_TRIP001"
        );
        assert_eq!(
            TwinError::RouteNotFound("ROUTE_X".into()).to_string(),
            "Route not found: ROUTE_X"
        );
    }
}
