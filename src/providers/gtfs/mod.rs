//! GTFS-based schedule provider.
//!
//! Loads a static GTFS feed from a local directory of CSV files into an
//! immutable in-memory [`ScheduleIndex`] shared across the whole service.

pub mod error;
pub mod static_data;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::config::GtfsConfig;

pub use error::GtfsError;
pub use static_data::{
    format_gtfs_time, parse_gtfs_time, GtfsRoute, GtfsStop, GtfsStopTime, GtfsTrip, ScheduleIndex,
};

/// Load the configured GTFS directory into memory.
///
/// Parsing is CSV-bound and synchronous, so it runs on a blocking thread.
/// A missing required file or column is startup-fatal.
pub async fn load_schedule_index(config: &GtfsConfig) -> Result<Arc<ScheduleIndex>, GtfsError> {
    let dir = PathBuf::from(&config.data_dir);
    let index = tokio::task::spawn_blocking(move || static_data::load_schedule(&dir)).await??;

    info!(
        stops = index.stops.len(),
        routes = index.routes.len(),
        trips = index.trips.len(),
        "Loaded static GTFS schedule into memory"
    );

    Ok(Arc::new(index))
}
