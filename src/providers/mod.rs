pub mod gtfs;
pub mod routing;
pub mod tidal;
