use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Allowed CORS origins. Required unless cors_permissive is true.
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Explicitly allow all origins (development only). Defaults to false.
    #[serde(default)]
    pub cors_permissive: bool,
    /// Static GTFS schedule configuration
    #[serde(default)]
    pub gtfs: GtfsConfig,
    /// Tidal reading feed configuration
    #[serde(default)]
    pub tidal: TidalConfig,
    /// Road-network routing (OSRM) configuration
    #[serde(default)]
    pub routing: RoutingConfig,
}

/// Configuration for the static GTFS schedule loader
#[derive(Debug, Clone, Deserialize)]
pub struct GtfsConfig {
    /// Directory containing the GTFS .txt files (default: "gtfs")
    #[serde(default = "GtfsConfig::default_data_dir")]
    pub data_dir: String,
    /// Local wall-clock timezone for schedule times (default: Pacific/Majuro)
    #[serde(default = "GtfsConfig::default_timezone")]
    pub timezone: String,
}

impl Default for GtfsConfig {
    fn default() -> Self {
        Self {
            data_dir: Self::default_data_dir(),
            timezone: Self::default_timezone(),
        }
    }
}

impl GtfsConfig {
    fn default_data_dir() -> String {
        "gtfs".to_string()
    }
    fn default_timezone() -> String {
        "Pacific/Majuro".to_string()
    }

    /// Parse the configured timezone, falling back to UTC if invalid.
    pub fn parsed_timezone(&self) -> chrono_tz::Tz {
        self.timezone.parse().unwrap_or(chrono_tz::UTC)
    }
}

/// Configuration for the CDIP wave-buoy feed and the reading rotation
#[derive(Debug, Clone, Deserialize)]
pub struct TidalConfig {
    /// ERDDAP tabledap endpoint returning the wave aggregate as JSON
    #[serde(default = "TidalConfig::default_feed_url")]
    pub feed_url: String,
    /// CDIP station id to query (default: "163", Majuro)
    #[serde(default = "TidalConfig::default_station_id")]
    pub station_id: String,
    /// Seconds between rotation steps through the historical readings
    /// (default: 600 — ten real minutes simulate one hour of buoy data)
    #[serde(default = "TidalConfig::default_rotation_interval_secs")]
    pub rotation_interval_secs: u64,
    /// Number of initial fetch attempts before falling back to synthetic data
    #[serde(default = "TidalConfig::default_fetch_retries")]
    pub fetch_retries: u32,
}

impl Default for TidalConfig {
    fn default() -> Self {
        Self {
            feed_url: Self::default_feed_url(),
            station_id: Self::default_station_id(),
            rotation_interval_secs: Self::default_rotation_interval_secs(),
            fetch_retries: Self::default_fetch_retries(),
        }
    }
}

impl TidalConfig {
    fn default_feed_url() -> String {
        "https://erddap.cdip.ucsd.edu/erddap/tabledap/wave_agg.json".to_string()
    }
    fn default_station_id() -> String {
        "163".to_string()
    }
    fn default_rotation_interval_secs() -> u64 {
        600
    }
    fn default_fetch_retries() -> u32 {
        3
    }
}

/// Configuration for the OSRM routing client
#[derive(Debug, Clone, Deserialize)]
pub struct RoutingConfig {
    /// OSRM base URL (default: the public demo server)
    #[serde(default = "RoutingConfig::default_base_url")]
    pub base_url: String,
    /// Per-request timeout in seconds (default: 10)
    #[serde(default = "RoutingConfig::default_timeout_secs")]
    pub timeout_secs: u64,
    /// Maximum waypoints per request; above this, routing falls back to
    /// pairwise calls (default: 100)
    #[serde(default = "RoutingConfig::default_max_waypoints")]
    pub max_waypoints: usize,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            base_url: Self::default_base_url(),
            timeout_secs: Self::default_timeout_secs(),
            max_waypoints: Self::default_max_waypoints(),
        }
    }
}

impl RoutingConfig {
    fn default_base_url() -> String {
        "https://router.project-osrm.org".to_string()
    }
    fn default_timeout_secs() -> u64 {
        10
    }
    fn default_max_waypoints() -> usize {
        100
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::ReadError(e.to_string()))?;

        serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    pub fn validate(&self) {
        if self.tidal.rotation_interval_secs == 0 {
            panic!("tidal.rotation_interval_secs must be greater than zero");
        }
        if self.routing.max_waypoints < 2 {
            panic!("routing.max_waypoints must be at least 2");
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),
    #[error("Failed to parse config: {0}")]
    ParseError(String),
}
