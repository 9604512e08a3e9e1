//! Background acquisition and rotation of tidal readings.
//!
//! The manager fetches the station's historical wave record once at startup,
//! then walks a cursor through it on a fixed interval, atomically replacing
//! the single "current" reading. Ten real minutes per step simulate roughly
//! an hour of buoy time, so a demo day passes quickly.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::TidalConfig;
use crate::providers::tidal::{synthetic_readings, TidalClient, TidalError, TidalReading};

/// The current reading, atomically replaced by the rotation task.
/// Readers clone the snapshot; a reading is always present.
pub type ReadingStore = Arc<RwLock<TidalReading>>;

/// The full historical sequence, immutable after the initial load.
pub type HistoricalStore = Arc<RwLock<Vec<TidalReading>>>;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Tidal feed error: {0}")]
    TidalError(#[from] TidalError),
}

/// Cursor over the historical sequence. Advanced only by the rotation task;
/// tests drive `advance` directly with injected sequences.
#[derive(Debug, Default)]
pub struct ReadingRotation {
    index: usize,
}

impl ReadingRotation {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Step to the next reading, wrapping at the end of the sequence.
    pub fn advance(&mut self, len: usize) -> usize {
        if len > 0 {
            self.index = (self.index + 1) % len;
        }
        self.index
    }
}

pub struct SyncManager {
    client: TidalClient,
    config: TidalConfig,
    current: ReadingStore,
    historical: HistoricalStore,
    rotation: Arc<RwLock<ReadingRotation>>,
}

impl SyncManager {
    pub fn new(config: TidalConfig) -> Result<Self, SyncError> {
        let client = TidalClient::new(config.clone())?;
        Ok(Self {
            client,
            config,
            current: Arc::new(RwLock::new(TidalReading::default_reading())),
            historical: Arc::new(RwLock::new(Vec::new())),
            rotation: Arc::new(RwLock::new(ReadingRotation::default())),
        })
    }

    /// Get a reference to the current-reading store for engine and API access
    pub fn reading_store(&self) -> ReadingStore {
        self.current.clone()
    }

    /// Get a reference to the historical sequence for API access
    pub fn historical_store(&self) -> HistoricalStore {
        self.historical.clone()
    }

    /// Get a read-only handle on the rotation cursor for the health endpoint
    pub fn rotation(&self) -> Arc<RwLock<ReadingRotation>> {
        self.rotation.clone()
    }

    /// Run the initial fetch and then the rotation loop (runs forever).
    pub async fn start(self: Arc<Self>) {
        info!("Starting tidal sync manager");

        let readings = self.fetch_with_retries().await;
        if let Some(first) = readings.first() {
            info!(
                count = readings.len(),
                wave_height = first.wave_height,
                "Loaded historical tidal readings"
            );
            *self.current.write().await = first.clone();
        }
        *self.historical.write().await = readings;

        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(
            self.config.rotation_interval_secs,
        ));
        // The first tick fires immediately; reading 0 is already current
        interval.tick().await;

        loop {
            interval.tick().await;
            self.rotate().await;
        }
    }

    async fn fetch_with_retries(&self) -> Vec<TidalReading> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.client.fetch_historical().await {
                Ok(readings) if !readings.is_empty() => return readings,
                Ok(_) => {
                    warn!(attempt, "CDIP feed returned no readings");
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Failed to fetch tidal readings");
                }
            }
            if attempt >= self.config.fetch_retries {
                warn!("Falling back to synthetic tidal data");
                return synthetic_readings(&self.config.station_id);
            }
            let wait_secs = 30 * attempt as u64;
            tokio::time::sleep(tokio::time::Duration::from_secs(wait_secs)).await;
        }
    }

    /// Advance the cursor and replace the current reading snapshot.
    pub async fn rotate(&self) {
        let historical = self.historical.read().await;
        if historical.is_empty() {
            warn!("No historical tidal data available for rotation");
            return;
        }

        let index = self.rotation.write().await.advance(historical.len());
        let reading = historical[index].clone();
        info!(
            index = index + 1,
            total = historical.len(),
            wave_height = reading.wave_height,
            wave_direction = reading.wave_direction,
            sector = reading.sector().as_str(),
            "Rotated tidal reading"
        );
        *self.current.write().await = reading;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_wraps_around() {
        let mut rotation = ReadingRotation::default();
        assert_eq!(rotation.index(), 0);
        assert_eq!(rotation.advance(3), 1);
        assert_eq!(rotation.advance(3), 2);
        assert_eq!(rotation.advance(3), 0);
    }

    #[test]
    fn rotation_with_empty_sequence_stays_put() {
        let mut rotation = ReadingRotation::default();
        assert_eq!(rotation.advance(0), 0);
        assert_eq!(rotation.index(), 0);
    }

    #[tokio::test]
    async fn rotate_replaces_current_reading_atomically() {
        let manager = Arc::new(SyncManager::new(TidalConfig::default()).unwrap());
        let mut readings = synthetic_readings("163");
        readings.truncate(2);
        let heights: Vec<f64> = readings.iter().map(|r| r.wave_height).collect();
        *manager.historical.write().await = readings;

        manager.rotate().await;
        assert_eq!(manager.reading_store().read().await.wave_height, heights[1]);

        // Wraps back to the first reading
        manager.rotate().await;
        assert_eq!(manager.reading_store().read().await.wave_height, heights[0]);
    }

    #[tokio::test]
    async fn rotate_with_no_data_keeps_default_reading() {
        let manager = Arc::new(SyncManager::new(TidalConfig::default()).unwrap());
        manager.rotate().await;
        let reading = manager.reading_store().read().await.clone();
        assert_eq!(reading.station_name, "Default");
    }
}
