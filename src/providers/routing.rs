//! OSRM road-network routing client.
//!
//! Turns an ordered list of stop coordinates into a polyline that follows
//! real roads. Every failure mode here is recoverable: callers degrade to a
//! straight-line path instead of surfacing routing errors to requests.

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::config::RoutingConfig;

#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
    #[error("Routing rejected: {0}")]
    Rejected(String),
    #[error("Empty route geometry")]
    EmptyGeometry,
    #[error("Too few waypoints")]
    TooFewWaypoints,
}

#[derive(Debug, Deserialize)]
struct OsrmResponse {
    code: String,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    geometry: OsrmGeometry,
}

#[derive(Debug, Deserialize)]
struct OsrmGeometry {
    /// GeoJSON coordinates, [lon, lat] pairs
    coordinates: Vec<[f64; 2]>,
}

pub struct RoutingClient {
    client: reqwest::Client,
    config: RoutingConfig,
}

impl RoutingClient {
    pub fn new(config: RoutingConfig) -> Result<Self, RoutingError> {
        let client = reqwest::Client::builder()
            .user_agent("majuro-twin/0.2")
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    /// Route through the waypoints (as `(lat, lon)` pairs), returning a
    /// road-following polyline in the same coordinate order.
    ///
    /// Above the per-request waypoint limit the request is split into
    /// consecutive pairwise calls; a failed pair degrades to the straight
    /// line between its two waypoints so the polyline stays connected.
    pub async fn route(&self, waypoints: &[(f64, f64)]) -> Result<Vec<(f64, f64)>, RoutingError> {
        if waypoints.len() < 2 {
            return Err(RoutingError::TooFewWaypoints);
        }

        if waypoints.len() <= self.config.max_waypoints {
            return self.route_once(waypoints).await;
        }

        let mut full_path: Vec<(f64, f64)> = Vec::new();
        for pair in waypoints.windows(2) {
            let segment = match self.route_once(pair).await {
                Ok(points) => points,
                Err(e) => {
                    warn!(error = %e, "Pairwise routing call failed, using straight segment");
                    pair.to_vec()
                }
            };
            if full_path.is_empty() {
                full_path.extend(segment);
            } else {
                // Each segment repeats the previous segment's last waypoint
                full_path.extend(segment.into_iter().skip(1));
            }
        }
        Ok(full_path)
    }

    async fn route_once(&self, waypoints: &[(f64, f64)]) -> Result<Vec<(f64, f64)>, RoutingError> {
        let url = format!(
            "{}/route/v1/driving/{}?geometries=geojson&overview=full&steps=false",
            self.config.base_url.trim_end_matches('/'),
            coord_string(waypoints)
        );

        let response = self.client.get(&url).send().await?.error_for_status()?;
        let body: OsrmResponse = response.json().await?;

        if body.code != "Ok" {
            return Err(RoutingError::Rejected(body.code));
        }

        let geometry = body
            .routes
            .into_iter()
            .next()
            .ok_or(RoutingError::EmptyGeometry)?
            .geometry;

        if geometry.coordinates.len() < 2 {
            return Err(RoutingError::EmptyGeometry);
        }

        // GeoJSON is [lon, lat]; flip back to (lat, lon)
        Ok(geometry
            .coordinates
            .into_iter()
            .map(|[lon, lat]| (lat, lon))
            .collect())
    }
}

/// OSRM coordinate path segment: "lon,lat;lon,lat;…"
fn coord_string(waypoints: &[(f64, f64)]) -> String {
    waypoints
        .iter()
        .map(|(lat, lon)| format!("{},{}", lon, lat))
        .collect::<Vec<_>>()
        .join(";")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coord_string_is_lon_lat_ordered() {
        let s = coord_string(&[(7.0890, 171.3803), (7.1178, 171.3608)]);
        assert_eq!(s, "171.3803,7.089;171.3608,7.1178");
    }

    #[test]
    fn response_geometry_flips_to_lat_lon() {
        let json = r#"{
            "code": "Ok",
            "routes": [{"geometry": {"coordinates": [[171.38, 7.09], [171.36, 7.11]]}}]
        }"#;
        let body: OsrmResponse = serde_json::from_str(json).unwrap();
        assert_eq!(body.code, "Ok");
        let coords = &body.routes[0].geometry.coordinates;
        assert_eq!(coords[0], [171.38, 7.09]);
    }

    #[test]
    fn non_ok_code_parses_without_routes() {
        let json = r#"{"code": "NoRoute"}"#;
        let body: OsrmResponse = serde_json::from_str(json).unwrap();
        assert_eq!(body.code, "NoRoute");
        assert!(body.routes.is_empty());
    }

    #[tokio::test]
    async fn too_few_waypoints_is_an_error() {
        let client = RoutingClient::new(RoutingConfig::default()).unwrap();
        let err = client.route(&[(7.0, 171.0)]).await.unwrap_err();
        assert!(matches!(err, RoutingError::TooFewWaypoints));
    }

    #[tokio::test]
    async fn unreachable_server_fails_without_panicking() {
        let config = RoutingConfig {
            base_url: "http://127.0.0.1:9".into(),
            timeout_secs: 1,
            max_waypoints: 100,
        };
        let client = RoutingClient::new(config).unwrap();
        let err = client.route(&[(7.0, 171.0), (7.1, 171.1)]).await.unwrap_err();
        assert!(matches!(err, RoutingError::NetworkError(_)));
    }
}
