//! Wave-driven route impact model.
//!
//! Classifies the current buoy reading into a per-route impact: a delay
//! multiplier from wave-height thresholds, the list of road segments exposed
//! to the wave direction, and an inundation assessment against Majuro's
//! maximum land elevation. The classification itself is pure; only the
//! reading snapshot comes from shared state.

use serde::Serialize;
use utoipa::ToSchema;

use crate::providers::tidal::{TidalReading, WaveSector};
use crate::sync::ReadingStore;

/// Majuro's highest land elevation, in meters.
const MAJURO_MAX_ELEVATION_M: f64 = 3.0;

/// Which shoreline a road segment runs along.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    /// Ocean side, exposed to southerly waves
    NorthFacing,
    /// Lagoon side, exposed to northerly waves
    SouthFacing,
}

/// A stretch of road between two consecutive scheduled stops, with the
/// shoreline it is exposed to.
#[derive(Debug, Clone)]
pub struct SegmentOrientation {
    pub route_id: &'static str,
    pub from_stop: &'static str,
    pub to_stop: &'static str,
    pub orientation: Orientation,
}

impl SegmentOrientation {
    /// Display label used in impact reports.
    pub fn label(&self) -> String {
        format!("{} → {}", self.from_stop, self.to_stop)
    }

    /// Whether this segment is exposed to waves from the given sector.
    /// North-facing roads take southerly waves, south-facing take northerly;
    /// easterly and westerly swells run parallel to the atoll roads.
    pub fn exposed_to(&self, sector: WaveSector) -> bool {
        matches!(
            (self.orientation, sector),
            (Orientation::NorthFacing, WaveSector::Southerly)
                | (Orientation::SouthFacing, WaveSector::Northerly)
        )
    }
}

/// The fixed segment-orientation table for the Majuro road network.
pub struct RouteOrientations {
    segments: Vec<SegmentOrientation>,
}

impl RouteOrientations {
    /// Surveyed orientations for both routes. DUD through ULIGA runs along
    /// the ocean shore; the ULIGA-LAURA leg and the airport corridor hug
    /// the lagoon.
    pub fn majuro() -> Self {
        let seg = |route_id, from_stop, to_stop, orientation| SegmentOrientation {
            route_id,
            from_stop,
            to_stop,
            orientation,
        };
        Self {
            segments: vec![
                seg("ROUTE_A", "DUD", "RITA", Orientation::NorthFacing),
                seg("ROUTE_A", "RITA", "DELAP", Orientation::NorthFacing),
                seg("ROUTE_A", "DELAP", "ULIGA", Orientation::NorthFacing),
                seg("ROUTE_A", "ULIGA", "DARRIT", Orientation::SouthFacing),
                seg("ROUTE_A", "DARRIT", "LAURA", Orientation::SouthFacing),
                seg("ROUTE_B", "DUD", "RITA", Orientation::NorthFacing),
                seg("ROUTE_B", "RITA", "AIRPORT", Orientation::SouthFacing),
                seg("ROUTE_B", "AIRPORT", "LAURA", Orientation::SouthFacing),
                seg("ROUTE_B", "LAURA", "MAJURO", Orientation::NorthFacing),
            ],
        }
    }

    pub fn for_route(&self, route_id: &str) -> Vec<&SegmentOrientation> {
        self.segments
            .iter()
            .filter(|s| s.route_id == route_id)
            .collect()
    }
}

/// Service impact bands by significant wave height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImpactLevel {
    None,
    SlightDelays,
    MajorDelays,
    Shutdown,
}

impl ImpactLevel {
    pub fn from_wave_height(height_m: f64) -> Self {
        if height_m >= 5.0 {
            ImpactLevel::Shutdown
        } else if height_m >= 4.0 {
            ImpactLevel::MajorDelays
        } else if height_m >= 3.0 {
            ImpactLevel::SlightDelays
        } else {
            ImpactLevel::None
        }
    }

    /// Travel-time multiplier applied to scheduled durations. Shutdown
    /// zeroes the multiplier because nothing moves.
    pub fn delay_multiplier(&self) -> f64 {
        match self {
            ImpactLevel::None => 1.0,
            ImpactLevel::SlightDelays => 1.2,
            ImpactLevel::MajorDelays => 1.5,
            ImpactLevel::Shutdown => 0.0,
        }
    }

    fn delay_fraction(&self) -> f64 {
        match self {
            ImpactLevel::None | ImpactLevel::Shutdown => 0.0,
            ImpactLevel::SlightDelays => 0.2,
            ImpactLevel::MajorDelays => 0.5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImpactLevel::None => "NONE",
            ImpactLevel::SlightDelays => "SLIGHT_DELAYS",
            ImpactLevel::MajorDelays => "MAJOR_DELAYS",
            ImpactLevel::Shutdown => "SHUTDOWN",
        }
    }
}

/// Flood-risk bands from wave height against the 3 m maximum elevation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InundationLevel {
    Safe,
    LowRisk,
    HighRisk,
    Critical,
}

impl InundationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            InundationLevel::Safe => "SAFE",
            InundationLevel::LowRisk => "LOW_RISK",
            InundationLevel::HighRisk => "HIGH_RISK",
            InundationLevel::Critical => "CRITICAL",
        }
    }
}

/// Inundation risk on a 0-1 scale, with a narrative for operators.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct InundationAssessment {
    pub risk: f64,
    pub level: InundationLevel,
    pub description: String,
}

impl InundationAssessment {
    /// Purely a function of wave height; computed even when the impact
    /// level is NONE, as an independent reporting dimension.
    pub fn from_wave_height(height_m: f64) -> Self {
        if height_m >= 5.0 {
            Self {
                risk: 1.0,
                level: InundationLevel::Critical,
                description: format!(
                    "Wave height {:.1}m exceeds Majuro's max elevation (3m) by {:.1}m. \
                     Severe flooding expected on all low-lying roads. Service shutdown required.",
                    height_m,
                    height_m - MAJURO_MAX_ELEVATION_M
                ),
            }
        } else if height_m >= 4.0 {
            Self {
                risk: 0.7,
                level: InundationLevel::HighRisk,
                description: format!(
                    "Wave height {:.1}m exceeds Majuro's max elevation (3m) by {:.1}m. \
                     Significant flooding expected on affected road segments. Major delays likely.",
                    height_m,
                    height_m - MAJURO_MAX_ELEVATION_M
                ),
            }
        } else if height_m >= 3.0 {
            Self {
                risk: 0.4,
                level: InundationLevel::LowRisk,
                description: format!(
                    "Wave height {:.1}m approaches Majuro's max elevation (3m). Minor flooding \
                     possible on exposed coastal segments ({:.1}m proximity). Slight delays expected.",
                    height_m,
                    height_m - MAJURO_MAX_ELEVATION_M
                ),
            }
        } else {
            Self {
                risk: 0.0,
                level: InundationLevel::Safe,
                description: format!(
                    "Wave height {:.1}m is below Majuro's max elevation (3m) with {:.1}m safety \
                     margin. No inundation risk. Normal operations.",
                    height_m,
                    MAJURO_MAX_ELEVATION_M - height_m
                ),
            }
        }
    }
}

/// The full impact report for one route.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RouteImpact {
    pub route_id: String,
    pub impact_level: ImpactLevel,
    pub delay_multiplier: f64,
    pub estimated_delay_minutes: i64,
    pub serviceable: bool,
    pub reason: String,
    pub affected_segments: Vec<String>,
    pub current_wave_height: f64,
    pub inundation_risk: f64,
    pub inundation_level: InundationLevel,
    pub inundation_description: String,
}

impl RouteImpact {
    fn no_impact(route_id: &str, wave_height: f64) -> Self {
        let inundation = InundationAssessment::from_wave_height(wave_height);
        Self {
            route_id: route_id.to_string(),
            impact_level: ImpactLevel::None,
            delay_multiplier: 1.0,
            estimated_delay_minutes: 0,
            serviceable: true,
            reason: "No tidal impact - normal operations".to_string(),
            affected_segments: Vec::new(),
            current_wave_height: wave_height,
            inundation_risk: inundation.risk,
            inundation_level: inundation.level,
            inundation_description: inundation.description,
        }
    }
}

/// Baseline route duration used only to derive an estimated-delay figure.
fn baseline_minutes(route_id: &str) -> i64 {
    if route_id == "ROUTE_A" {
        40
    } else {
        35
    }
}

/// Turns the current wave reading into per-route impact reports.
pub struct TidalImpactCalculator {
    readings: ReadingStore,
    orientations: RouteOrientations,
}

impl TidalImpactCalculator {
    pub fn new(readings: ReadingStore) -> Self {
        Self {
            readings,
            orientations: RouteOrientations::majuro(),
        }
    }

    /// Impact of the current reading on a route. Snapshots the reading
    /// before classifying, so one report never mixes two readings.
    pub async fn impact(&self, route_id: &str) -> RouteImpact {
        let reading = self.readings.read().await.clone();
        self.impact_for_reading(route_id, &reading)
    }

    /// Impacts for both Majuro routes against the same reading snapshot.
    pub async fn all_impacts(&self) -> Vec<RouteImpact> {
        let reading = self.readings.read().await.clone();
        vec![
            self.impact_for_reading("ROUTE_A", &reading),
            self.impact_for_reading("ROUTE_B", &reading),
        ]
    }

    /// Pure classification of one reading against one route.
    pub fn impact_for_reading(&self, route_id: &str, reading: &TidalReading) -> RouteImpact {
        let segments = self.orientations.for_route(route_id);
        let wave_height = reading.wave_height;
        if segments.is_empty() {
            return RouteImpact::no_impact(route_id, wave_height);
        }

        let impact_level = ImpactLevel::from_wave_height(wave_height);
        if impact_level == ImpactLevel::None {
            return RouteImpact::no_impact(route_id, wave_height);
        }

        let sector = reading.sector();
        let affected_segments: Vec<String> = segments
            .iter()
            .filter(|s| s.exposed_to(sector))
            .map(|s| s.label())
            .collect();
        // High seas from a sector no segment faces leave the route untouched
        if affected_segments.is_empty() {
            return RouteImpact::no_impact(route_id, wave_height);
        }

        let scale = if affected_segments.len() == segments.len() {
            "All"
        } else if affected_segments.len() > segments.len() / 2 {
            "Most"
        } else {
            "Some"
        };
        let reason = format!(
            "{} segments affected by {} {:.1}m waves",
            scale,
            sector.as_str().to_lowercase(),
            wave_height
        );

        let serviceable = impact_level != ImpactLevel::Shutdown;
        let estimated_delay_minutes = (baseline_minutes(route_id) as f64
            * impact_level.delay_fraction())
        .ceil() as i64;
        let inundation = InundationAssessment::from_wave_height(wave_height);

        RouteImpact {
            route_id: route_id.to_string(),
            impact_level,
            delay_multiplier: impact_level.delay_multiplier(),
            estimated_delay_minutes,
            serviceable,
            reason,
            affected_segments,
            current_wave_height: wave_height,
            inundation_risk: inundation.risk,
            inundation_level: inundation.level,
            inundation_description: inundation.description,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::RwLock;

    fn reading(height: f64, direction: f64) -> TidalReading {
        TidalReading {
            wave_height: height,
            wave_direction: direction,
            ..TidalReading::default_reading()
        }
    }

    fn calculator() -> TidalImpactCalculator {
        TidalImpactCalculator::new(Arc::new(RwLock::new(TidalReading::default_reading())))
    }

    #[test]
    fn impact_level_thresholds() {
        assert_eq!(ImpactLevel::from_wave_height(2.9), ImpactLevel::None);
        assert_eq!(ImpactLevel::from_wave_height(3.0), ImpactLevel::SlightDelays);
        assert_eq!(ImpactLevel::from_wave_height(3.9), ImpactLevel::SlightDelays);
        assert_eq!(ImpactLevel::from_wave_height(4.0), ImpactLevel::MajorDelays);
        assert_eq!(ImpactLevel::from_wave_height(4.9), ImpactLevel::MajorDelays);
        assert_eq!(ImpactLevel::from_wave_height(5.0), ImpactLevel::Shutdown);
    }

    #[test]
    fn southerly_waves_hit_north_facing_segments() {
        let calc = calculator();
        let impact = calc.impact_for_reading("ROUTE_A", &reading(3.5, 180.0));

        assert_eq!(impact.impact_level, ImpactLevel::SlightDelays);
        assert_eq!(impact.delay_multiplier, 1.2);
        assert!(impact.serviceable);
        // Three of five ROUTE_A segments face north
        assert_eq!(
            impact.affected_segments,
            vec!["DUD → RITA", "RITA → DELAP", "DELAP → ULIGA"]
        );
        assert_eq!(impact.reason, "Most segments affected by southerly 3.5m waves");
        // ceil(40 * 0.2) = 8
        assert_eq!(impact.estimated_delay_minutes, 8);
    }

    #[test]
    fn northerly_waves_hit_south_facing_segments() {
        let calc = calculator();
        let impact = calc.impact_for_reading("ROUTE_B", &reading(4.5, 0.0));

        assert_eq!(impact.impact_level, ImpactLevel::MajorDelays);
        assert_eq!(impact.delay_multiplier, 1.5);
        assert_eq!(
            impact.affected_segments,
            vec!["RITA → AIRPORT", "AIRPORT → LAURA"]
        );
        assert_eq!(impact.reason, "Some segments affected by northerly 4.5m waves");
        // ceil(35 * 0.5) = 18
        assert_eq!(impact.estimated_delay_minutes, 18);
    }

    #[test]
    fn easterly_and_westerly_waves_have_no_impact() {
        let calc = calculator();
        for direction in [90.0, 270.0] {
            let impact = calc.impact_for_reading("ROUTE_A", &reading(4.5, direction));
            assert_eq!(impact.impact_level, ImpactLevel::None);
            assert_eq!(impact.delay_multiplier, 1.0);
            assert!(impact.affected_segments.is_empty());
            assert_eq!(impact.reason, "No tidal impact - normal operations");
        }
    }

    #[test]
    fn shutdown_is_not_serviceable() {
        let calc = calculator();
        let impact = calc.impact_for_reading("ROUTE_A", &reading(5.5, 180.0));

        assert_eq!(impact.impact_level, ImpactLevel::Shutdown);
        assert_eq!(impact.delay_multiplier, 0.0);
        assert_eq!(impact.estimated_delay_minutes, 0);
        assert!(!impact.serviceable);
        assert_eq!(impact.inundation_level, InundationLevel::Critical);
        assert_eq!(impact.inundation_risk, 1.0);
    }

    #[test]
    fn calm_seas_mean_no_impact_and_safe_inundation() {
        let calc = calculator();
        let impact = calc.impact_for_reading("ROUTE_A", &reading(1.5, 180.0));

        assert_eq!(impact.impact_level, ImpactLevel::None);
        assert!(impact.serviceable);
        assert_eq!(impact.inundation_level, InundationLevel::Safe);
        assert_eq!(impact.inundation_risk, 0.0);
        assert!(impact
            .inundation_description
            .contains("1.5m safety margin"));
    }

    #[test]
    fn unknown_route_collapses_to_no_impact() {
        let calc = calculator();
        let impact = calc.impact_for_reading("ROUTE_X", &reading(5.5, 180.0));
        assert_eq!(impact.impact_level, ImpactLevel::None);
        assert!(impact.serviceable);
    }

    #[test]
    fn inundation_levels_cite_margins() {
        let a = InundationAssessment::from_wave_height(3.5);
        assert_eq!(a.level, InundationLevel::LowRisk);
        assert_eq!(a.risk, 0.4);
        assert!(a.description.contains("0.5m proximity"));

        let a = InundationAssessment::from_wave_height(4.5);
        assert_eq!(a.level, InundationLevel::HighRisk);
        assert_eq!(a.risk, 0.7);
        assert!(a.description.contains("by 1.5m"));

        let a = InundationAssessment::from_wave_height(6.0);
        assert_eq!(a.level, InundationLevel::Critical);
        assert!(a.description.contains("by 3.0m"));
    }

    #[test]
    fn classification_is_pure() {
        let calc = calculator();
        let r = reading(4.2, 180.0);
        let first = calc.impact_for_reading("ROUTE_A", &r);
        let second = calc.impact_for_reading("ROUTE_A", &r);
        assert_eq!(first.reason, second.reason);
        assert_eq!(first.estimated_delay_minutes, second.estimated_delay_minutes);
    }

    #[tokio::test]
    async fn impact_snapshots_the_current_reading() {
        let store: ReadingStore = Arc::new(RwLock::new(reading(5.5, 180.0)));
        let calc = TidalImpactCalculator::new(store.clone());

        let impact = calc.impact("ROUTE_A").await;
        assert_eq!(impact.impact_level, ImpactLevel::Shutdown);

        *store.write().await = reading(2.0, 180.0);
        let impact = calc.impact("ROUTE_A").await;
        assert_eq!(impact.impact_level, ImpactLevel::None);
    }

    #[tokio::test]
    async fn all_impacts_cover_both_routes() {
        let store: ReadingStore = Arc::new(RwLock::new(reading(3.5, 180.0)));
        let calc = TidalImpactCalculator::new(store);

        let impacts = calc.all_impacts().await;
        assert_eq!(impacts.len(), 2);
        assert_eq!(impacts[0].route_id, "ROUTE_A");
        assert_eq!(impacts[1].route_id, "ROUTE_B");
        // Same reading, different baselines: ceil(40*0.2)=8, ceil(35*0.2)=7
        assert_eq!(impacts[0].estimated_delay_minutes, 8);
        assert_eq!(impacts[1].estimated_delay_minutes, 7);
    }
}
