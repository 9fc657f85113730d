//! Area-heuristic fallback used when the imagery service cannot be reached.

use serde::{Deserialize, Serialize};
use waste_map_estimate_models::{EstimationMethod, PopulationEstimate};
use waste_map_zone_models::{Zone, ZoneType};

/// Default residential densities (people per km²) by zone type, and the
/// confidence given to heuristic estimates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct AreaHeuristicConfig {
    pub residential_density_km2: f64,
    pub mixed_use_density_km2: f64,
    pub commercial_density_km2: f64,
    pub institutional_density_km2: f64,
    pub industrial_density_km2: f64,
    pub green_space_density_km2: f64,
    pub confidence: f64,
}

impl Default for AreaHeuristicConfig {
    fn default() -> Self {
        Self {
            residential_density_km2: 5000.0,
            mixed_use_density_km2: 4000.0,
            commercial_density_km2: 1500.0,
            institutional_density_km2: 800.0,
            industrial_density_km2: 300.0,
            green_space_density_km2: 50.0,
            confidence: 0.15,
        }
    }
}

impl AreaHeuristicConfig {
    #[must_use]
    pub const fn default_density(&self, zone_type: ZoneType) -> f64 {
        match zone_type {
            ZoneType::Residential => self.residential_density_km2,
            ZoneType::MixedUse => self.mixed_use_density_km2,
            ZoneType::Commercial => self.commercial_density_km2,
            ZoneType::Institutional => self.institutional_density_km2,
            ZoneType::Industrial => self.industrial_density_km2,
            ZoneType::GreenSpace => self.green_space_density_km2,
        }
    }
}

/// Population from zone area × density.
///
/// The zone's declared density wins over the zone-type default when it is
/// a positive finite number.
#[must_use]
pub fn area_heuristic(zone: &Zone, area_km2: f64, config: &AreaHeuristicConfig) -> PopulationEstimate {
    let (density, source) = match zone.declared_density {
        Some(d) if d.is_finite() && d > 0.0 => (d, "declared_density"),
        _ => (config.default_density(zone.zone_type), "zone_type_default_density"),
    };
    let value = (area_km2 * density).max(0.0);

    log::warn!(
        "Falling back to area heuristic for zone {}: {area_km2:.3} km² × {density:.0}/km² = {value:.0}",
        zone.id
    );

    PopulationEstimate::new(value, EstimationMethod::AreaHeuristic, config.confidence)
        .with_source(source)
}
