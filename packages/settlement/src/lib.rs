#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Settlement classifier.
//!
//! Labels a zone formal, informal or mixed from three indirect signals:
//! building density, mean footprint area and mean shape complexity. Rules
//! are applied in order:
//!
//! 1. density above the informal floor **and** mean area below the
//!    informal ceiling → informal
//! 2. density below the formal ceiling **and** mean area above the formal
//!    floor **and** regular shapes → formal
//! 3. anything else → mixed
//!
//! Crisp labels get more confidence the further the evidence sits past the
//! thresholds. Mixed labels never exceed 0.5: the engine prefers an honest
//! "mixed, unsure" to a forced formal/informal split.

use serde::{Deserialize, Serialize};
use waste_map_normalize::NormalizedBuildingSet;
use waste_map_settlement_models::{
    SettlementFeatures, SettlementLabel, SettlementType, TileLabel,
};
use waste_map_spatial::ZoneGeometry;

/// Highest confidence a mixed label can carry.
pub const MIXED_CONFIDENCE_CEILING: f64 = 0.5;

const MIXED_CONFIDENCE_FLOOR: f64 = 0.2;
const CRISP_CONFIDENCE_BASE: f64 = 0.6;
const CRISP_CONFIDENCE_SPAN: f64 = 0.35;

/// Classification thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ClassifierConfig {
    /// Informal requires density above this (buildings/km²).
    pub informal_min_density_km2: f64,
    /// Informal requires mean area below this (m²).
    pub informal_max_mean_area_m2: f64,
    /// Formal requires density below this (buildings/km²).
    pub formal_max_density_km2: f64,
    /// Formal requires mean area above this (m²).
    pub formal_min_mean_area_m2: f64,
    /// Formal requires mean shape complexity at or below this.
    pub regular_shape_max: f64,
    /// Labels below this confidence are marked ambiguous.
    pub ambiguity_floor: f64,
    /// Zones larger than this (km²) are also classified per tile.
    pub tile_threshold_km2: f64,
    /// Tile edge length in metres.
    pub tile_size_m: f64,
    /// Tiles with fewer buildings than this are not labelled.
    pub min_tile_buildings: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            informal_min_density_km2: 100.0,
            informal_max_mean_area_m2: 80.0,
            formal_max_density_km2: 40.0,
            formal_min_mean_area_m2: 150.0,
            regular_shape_max: 1.3,
            ambiguity_floor: 0.4,
            tile_threshold_km2: 4.0,
            tile_size_m: 1000.0,
            min_tile_buildings: 5,
        }
    }
}

/// Classifies a zone from its normalized buildings.
///
/// Zones larger than [`ClassifierConfig::tile_threshold_km2`] additionally
/// get per-tile labels; the zone label itself is always computed over the
/// whole zone.
#[must_use]
pub fn classify(
    buildings: &NormalizedBuildingSet,
    zone: &ZoneGeometry,
    config: &ClassifierConfig,
) -> SettlementLabel {
    let features = compute_features(buildings, |_| true, zone.area_m2());
    let (settlement_type, classification_confidence) = classify_features(&features, config);

    let sub_tiles = if zone.area_km2() > config.tile_threshold_km2 {
        classify_tiles(buildings, zone, config)
    } else {
        Vec::new()
    };

    log::info!(
        "Classified zone as {settlement_type} (confidence {classification_confidence:.2}): \
         {:.1} buildings/km², mean area {:?} m², {} sub-tiles",
        features.density_per_km2,
        features.mean_area_m2.map(|a| a.round()),
        sub_tiles.len(),
    );

    SettlementLabel {
        settlement_type,
        classification_confidence,
        features,
        ambiguous: classification_confidence < config.ambiguity_floor,
        sub_tiles,
    }
}

/// Applies the ordered rules to precomputed features.
///
/// Returns the class and its confidence. Zero buildings yields
/// `(Mixed, 0.0)`.
#[must_use]
pub fn classify_features(
    features: &SettlementFeatures,
    config: &ClassifierConfig,
) -> (SettlementType, f64) {
    let Some(mean_area) = features.mean_area_m2 else {
        return (SettlementType::Mixed, 0.0);
    };
    if features.building_count == 0 {
        return (SettlementType::Mixed, 0.0);
    }
    let density = features.density_per_km2;

    if density > config.informal_min_density_km2 && mean_area < config.informal_max_mean_area_m2 {
        let margin = margin_past(density, config.informal_min_density_km2)
            .min(margin_past(config.informal_max_mean_area_m2, mean_area));
        return (SettlementType::Informal, crisp_confidence(margin));
    }

    let regular = features
        .mean_shape_complexity
        .is_none_or(|c| c <= config.regular_shape_max);
    if density < config.formal_max_density_km2
        && mean_area > config.formal_min_mean_area_m2
        && regular
    {
        let margin = margin_past(config.formal_max_density_km2, density)
            .min(margin_past(mean_area, config.formal_min_mean_area_m2));
        let mut confidence = crisp_confidence(margin);
        if features.mean_shape_complexity.is_none() {
            // Shape regularity was assumed, not observed.
            confidence *= 0.9;
        }
        return (SettlementType::Formal, confidence);
    }

    (
        SettlementType::Mixed,
        mixed_confidence(density, mean_area, config),
    )
}

/// Computes features over the buildings selected by `include`, against an
/// area of `area_m2`.
fn compute_features(
    buildings: &NormalizedBuildingSet,
    include: impl Fn(&waste_map_normalize::NormalizedBuilding) -> bool,
    area_m2: f64,
) -> SettlementFeatures {
    let selected: Vec<_> = buildings.buildings.iter().filter(|b| include(*b)).collect();
    #[allow(clippy::cast_precision_loss)]
    let count = selected.len() as f64;

    let area_km2 = area_m2 / 1_000_000.0;
    let area_ha = area_m2 / 10_000.0;
    let (density_per_km2, density_per_hectare) = if area_m2 > 0.0 {
        (count / area_km2, count / area_ha)
    } else {
        (0.0, 0.0)
    };

    let mean_area_m2 = (!selected.is_empty())
        .then(|| selected.iter().map(|b| b.record.area_m2).sum::<f64>() / count);

    let complexities: Vec<f64> = selected.iter().filter_map(|b| b.shape_complexity).collect();
    #[allow(clippy::cast_precision_loss)]
    let mean_shape_complexity = (!complexities.is_empty())
        .then(|| complexities.iter().sum::<f64>() / complexities.len() as f64);

    SettlementFeatures {
        building_count: selected.len() as u64,
        density_per_hectare,
        density_per_km2,
        mean_area_m2,
        mean_shape_complexity,
    }
}

fn classify_tiles(
    buildings: &NormalizedBuildingSet,
    zone: &ZoneGeometry,
    config: &ClassifierConfig,
) -> Vec<TileLabel> {
    zone.tile_grid(config.tile_size_m)
        .into_iter()
        .filter_map(|bounds| {
            let in_tile = |b: &waste_map_normalize::NormalizedBuilding| {
                bounds.contains(b.record.centroid)
            };
            let count = buildings.buildings.iter().filter(|b| in_tile(*b)).count();
            if count < config.min_tile_buildings.max(1) {
                return None;
            }
            let features = compute_features(buildings, in_tile, zone.clipped_area_m2(&bounds));
            let (settlement_type, classification_confidence) =
                classify_features(&features, config);
            Some(TileLabel {
                bounds,
                settlement_type,
                classification_confidence,
                features,
            })
        })
        .collect()
}

/// Relative distance by which `value` exceeds `threshold`, capped at 1.
fn margin_past(value: f64, threshold: f64) -> f64 {
    if threshold.abs() < f64::EPSILON {
        return 1.0;
    }
    ((value - threshold) / threshold.abs()).clamp(0.0, 1.0)
}

fn crisp_confidence(margin: f64) -> f64 {
    CRISP_CONFIDENCE_BASE + CRISP_CONFIDENCE_SPAN * margin.clamp(0.0, 1.0)
}

/// Confidence for a mixed label.
///
/// Each signal is placed on a 0 (formal) .. 1 (informal) axis between its
/// two thresholds. Evidence centred between the extremes is confidently
/// mixed; evidence near one extreme, or signals pulling in opposite
/// directions, lowers the confidence.
fn mixed_confidence(density: f64, mean_area: f64, config: &ClassifierConfig) -> f64 {
    let density_pos = axis_position(
        density,
        config.formal_max_density_km2,
        config.informal_min_density_km2,
    );
    let area_pos = axis_position(
        mean_area,
        config.formal_min_mean_area_m2,
        config.informal_max_mean_area_m2,
    );

    let centred = 1.0 - (density_pos + area_pos - 1.0).abs();
    let disagreement = (density_pos - area_pos).abs();

    let span = MIXED_CONFIDENCE_CEILING - MIXED_CONFIDENCE_FLOOR;
    (MIXED_CONFIDENCE_FLOOR + span * centred * (1.0 - 0.5 * disagreement))
        .clamp(0.0, MIXED_CONFIDENCE_CEILING)
}

/// Position of `value` between `formal_end` (0) and `informal_end` (1).
fn axis_position(value: f64, formal_end: f64, informal_end: f64) -> f64 {
    let span = informal_end - formal_end;
    if span.abs() < f64::EPSILON {
        return 0.5;
    }
    ((value - formal_end) / span).clamp(0.0, 1.0)
}
