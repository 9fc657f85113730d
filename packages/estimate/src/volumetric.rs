//! Volumetric estimator: footprint area × floors × occupancy factor.
//!
//! Floors come from building height at one storey per
//! [`EstimatorConfig::floor_height_m`], rounded and never below one. A
//! building without a height counts as single-storey. Residential floor
//! space is converted with the settlement-type occupancy factor (the
//! building's sub-tile label when it has one, else the zone label);
//! non-residential floor space uses the commercial factor.

use waste_map_estimate_models::{EstimationMethod, PopulationEstimate};
use waste_map_normalize::NormalizedBuilding;
use waste_map_settlement_models::{SettlementLabel, SettlementType};

use crate::{EstimationContext, EstimatorConfig, EstimatorError, PopulationEstimator};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumetricEstimator {
    config: EstimatorConfig,
}

impl VolumetricEstimator {
    #[must_use]
    pub const fn new(config: EstimatorConfig) -> Self {
        Self { config }
    }

    /// Storeys implied by a height; one when the height is unknown.
    #[must_use]
    pub fn floors(&self, height_m: Option<f64>) -> f64 {
        match height_m {
            Some(h) if h.is_finite() && h > 0.0 && self.config.floor_height_m > 0.0 => {
                (h / self.config.floor_height_m).round().max(1.0)
            }
            _ => 1.0,
        }
    }

    fn occupants(&self, building: &NormalizedBuilding, label: &SettlementLabel) -> f64 {
        let floor_space = building.record.area_m2 * self.floors(building.record.height_m);
        let factor = if building.is_residential() {
            self.config
                .occupancy_factor(settlement_type_at(label, building))
        } else {
            self.config.commercial_factor()
        };
        floor_space * factor
    }
}

fn settlement_type_at(label: &SettlementLabel, building: &NormalizedBuilding) -> SettlementType {
    label
        .sub_tiles
        .iter()
        .find(|tile| tile.bounds.contains(building.record.centroid))
        .map_or(label.settlement_type, |tile| tile.settlement_type)
}

impl PopulationEstimator for VolumetricEstimator {
    fn method(&self) -> EstimationMethod {
        EstimationMethod::Volumetric
    }

    fn estimate(
        &self,
        context: &EstimationContext,
    ) -> Result<PopulationEstimate, EstimatorError> {
        let buildings = &context.buildings;
        if buildings.is_empty() {
            return Err(EstimatorError::NoData {
                method: self.method(),
                reason: "no buildings survived normalization".to_string(),
            });
        }

        let value: f64 = buildings
            .buildings
            .iter()
            .map(|b| self.occupants(b, &context.label))
            .sum();

        let confidence = self.config.volumetric_base_confidence
            * 0.6f64.mul_add(buildings.height_coverage(), 0.4)
            * 0.3f64.mul_add(-buildings.provisional_share(), 1.0);

        log::debug!(
            "Volumetric estimate {value:.0} from {} buildings (height coverage {:.0}%, \
             provisional {:.0}%)",
            buildings.len(),
            buildings.height_coverage() * 100.0,
            buildings.provisional_share() * 100.0,
        );

        Ok(PopulationEstimate::new(value, self.method(), confidence)
            .with_source("building_footprints"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{building, commercial, context};
    use waste_map_settlement_models::TileLabel;
    use waste_map_source_models::CellBounds;

    fn estimator() -> VolumetricEstimator {
        VolumetricEstimator::new(EstimatorConfig::default())
    }

    #[test]
    fn floors_round_and_default_to_one() {
        let e = estimator();
        assert!((e.floors(None) - 1.0).abs() < f64::EPSILON);
        assert!((e.floors(Some(0.5)) - 1.0).abs() < f64::EPSILON);
        assert!((e.floors(Some(7.4)) - 3.0).abs() < f64::EPSILON);
        assert!((e.floors(Some(8.9)) - 4.0).abs() < f64::EPSILON);
        assert!((e.floors(Some(f64::NAN)) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn residential_and_commercial_space_are_counted_separately() {
        let ctx = context(
            &[
                building("a", [0.002, 0.002], 70.0, Some(5.0)),
                commercial("b", [0.004, 0.004], 800.0),
            ],
            None,
            SettlementType::Informal,
        );
        let estimate = estimator().estimate(&ctx).unwrap();
        // 70 m² × 2 floors / 35 + 800 m² / 400
        assert!((estimate.value - 6.0).abs() < 1e-9, "{}", estimate.value);
        assert_eq!(estimate.method, EstimationMethod::Volumetric);
    }

    #[test]
    fn confidence_tracks_height_coverage() {
        let with_heights = context(
            &[
                building("a", [0.002, 0.002], 100.0, Some(3.0)),
                building("b", [0.004, 0.004], 100.0, Some(3.0)),
            ],
            None,
            SettlementType::Formal,
        );
        let without = context(
            &[
                building("a", [0.002, 0.002], 100.0, None),
                building("b", [0.004, 0.004], 100.0, None),
            ],
            None,
            SettlementType::Formal,
        );
        let full = estimator().estimate(&with_heights).unwrap().confidence;
        let none = estimator().estimate(&without).unwrap().confidence;
        assert!((full - 0.8).abs() < 1e-9);
        assert!((none - 0.8 * 0.4).abs() < 1e-9);
    }

    #[test]
    fn provisional_buildings_lower_confidence() {
        let mut stable = building("a", [0.002, 0.002], 100.0, Some(3.0));
        stable.snapshot_count = Some(3);
        let mut single = building("b", [0.004, 0.004], 100.0, Some(3.0));
        single.snapshot_count = Some(1);
        let ctx = context(&[stable, single], None, SettlementType::Formal);
        let estimate = estimator().estimate(&ctx).unwrap();
        assert!((estimate.confidence - 0.8 * 0.85).abs() < 1e-9);
    }

    #[test]
    fn sub_tile_label_overrides_zone_label() {
        let mut ctx = context(
            &[building("a", [0.002, 0.002], 70.0, None)],
            None,
            SettlementType::Formal,
        );
        ctx.label.sub_tiles.push(TileLabel {
            bounds: CellBounds {
                west: 0.0,
                south: 0.0,
                east: 0.005,
                north: 0.005,
            },
            settlement_type: SettlementType::Informal,
            classification_confidence: 0.9,
            features: ctx.label.features,
        });
        let estimate = estimator().estimate(&ctx).unwrap();
        assert!((estimate.value - 2.0).abs() < 1e-9);
    }

    #[test]
    fn no_buildings_is_no_data() {
        let ctx = context(&[], None, SettlementType::Mixed);
        assert!(matches!(
            estimator().estimate(&ctx),
            Err(EstimatorError::NoData { .. })
        ));
    }
}
