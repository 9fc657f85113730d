//! Dasymetric estimator: raster population redistributed onto residential
//! footprints.
//!
//! Uniform within-cell density overstates population in cells that are
//! mostly empty ground and understates it where the zone boundary cuts
//! through a dense block. Each clipped cell is handled by how much
//! residential footprint it holds:
//!
//! - interior cell with footprint: keeps its full count
//! - interior cell without footprint: its count moves onto the built cells
//!   of the zone, in proportion to their footprint
//! - partial cell: keeps `A_in / (A_in + (1 − f)·A_cell·d̄)` of its count,
//!   where `A_in` is the residential footprint inside the zone part of the
//!   cell, `f` the in-zone fraction and `d̄` the zone's built density
//!   (footprint m² per m² of zone). The denominator's second term stands
//!   for the footprint expected in the part of the cell outside the zone.

use waste_map_estimate_models::{EstimationMethod, PopulationEstimate};

use crate::{EstimationContext, EstimatorConfig, EstimatorError, PopulationEstimator};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DasymetricEstimator {
    config: EstimatorConfig,
}

impl DasymetricEstimator {
    #[must_use]
    pub const fn new(config: EstimatorConfig) -> Self {
        Self { config }
    }

    fn no_data(&self, reason: &str) -> EstimatorError {
        EstimatorError::NoData {
            method: self.method(),
            reason: reason.to_string(),
        }
    }
}

impl PopulationEstimator for DasymetricEstimator {
    fn method(&self) -> EstimationMethod {
        EstimationMethod::Dasymetric
    }

    fn estimate(
        &self,
        context: &EstimationContext,
    ) -> Result<PopulationEstimate, EstimatorError> {
        let Some(raster) = context.raster.as_ref().filter(|r| !r.is_empty()) else {
            return Err(self.no_data("no raster cells overlap the zone"));
        };
        let residential_m2 = context.buildings.residential_footprint_m2();
        if residential_m2 <= 0.0 || context.zone_area_m2 <= 0.0 {
            return Err(self.no_data("no residential footprint in the zone"));
        }
        let built_density = residential_m2 / context.zone_area_m2;

        let mut footprint = vec![0.0; raster.cells().len()];
        for building in context.buildings.buildings.iter().filter(|b| b.is_residential()) {
            if let Some(index) = raster.cell_containing(building.record.centroid) {
                footprint[index] += building.record.area_m2;
            }
        }
        let covered_footprint: f64 = footprint.iter().sum();
        if covered_footprint <= 0.0 {
            return Err(self.no_data("no residential footprint falls inside a raster cell"));
        }

        let mut kept = 0.0;
        let mut orphaned = 0.0;
        let mut built_cell_population = 0.0;
        for (cell, &a_in) in raster.cells().iter().zip(&footprint) {
            let count = cell.cell.estimated_count;
            if cell.is_interior() {
                if a_in > 0.0 {
                    kept += count;
                    built_cell_population += count;
                } else {
                    orphaned += count;
                }
            } else if a_in > 0.0 {
                let outside_footprint =
                    (1.0 - cell.in_zone_fraction) * cell.cell_area_m2 * built_density;
                let share = a_in / (a_in + outside_footprint);
                kept += count * share;
                built_cell_population += cell.in_zone_count();
            }
        }

        // Interior empty cells keep their people inside the zone, on the
        // built cells, so the sum is unchanged by redistribution.
        let value = kept + orphaned;

        let uniform_total = raster.in_zone_population();
        let built_share = if uniform_total > 0.0 {
            (built_cell_population / uniform_total).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let confidence = self.config.dasymetric_base_confidence
            * raster.coverage()
            * 0.5f64.mul_add(built_share, 0.5);

        log::debug!(
            "Dasymetric estimate {value:.0} (kept {kept:.0}, redistributed {orphaned:.0}, \
             built density {built_density:.3})"
        );

        Ok(PopulationEstimate::new(value, self.method(), confidence)
            .with_source("population_raster")
            .with_source("building_footprints"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{building, cell, commercial, context};
    use waste_map_settlement_models::SettlementType;

    fn estimator() -> DasymetricEstimator {
        DasymetricEstimator::new(EstimatorConfig::default())
    }

    #[test]
    fn interior_empty_cell_population_moves_onto_built_cells() {
        let cells = [cell(0.0, 0.0, 0.005, 100.0), cell(0.005, 0.0, 0.005, 50.0)];
        // Only the western cell holds a home.
        let ctx = context(
            &[building("a", [0.002, 0.002], 60.0, None)],
            Some(&cells[..]),
            SettlementType::Mixed,
        );
        let estimate = estimator().estimate(&ctx).unwrap();
        assert!((estimate.value - 150.0).abs() < 0.05, "{}", estimate.value);
        assert_eq!(estimate.supporting_data_sources.len(), 2);
    }

    #[test]
    fn partial_cell_keeps_footprint_share() {
        // Cell straddles the eastern edge: half in, half out.
        let cells = [cell(0.005, 0.0, 0.01, 200.0)];
        let ctx = context(
            &[building("a", [0.007, 0.002], 500.0, None)],
            Some(&cells[..]),
            SettlementType::Mixed,
        );
        let raster = ctx.raster.as_ref().unwrap();
        let clipped = raster.cells()[0];
        let d = 500.0 / ctx.zone_area_m2;
        let outside = (1.0 - clipped.in_zone_fraction) * clipped.cell_area_m2 * d;
        let expected = 200.0 * 500.0 / (500.0 + outside);

        let estimate = estimator().estimate(&ctx).unwrap();
        assert!((estimate.value - expected).abs() < 1e-6);
        assert!(estimate.value > 0.0 && estimate.value < 200.0);
    }

    #[test]
    fn partial_cell_without_homes_contributes_nothing() {
        let cells = [cell(0.0, 0.0, 0.005, 100.0), cell(0.005, 0.0, 0.01, 400.0)];
        let ctx = context(
            &[building("a", [0.002, 0.002], 60.0, None)],
            Some(&cells[..]),
            SettlementType::Mixed,
        );
        let estimate = estimator().estimate(&ctx).unwrap();
        assert!((estimate.value - 100.0).abs() < 0.05);
    }

    #[test]
    fn needs_raster_and_residential_buildings() {
        let cells = [cell(0.0, 0.0, 0.005, 100.0)];
        let no_raster = context(
            &[building("a", [0.002, 0.002], 60.0, None)],
            None,
            SettlementType::Mixed,
        );
        assert!(estimator().estimate(&no_raster).is_err());

        let only_shops = context(
            &[commercial("s", [0.002, 0.002], 60.0)],
            Some(&cells[..]),
            SettlementType::Mixed,
        );
        assert!(matches!(
            estimator().estimate(&only_shops),
            Err(EstimatorError::NoData { .. })
        ));
    }
}
