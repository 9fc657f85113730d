//! Raster estimator: sum of in-zone raster population.

use waste_map_estimate_models::{EstimationMethod, PopulationEstimate};

use crate::{EstimationContext, EstimatorConfig, EstimatorError, PopulationEstimator};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterEstimator {
    config: EstimatorConfig,
}

impl RasterEstimator {
    #[must_use]
    pub const fn new(config: EstimatorConfig) -> Self {
        Self { config }
    }
}

impl PopulationEstimator for RasterEstimator {
    fn method(&self) -> EstimationMethod {
        EstimationMethod::Raster
    }

    /// Each cell contributes its count scaled by the share of the cell
    /// inside the zone. Confidence falls with zone coverage and with the
    /// share of the total that comes from partially covered edge cells.
    fn estimate(
        &self,
        context: &EstimationContext,
    ) -> Result<PopulationEstimate, EstimatorError> {
        let Some(raster) = context.raster.as_ref().filter(|r| !r.is_empty()) else {
            return Err(EstimatorError::NoData {
                method: self.method(),
                reason: "no raster cells overlap the zone".to_string(),
            });
        };

        let value = raster.in_zone_population();
        let confidence = self.config.raster_base_confidence
            * raster.coverage()
            * 0.5f64.mul_add(raster.mean_in_zone_fraction(), 0.5);

        log::debug!(
            "Raster estimate {value:.0} from {} cells (coverage {:.0}%)",
            raster.cells().len(),
            raster.coverage() * 100.0,
        );

        Ok(PopulationEstimate::new(value, self.method(), confidence)
            .with_source("population_raster"))
    }
}
