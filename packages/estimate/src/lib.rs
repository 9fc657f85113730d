#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Population estimators and the ensemble that combines them.
//!
//! Three independent methods estimate the residents of a zone:
//!
//! - [`volumetric`]: footprint area × floors × occupancy factor
//! - [`raster`]: gridded population clipped to the zone
//! - [`dasymetric`]: raster population redistributed onto residential
//!   footprints
//!
//! They share the [`PopulationEstimator`] trait and are dispatched through
//! the closed [`Estimator`] enum. [`battery::run_battery`] runs them
//! concurrently, [`ensemble::combine`] merges their answers and
//! [`fallback::area_heuristic`] stands in when imagery is unavailable.

pub mod battery;
pub mod dasymetric;
pub mod ensemble;
pub mod fallback;
pub mod raster;
pub mod volumetric;

use serde::{Deserialize, Serialize};
use waste_map_estimate_models::{EstimationMethod, PopulationEstimate};
use waste_map_normalize::NormalizedBuildingSet;
use waste_map_settlement_models::{SettlementLabel, SettlementType};
use waste_map_spatial::raster::ClippedRaster;

pub use dasymetric::DasymetricEstimator;
pub use raster::RasterEstimator;
pub use volumetric::VolumetricEstimator;

/// Errors a single estimator can return. Both reduce the ensemble input
/// set rather than failing the run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EstimatorError {
    /// The estimator's required input is absent.
    #[error("{method} estimator has no data: {reason}")]
    NoData {
        method: EstimationMethod,
        reason: String,
    },

    /// The input was present but produced an unusable value.
    #[error("{method} estimator rejected its input: {message}")]
    InvalidInput {
        method: EstimationMethod,
        message: String,
    },
}

impl EstimatorError {
    /// Method of the estimator that failed.
    #[must_use]
    pub const fn method(&self) -> EstimationMethod {
        match self {
            Self::NoData { method, .. } | Self::InvalidInput { method, .. } => *method,
        }
    }
}

/// Occupancy factors and base confidences for the estimators.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct EstimatorConfig {
    /// Square metres of floor space per resident in informal settlements.
    pub informal_m2_per_person: f64,
    /// Square metres of floor space per resident in formal settlements.
    pub formal_m2_per_person: f64,
    /// Square metres of floor space per resident in mixed settlements.
    pub mixed_m2_per_person: f64,
    /// Square metres of floor space per occupant in non-residential
    /// buildings.
    pub commercial_m2_per_person: f64,
    /// Storey height used to derive floors from building height.
    pub floor_height_m: f64,
    pub volumetric_base_confidence: f64,
    pub raster_base_confidence: f64,
    pub dasymetric_base_confidence: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            informal_m2_per_person: 35.0,
            formal_m2_per_person: 50.0,
            mixed_m2_per_person: 42.5,
            commercial_m2_per_person: 400.0,
            floor_height_m: 2.5,
            volumetric_base_confidence: 0.8,
            raster_base_confidence: 0.7,
            dasymetric_base_confidence: 0.75,
        }
    }
}

impl EstimatorConfig {
    /// Residents per square metre of residential floor space.
    #[must_use]
    pub fn occupancy_factor(&self, settlement_type: SettlementType) -> f64 {
        let m2 = match settlement_type {
            SettlementType::Informal => self.informal_m2_per_person,
            SettlementType::Formal => self.formal_m2_per_person,
            SettlementType::Mixed => self.mixed_m2_per_person,
        };
        per_area(m2)
    }

    /// Occupants per square metre of non-residential floor space.
    #[must_use]
    pub fn commercial_factor(&self) -> f64 {
        per_area(self.commercial_m2_per_person)
    }
}

fn per_area(m2_per_person: f64) -> f64 {
    if m2_per_person.is_nan() || m2_per_person <= 0.0 {
        0.0
    } else {
        1.0 / m2_per_person
    }
}

/// Immutable input shared by every estimator in one run.
#[derive(Debug, Clone)]
pub struct EstimationContext {
    pub buildings: NormalizedBuildingSet,
    pub label: SettlementLabel,
    /// Population raster clipped to the zone, when the service supplied one.
    pub raster: Option<ClippedRaster>,
    pub zone_area_m2: f64,
}

/// A population estimation method.
pub trait PopulationEstimator {
    /// Method reported on the estimates this estimator produces.
    fn method(&self) -> EstimationMethod;

    /// Estimates the residents of the zone described by `context`.
    ///
    /// # Errors
    ///
    /// * [`EstimatorError::NoData`] if the input the method relies on is
    ///   missing
    /// * [`EstimatorError::InvalidInput`] if the computed value is not a
    ///   finite, non-negative number
    fn estimate(&self, context: &EstimationContext)
    -> Result<PopulationEstimate, EstimatorError>;
}

/// The fixed set of estimators.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Estimator {
    Volumetric(VolumetricEstimator),
    Raster(RasterEstimator),
    Dasymetric(DasymetricEstimator),
}

impl Estimator {
    /// One of each estimator, configured from `config`.
    #[must_use]
    pub const fn battery(config: &EstimatorConfig) -> [Self; 3] {
        [
            Self::Volumetric(VolumetricEstimator::new(*config)),
            Self::Raster(RasterEstimator::new(*config)),
            Self::Dasymetric(DasymetricEstimator::new(*config)),
        ]
    }
}

impl PopulationEstimator for Estimator {
    fn method(&self) -> EstimationMethod {
        match self {
            Self::Volumetric(e) => e.method(),
            Self::Raster(e) => e.method(),
            Self::Dasymetric(e) => e.method(),
        }
    }

    fn estimate(
        &self,
        context: &EstimationContext,
    ) -> Result<PopulationEstimate, EstimatorError> {
        let estimate = match self {
            Self::Volumetric(e) => e.estimate(context),
            Self::Raster(e) => e.estimate(context),
            Self::Dasymetric(e) => e.estimate(context),
        }?;
        check_value(estimate)
    }
}

fn check_value(estimate: PopulationEstimate) -> Result<PopulationEstimate, EstimatorError> {
    if estimate.value.is_finite() && estimate.value >= 0.0 {
        Ok(estimate)
    } else {
        Err(EstimatorError::InvalidInput {
            method: estimate.method,
            message: format!("non-finite or negative estimate {}", estimate.value),
        })
    }
}
