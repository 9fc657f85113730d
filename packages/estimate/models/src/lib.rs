#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Population estimate types shared by the estimator battery, the ensemble
//! combiner and everything downstream of them.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Method that produced a population estimate.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EstimationMethod {
    /// Footprint area × floors × occupancy factor
    Volumetric,
    /// Gridded population raster clipped to the zone
    Raster,
    /// Raster population redistributed onto residential footprints
    Dasymetric,
    /// Zone area × declared or default density, used when imagery is
    /// unavailable
    AreaHeuristic,
}

impl EstimationMethod {
    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Volumetric,
            Self::Raster,
            Self::Dasymetric,
            Self::AreaHeuristic,
        ]
    }
}

/// A single estimator's answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopulationEstimate {
    /// Estimated residents.
    pub value: f64,
    /// Method that produced it.
    pub method: EstimationMethod,
    /// Estimator confidence, 0-1.
    pub confidence: f64,
    /// Names of the data the estimate was computed from.
    pub supporting_data_sources: Vec<String>,
}

impl PopulationEstimate {
    #[must_use]
    pub fn new(value: f64, method: EstimationMethod, confidence: f64) -> Self {
        Self {
            value,
            method,
            confidence: confidence.clamp(0.0, 1.0),
            supporting_data_sources: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.supporting_data_sources.push(source.into());
        self
    }
}

/// An estimate together with the weight it received in the ensemble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightedEstimate {
    pub estimate: PopulationEstimate,
    /// Normalized weight; weights across one ensemble sum to 1.
    pub weight: f64,
}

/// A closed interval `[lower, upper]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
}

impl ConfidenceInterval {
    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }

    #[must_use]
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }
}

/// Combined estimate from every estimator that produced a value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnsembleEstimate {
    /// Reliability-weighted mean of the contributing estimates.
    pub consensus_value: f64,
    /// 95% interval around the consensus.
    pub confidence_interval_95: ConfidenceInterval,
    /// Weighted standard deviation over the consensus; 0 for a single
    /// source.
    pub coefficient_of_variation: f64,
    /// Contributing estimates in the order they were supplied.
    pub contributing_estimates: Vec<WeightedEstimate>,
    /// Only one estimator contributed.
    pub single_source: bool,
    /// Estimators that ran but produced no value.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_methods: Vec<EstimationMethod>,
}

impl EnsembleEstimate {
    /// Half the interval width relative to the consensus.
    ///
    /// Returns 0 when the consensus is 0.
    #[must_use]
    pub fn relative_half_width(&self) -> f64 {
        if self.consensus_value <= 0.0 {
            return 0.0;
        }
        // Measured from the upper bound; the lower bound may be clamped.
        (self.confidence_interval_95.upper - self.consensus_value) / self.consensus_value
    }

    /// Whether a given method contributed a value.
    #[must_use]
    pub fn has_method(&self, method: EstimationMethod) -> bool {
        self.contributing_estimates
            .iter()
            .any(|w| w.estimate.method == method)
    }

    /// Number of contributing estimates.
    #[must_use]
    pub fn source_count(&self) -> usize {
        self.contributing_estimates.len()
    }
}
