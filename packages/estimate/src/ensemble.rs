//! Ensemble combiner.
//!
//! Estimates are weighted by their confidence, normalized to sum to one
//! (equal weights when every confidence is zero). The consensus is the
//! weighted mean. The spread uses reliability weights:
//!
//! ```text
//! var   = Σ wᵢ (xᵢ − x̄)² / (1 − Σ wᵢ²)
//! n_eff = 1 / Σ wᵢ²
//! half  = t(0.975, n − 1) · √var / √n_eff
//! ```
//!
//! A single estimate has no spread to measure, so its interval is widened
//! to a minimum relative half-width instead.

use serde::{Deserialize, Serialize};
use waste_map_estimate_models::{
    ConfidenceInterval, EnsembleEstimate, EstimationMethod, PopulationEstimate, WeightedEstimate,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnsembleError {
    #[error("no estimates to combine")]
    NoEstimates,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct EnsembleConfig {
    /// Minimum half-width, relative to the consensus, for a single-source
    /// result.
    pub single_source_min_relative_half_width: f64,
    /// Minimum half-width, relative to the consensus, for multi-source
    /// results.
    pub min_relative_half_width: f64,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            single_source_min_relative_half_width: 0.30,
            min_relative_half_width: 0.02,
        }
    }
}

/// Two-sided 97.5th percentiles of Student's t for 1..=30 degrees of
/// freedom.
const T_975: [f64; 30] = [
    12.706, 4.303, 3.182, 2.776, 2.571, 2.447, 2.365, 2.306, 2.262, 2.228, 2.201, 2.179, 2.160,
    2.145, 2.131, 2.120, 2.110, 2.101, 2.093, 2.086, 2.080, 2.074, 2.069, 2.064, 2.060, 2.056,
    2.052, 2.048, 2.045, 2.042,
];

/// Student-t critical value at 0.975 for `df` degrees of freedom.
///
/// Beyond 30 the next lower tabulated value is used. Returns `None` for
/// zero degrees of freedom.
#[must_use]
pub fn t_critical_975(df: usize) -> Option<f64> {
    match df {
        0 => None,
        1..=30 => Some(T_975[df - 1]),
        31..=39 => Some(2.042),
        40..=59 => Some(2.021),
        60..=119 => Some(2.000),
        120..=999 => Some(1.980),
        _ => Some(1.960),
    }
}

/// Combines estimator outputs into one estimate with a 95% interval.
///
/// Estimates with a non-finite or negative value are discarded with a
/// warning. `failed_methods` is carried through to the result unchanged.
///
/// # Errors
///
/// * [`EnsembleError::NoEstimates`] if no usable estimate remains
pub fn combine(
    estimates: Vec<PopulationEstimate>,
    failed_methods: Vec<EstimationMethod>,
    config: &EnsembleConfig,
) -> Result<EnsembleEstimate, EnsembleError> {
    let estimates: Vec<PopulationEstimate> = estimates
        .into_iter()
        .filter(|e| {
            let usable = e.value.is_finite() && e.value >= 0.0;
            if !usable {
                log::warn!("Discarding unusable {} estimate {}", e.method, e.value);
            }
            usable
        })
        .collect();
    if estimates.is_empty() {
        return Err(EnsembleError::NoEstimates);
    }

    let weights = normalized_weights(&estimates);
    let consensus: f64 = estimates
        .iter()
        .zip(&weights)
        .map(|(e, w)| w * e.value)
        .sum();

    let single_source = estimates.len() == 1;
    let (sd, half_width) = if single_source {
        (0.0, consensus * config.single_source_min_relative_half_width)
    } else {
        let sum_w2: f64 = weights.iter().map(|w| w * w).sum();
        let spread: f64 = estimates
            .iter()
            .zip(&weights)
            .map(|(e, w)| w * (e.value - consensus).powi(2))
            .sum();
        let correction = 1.0 - sum_w2;
        let variance = if correction > f64::EPSILON {
            spread / correction
        } else {
            spread
        };
        let sd = variance.sqrt();
        let n_eff = 1.0 / sum_w2;
        let t = t_critical_975(estimates.len() - 1).unwrap_or(1.960);
        let half = (t * sd / n_eff.sqrt()).max(consensus * config.min_relative_half_width);
        (sd, half)
    };

    let half_width = if half_width.is_finite() {
        half_width.max(0.0)
    } else {
        0.0
    };
    let coefficient_of_variation = if consensus > 0.0 { sd / consensus } else { 0.0 };
    let confidence_interval_95 = ConfidenceInterval {
        lower: (consensus - half_width).max(0.0),
        upper: consensus + half_width,
    };

    log::info!(
        "Ensemble of {} estimates: consensus {consensus:.0}, 95% [{:.0}, {:.0}], cv {:.3}",
        estimates.len(),
        confidence_interval_95.lower,
        confidence_interval_95.upper,
        coefficient_of_variation,
    );

    Ok(EnsembleEstimate {
        consensus_value: consensus,
        confidence_interval_95,
        coefficient_of_variation,
        contributing_estimates: estimates
            .into_iter()
            .zip(weights)
            .map(|(estimate, weight)| WeightedEstimate { estimate, weight })
            .collect(),
        single_source,
        failed_methods,
    })
}

fn normalized_weights(estimates: &[PopulationEstimate]) -> Vec<f64> {
    let confidences: Vec<f64> = estimates
        .iter()
        .map(|e| {
            if e.confidence.is_finite() {
                e.confidence.max(0.0)
            } else {
                0.0
            }
        })
        .collect();
    let total: f64 = confidences.iter().sum();
    if total > 0.0 {
        confidences.iter().map(|c| c / total).collect()
    } else {
        #[allow(clippy::cast_precision_loss)]
        let equal = 1.0 / estimates.len() as f64;
        vec![equal; estimates.len()]
    }
}
