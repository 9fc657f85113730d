//! Concurrent execution of the estimator battery.
//!
//! Every estimator runs on the blocking pool against the same immutable
//! [`EstimationContext`] snapshot. Results come back in battery order
//! regardless of completion order, so repeated runs combine identically.

use std::sync::Arc;

use futures::future::join_all;
use waste_map_estimate_models::{EstimationMethod, PopulationEstimate};

use crate::{EstimationContext, Estimator, EstimatorError, PopulationEstimator};

/// What the battery produced.
#[derive(Debug, Clone, Default)]
pub struct BatteryOutcome {
    /// Successful estimates, in battery order.
    pub estimates: Vec<PopulationEstimate>,
    /// Estimators that produced nothing, in battery order.
    pub failures: Vec<EstimatorError>,
}

impl BatteryOutcome {
    /// Methods of the failed estimators.
    #[must_use]
    pub fn failed_methods(&self) -> Vec<EstimationMethod> {
        self.failures.iter().map(EstimatorError::method).collect()
    }
}

/// Runs `estimators` concurrently over `context`.
pub async fn run_battery(
    estimators: &[Estimator],
    context: Arc<EstimationContext>,
) -> BatteryOutcome {
    let tasks = estimators.iter().map(|&estimator| {
        let context = Arc::clone(&context);
        async move {
            let method = estimator.method();
            tokio::task::spawn_blocking(move || estimator.estimate(&context))
                .await
                .unwrap_or_else(|e| {
                    Err(EstimatorError::InvalidInput {
                        method,
                        message: format!("estimator task failed: {e}"),
                    })
                })
        }
    });

    let mut outcome = BatteryOutcome::default();
    for result in join_all(tasks).await {
        match result {
            Ok(estimate) => outcome.estimates.push(estimate),
            Err(e) => {
                log::warn!("{e}");
                outcome.failures.push(e);
            }
        }
    }

    log::info!(
        "Estimator battery: {} succeeded, {} failed",
        outcome.estimates.len(),
        outcome.failures.len()
    );

    outcome
}
