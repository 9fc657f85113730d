//! Flat export records for dashboards.
//!
//! An [`AnalysisExport`] is one row per analysed zone with every headline
//! figure at the top level, so it loads into a spreadsheet or BI tool
//! without unpacking nested objects.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;
use waste_map_settlement_models::SettlementType;
use waste_map_validation_models::{Agreement, QualityRating, SourceStatus};

use crate::AnalysisResult;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisExport {
    pub run_id: String,
    pub generated_at: DateTime<Utc>,
    pub zone_id: String,
    pub zone_name: Option<String>,
    pub geometry_hash: String,
    pub area_km2: f64,
    pub source_status: SourceStatus,
    pub source_version: String,
    pub settlement_type: SettlementType,
    pub classification_confidence: f64,
    pub building_count: u64,
    pub population: f64,
    pub population_lower: f64,
    pub population_upper: f64,
    pub coefficient_of_variation: f64,
    pub estimator_count: usize,
    pub single_source: bool,
    pub daily_kg: f64,
    pub weekly_tonnes: f64,
    pub monthly_tonnes: f64,
    pub waste_uncertainty_percent: f64,
    pub monthly_revenue_gross: Option<f64>,
    pub monthly_revenue_expected: Option<f64>,
    pub currency: Option<String>,
    pub overall_quality_score: f64,
    pub quality_rating: QualityRating,
    pub completeness_score: f64,
    /// `None` when no reference figures were compared.
    pub agreement_score: Option<f64>,
    pub agreement_mean_abs_pct_diff: Option<f64>,
    /// Flag codes, comma-separated.
    pub flags: String,
}

impl AnalysisExport {
    /// A record stamped with a fresh run id and the current time.
    #[must_use]
    pub fn from_result(result: &AnalysisResult) -> Self {
        Self::with_run(result, Uuid::new_v4().to_string(), Utc::now())
    }

    #[must_use]
    pub fn with_run(result: &AnalysisResult, run_id: String, generated_at: DateTime<Utc>) -> Self {
        let ensemble = &result.ensemble_estimate;
        let waste = &result.waste_projection;
        let revenue = result.revenue_projection.as_ref();
        let report = &result.validation_report;
        let flags: Vec<&str> = report.flags.iter().map(|f| f.code.as_ref()).collect();
        let agreement_mean_abs_pct_diff = match &report.agreement {
            Agreement::Measured {
                mean_abs_pct_diff, ..
            } => Some(*mean_abs_pct_diff),
            Agreement::NotApplicable => None,
        };

        Self {
            run_id,
            generated_at,
            zone_id: result.zone_id.clone(),
            zone_name: result.zone_name.clone(),
            geometry_hash: result.geometry_hash.clone(),
            area_km2: result.area_km2,
            source_status: result.source_status,
            source_version: result.source_version.clone(),
            settlement_type: result.settlement_label.settlement_type,
            classification_confidence: result.settlement_label.classification_confidence,
            building_count: result.normalization.surviving_count,
            population: ensemble.consensus_value,
            population_lower: ensemble.confidence_interval_95.lower,
            population_upper: ensemble.confidence_interval_95.upper,
            coefficient_of_variation: ensemble.coefficient_of_variation,
            estimator_count: ensemble.source_count(),
            single_source: ensemble.single_source,
            daily_kg: waste.daily_kg,
            weekly_tonnes: waste.weekly_tonnes,
            monthly_tonnes: waste.monthly_tonnes,
            waste_uncertainty_percent: waste.uncertainty.relative_percent,
            monthly_revenue_gross: revenue.map(|r| r.monthly_gross),
            monthly_revenue_expected: revenue.map(|r| r.expected_monthly_collected),
            currency: revenue.map(|r| r.currency.clone()),
            overall_quality_score: report.overall_quality_score,
            quality_rating: report.quality_rating,
            completeness_score: report.completeness_score,
            agreement_score: report.agreement.score(),
            agreement_mean_abs_pct_diff,
            flags: flags.join(","),
        }
    }
}

/// Serializes records as a pretty-printed JSON array.
///
/// # Errors
///
/// Returns [`serde_json::Error`] if serialization fails.
pub fn to_json(records: &[AnalysisExport]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(records)
}
