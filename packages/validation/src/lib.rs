#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Validation and quality scoring.
//!
//! Every result is graded from four components:
//!
//! - **agreement** with an independent reference dataset, when one is
//!   supplied
//! - **completeness** of the optional inputs (heights, multi-temporal
//!   imagery, reference, raster, a confident classification)
//! - **consistency** of the estimators, from the ensemble's coefficient
//!   of variation
//! - **classification** confidence
//!
//! The weighted score is then capped by the weakest structural condition
//! of the run (a single estimator, a degraded or offline service, no
//! building data), banded into a [`QualityRating`] and annotated with
//! [`QualityFlag`]s.

use serde::{Deserialize, Serialize};
use waste_map_estimate_models::EnsembleEstimate;
use waste_map_normalize::NormalizedBuildingSet;
use waste_map_settlement_models::SettlementLabel;
use waste_map_source_models::ReferenceDataset;
use waste_map_validation_models::{
    Agreement, FlagCode, QualityFlag, QualityRating, SourceStatus, ValidationReport,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ValidationConfig {
    /// Agreement score lost per percentage point of mean absolute error.
    pub agreement_scale: f64,

    pub completeness_height_weight: f64,
    pub completeness_multi_temporal_weight: f64,
    pub completeness_reference_weight: f64,
    pub completeness_raster_weight: f64,
    pub completeness_classification_weight: f64,

    pub overall_agreement_weight: f64,
    pub overall_completeness_weight: f64,
    pub overall_consistency_weight: f64,
    pub overall_classification_weight: f64,
    /// Coefficient of variation at which the consistency score reaches 0.
    pub cv_ceiling: f64,

    pub single_source_cap: f64,
    pub degraded_source_cap: f64,
    pub no_building_data_cap: f64,

    pub excellent_threshold: f64,
    pub good_threshold: f64,
    pub fair_threshold: f64,

    pub low_building_count: usize,
    pub low_classification_confidence: f64,
    pub high_disagreement_cv: f64,
    pub mostly_provisional_share: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            agreement_scale: 2.0,
            completeness_height_weight: 0.25,
            completeness_multi_temporal_weight: 0.20,
            completeness_reference_weight: 0.25,
            completeness_raster_weight: 0.15,
            completeness_classification_weight: 0.15,
            overall_agreement_weight: 0.35,
            overall_completeness_weight: 0.25,
            overall_consistency_weight: 0.25,
            overall_classification_weight: 0.15,
            cv_ceiling: 0.5,
            single_source_cap: 60.0,
            degraded_source_cap: 50.0,
            no_building_data_cap: 40.0,
            excellent_threshold: 90.0,
            good_threshold: 75.0,
            fair_threshold: 50.0,
            low_building_count: 10,
            low_classification_confidence: 0.4,
            high_disagreement_cv: 0.25,
            mostly_provisional_share: 0.5,
        }
    }
}

impl ValidationConfig {
    #[must_use]
    pub fn rating(&self, score: f64) -> QualityRating {
        if score >= self.excellent_threshold {
            QualityRating::Excellent
        } else if score >= self.good_threshold {
            QualityRating::Good
        } else if score >= self.fair_threshold {
            QualityRating::Fair
        } else {
            QualityRating::Poor
        }
    }
}

/// Everything the validator looks at for one run.
#[derive(Debug, Clone, Copy)]
pub struct ValidationInput<'a> {
    pub ensemble: &'a EnsembleEstimate,
    pub buildings: &'a NormalizedBuildingSet,
    pub label: &'a SettlementLabel,
    pub reference: Option<&'a ReferenceDataset>,
    /// A population raster overlapped the zone.
    pub has_raster: bool,
    pub source_status: SourceStatus,
}

/// Grades a run.
#[must_use]
pub fn validate(input: &ValidationInput<'_>, config: &ValidationConfig) -> ValidationReport {
    let agreement = agreement(input, config);
    let completeness_score = completeness(input, &agreement, config);

    let cv = input.ensemble.coefficient_of_variation;
    let consistency_score = if config.cv_ceiling > 0.0 {
        100.0 * (1.0 - (cv / config.cv_ceiling).clamp(0.0, 1.0))
    } else {
        100.0
    };
    let classification_score = input.label.classification_confidence.clamp(0.0, 1.0) * 100.0;

    let mut weighted = vec![
        (completeness_score, config.overall_completeness_weight),
        (consistency_score, config.overall_consistency_weight),
        (classification_score, config.overall_classification_weight),
    ];
    if let Some(score) = agreement.score() {
        weighted.push((score, config.overall_agreement_weight));
    }
    let total_weight: f64 = weighted.iter().map(|(_, w)| w).sum();
    let uncapped = if total_weight > 0.0 {
        weighted.iter().map(|(s, w)| s * w).sum::<f64>() / total_weight
    } else {
        0.0
    };

    let mut overall = uncapped;
    if input.ensemble.single_source {
        overall = overall.min(config.single_source_cap);
    }
    if input.source_status != SourceStatus::Online {
        overall = overall.min(config.degraded_source_cap);
    }
    if input.buildings.is_empty() {
        overall = overall.min(config.no_building_data_cap);
    }
    let overall_quality_score = overall.clamp(0.0, 100.0);
    let quality_rating = config.rating(overall_quality_score);

    let flags = flags(input, &agreement, config);

    log::info!(
        "Validation: overall {overall_quality_score:.1} ({quality_rating}), completeness \
         {completeness_score:.1}, agreement {:?}, {} flags",
        agreement.score(),
        flags.len()
    );

    ValidationReport {
        agreement,
        completeness_score,
        overall_quality_score,
        quality_rating,
        flags,
    }
}

/// Mean absolute percentage difference against the reference's available
/// fields. Fields with a zero or missing reference value are skipped.
fn agreement(input: &ValidationInput<'_>, config: &ValidationConfig) -> Agreement {
    let Some(reference) = input.reference else {
        return Agreement::NotApplicable;
    };

    let mut diffs = Vec::new();
    let mut compared_fields = Vec::new();

    if let Some(expected) = reference.usable_building_count() {
        #[allow(clippy::cast_precision_loss)]
        let (observed, expected) = (input.buildings.len() as f64, expected as f64);
        diffs.push(pct_diff(observed, expected));
        compared_fields.push("building_count".to_string());
    }
    if let Some(expected) = reference.usable_population() {
        diffs.push(pct_diff(input.ensemble.consensus_value, expected));
        compared_fields.push("population".to_string());
    }

    if diffs.is_empty() {
        log::debug!("Reference {} has no comparable figures", reference.name);
        return Agreement::NotApplicable;
    }

    #[allow(clippy::cast_precision_loss)]
    let mean_abs_pct_diff = diffs.iter().sum::<f64>() / diffs.len() as f64;
    Agreement::Measured {
        score: 100.0 - (mean_abs_pct_diff * config.agreement_scale).min(100.0),
        mean_abs_pct_diff,
        compared_fields,
    }
}

fn pct_diff(observed: f64, expected: f64) -> f64 {
    (observed - expected).abs() / expected * 100.0
}

/// Weighted share of optional inputs that were present, 0-100.
///
/// Each term only ever adds, so dropping an input cannot raise the score.
/// The reference only counts when it was actually compared.
fn completeness(
    input: &ValidationInput<'_>,
    agreement: &Agreement,
    config: &ValidationConfig,
) -> f64 {
    let total = config.completeness_height_weight
        + config.completeness_multi_temporal_weight
        + config.completeness_reference_weight
        + config.completeness_raster_weight
        + config.completeness_classification_weight;
    if total <= 0.0 {
        return 0.0;
    }

    let mut earned = config.completeness_height_weight * input.buildings.height_coverage();
    if input.buildings.multi_temporal {
        earned += config.completeness_multi_temporal_weight;
    }
    if agreement.score().is_some() {
        earned += config.completeness_reference_weight;
    }
    if input.has_raster {
        earned += config.completeness_raster_weight;
    }
    if input.label.classification_confidence >= config.low_classification_confidence {
        earned += config.completeness_classification_weight;
    }

    (earned / total * 100.0).clamp(0.0, 100.0)
}

fn flags(
    input: &ValidationInput<'_>,
    agreement: &Agreement,
    config: &ValidationConfig,
) -> Vec<QualityFlag> {
    let mut flags = Vec::new();
    let buildings = input.buildings;
    let ensemble = input.ensemble;

    if ensemble.single_source {
        let method = ensemble
            .contributing_estimates
            .first()
            .map_or_else(|| "unknown".to_string(), |w| w.estimate.method.to_string());
        flags.push(QualityFlag::new(
            FlagCode::SingleSource,
            format!("Only the {method} estimator contributed; the interval is widened"),
        ));
    }

    if buildings.no_data {
        flags.push(QualityFlag::new(
            FlagCode::NoBuildingData,
            "The imagery service returned no building detections",
        ));
    } else if buildings.is_empty() {
        flags.push(QualityFlag::new(
            FlagCode::ZeroBuildings,
            format!(
                "None of {} detections survived normalization",
                buildings.raw_count
            ),
        ));
    } else if buildings.len() < config.low_building_count {
        flags.push(QualityFlag::new(
            FlagCode::LowBuildingCount,
            format!("Only {} buildings detected", buildings.len()),
        ));
    }

    if input.label.classification_confidence < config.low_classification_confidence {
        flags.push(QualityFlag::new(
            FlagCode::LowClassificationConfidence,
            format!(
                "Settlement type {} assigned with confidence {:.2}",
                input.label.settlement_type, input.label.classification_confidence
            ),
        ));
    }

    if agreement.score().is_none() {
        flags.push(QualityFlag::new(
            FlagCode::NoIndependentValidation,
            "No reference figures were available for comparison",
        ));
    }

    match input.source_status {
        SourceStatus::Online => {}
        SourceStatus::Degraded => flags.push(QualityFlag::new(
            FlagCode::DegradedSource,
            "The imagery service returned partial data",
        )),
        SourceStatus::Offline => flags.push(QualityFlag::new(
            FlagCode::SourceOffline,
            "The imagery service was unreachable; population is an area-based heuristic",
        )),
    }

    if !ensemble.failed_methods.is_empty() {
        let methods: Vec<String> = ensemble
            .failed_methods
            .iter()
            .map(ToString::to_string)
            .collect();
        flags.push(QualityFlag::new(
            FlagCode::EstimatorFailed,
            format!("No value from: {}", methods.join(", ")),
        ));
    }

    if ensemble.coefficient_of_variation > config.high_disagreement_cv {
        flags.push(QualityFlag::new(
            FlagCode::HighDisagreement,
            format!(
                "Estimators disagree (coefficient of variation {:.2})",
                ensemble.coefficient_of_variation
            ),
        ));
    }

    if buildings.provisional_share() > config.mostly_provisional_share {
        flags.push(QualityFlag::new(
            FlagCode::MostlyProvisional,
            format!(
                "{:.0}% of buildings were seen in a single snapshot",
                buildings.provisional_share() * 100.0
            ),
        ));
    }

    flags
}

#[cfg(test)]
mod tests {
    use super::*;
    use waste_map_estimate_models::{
        ConfidenceInterval, EstimationMethod, PopulationEstimate, WeightedEstimate,
    };
    use waste_map_normalize::{NormalizerConfig, normalize};
    use waste_map_settlement_models::{SettlementFeatures, SettlementType};
    use waste_map_source_models::BuildingRecord;
    use waste_map_spatial::ZoneGeometry;

    fn zone() -> ZoneGeometry {
        ZoneGeometry::from_ring(&[
            [0.0, 0.0],
            [0.01, 0.0],
            [0.01, 0.01],
            [0.0, 0.01],
            [0.0, 0.0],
        ])
        .unwrap()
    }

    /// `count` stable buildings with heights.
    fn buildings(count: u32) -> NormalizedBuildingSet {
        let records: Vec<BuildingRecord> = (0..count)
            .map(|i| {
                let mut r = BuildingRecord::new(
                    format!("b{i}"),
                    [0.0005 + 0.0004 * f64::from(i % 20), 0.0005 + 0.0004 * f64::from(i / 20)],
                    80.0,
                    0.9,
                );
                r.height_m = Some(3.0);
                r.snapshot_count = Some(3);
                r
            })
            .collect();
        normalize(&records, &zone(), &[], &NormalizerConfig::default())
    }

    fn label(confidence: f64) -> SettlementLabel {
        SettlementLabel {
            settlement_type: SettlementType::Mixed,
            classification_confidence: confidence,
            features: SettlementFeatures {
                building_count: 0,
                density_per_hectare: 0.0,
                density_per_km2: 0.0,
                mean_area_m2: None,
                mean_shape_complexity: None,
            },
            ambiguous: confidence < 0.4,
            sub_tiles: vec![],
        }
    }

    fn agreeing_ensemble() -> EnsembleEstimate {
        let weighted = |value, method, confidence, weight| WeightedEstimate {
            estimate: PopulationEstimate::new(value, method, confidence),
            weight,
        };
        EnsembleEstimate {
            consensus_value: 1001.8,
            confidence_interval_95: ConfidenceInterval {
                lower: 953.0,
                upper: 1051.0,
            },
            coefficient_of_variation: 0.0195,
            contributing_estimates: vec![
                weighted(1000.0, EstimationMethod::Volumetric, 0.8, 0.8 / 2.2),
                weighted(1020.0, EstimationMethod::Raster, 0.8, 0.8 / 2.2),
                weighted(980.0, EstimationMethod::Dasymetric, 0.6, 0.6 / 2.2),
            ],
            single_source: false,
            failed_methods: vec![],
        }
    }

    fn single_ensemble() -> EnsembleEstimate {
        let mut e = agreeing_ensemble();
        e.contributing_estimates.truncate(1);
        e.single_source = true;
        e.coefficient_of_variation = 0.0;
        e.failed_methods = vec![EstimationMethod::Raster, EstimationMethod::Dasymetric];
        e
    }

    fn reference() -> ReferenceDataset {
        ReferenceDataset {
            name: "census".to_string(),
            building_count: Some(100),
            population: Some(1000.0),
        }
    }

    #[test]
    fn three_agreeing_estimators_rate_good_or_better() {
        let ensemble = agreeing_ensemble();
        let set = buildings(100);
        let label = label(0.8);
        let reference = reference();
        let report = validate(
            &ValidationInput {
                ensemble: &ensemble,
                buildings: &set,
                label: &label,
                reference: Some(&reference),
                has_raster: true,
                source_status: SourceStatus::Online,
            },
            &ValidationConfig::default(),
        );
        assert!(report.quality_rating >= QualityRating::Good, "{report:?}");
        assert!((report.completeness_score - 100.0).abs() < 1e-9);
        assert!(report.flags.is_empty(), "{:?}", report.flags);
        match report.agreement {
            Agreement::Measured {
                compared_fields, ..
            } => assert_eq!(compared_fields.len(), 2),
            Agreement::NotApplicable => panic!("expected measured agreement"),
        }
    }

    #[test]
    fn no_reference_renormalizes_and_flags() {
        let ensemble = agreeing_ensemble();
        let set = buildings(100);
        let label = label(0.8);
        let report = validate(
            &ValidationInput {
                ensemble: &ensemble,
                buildings: &set,
                label: &label,
                reference: None,
                has_raster: true,
                source_status: SourceStatus::Online,
            },
            &ValidationConfig::default(),
        );
        assert_eq!(report.agreement, Agreement::NotApplicable);
        assert!(report.has_flag(FlagCode::NoIndependentValidation));
        assert!(report.quality_rating >= QualityRating::Good);
        assert!((report.completeness_score - 75.0).abs() < 1e-9);
    }

    #[test]
    fn completeness_never_rises_when_a_source_is_removed() {
        let ensemble = agreeing_ensemble();
        let full = buildings(100);
        let no_heights = {
            let mut set = full.clone();
            for b in &mut set.buildings {
                b.record.height_m = None;
            }
            set
        };
        let no_temporal = {
            let mut set = full.clone();
            set.multi_temporal = false;
            set
        };
        let label = label(0.8);
        let weak_label = self::label(0.2);
        let reference = reference();
        let config = ValidationConfig::default();

        let base_input = ValidationInput {
            ensemble: &ensemble,
            buildings: &full,
            label: &label,
            reference: Some(&reference),
            has_raster: true,
            source_status: SourceStatus::Online,
        };
        let base = validate(&base_input, &config).completeness_score;

        let variants = [
            ValidationInput {
                buildings: &no_heights,
                ..base_input
            },
            ValidationInput {
                buildings: &no_temporal,
                ..base_input
            },
            ValidationInput {
                reference: None,
                ..base_input
            },
            ValidationInput {
                has_raster: false,
                ..base_input
            },
            ValidationInput {
                label: &weak_label,
                ..base_input
            },
        ];
        for variant in &variants {
            let reduced = validate(variant, &config).completeness_score;
            assert!(reduced < base, "{reduced} !< {base}");
        }
    }

    #[test]
    fn single_source_is_capped_and_flagged() {
        let ensemble = single_ensemble();
        let set = buildings(100);
        let label = label(0.9);
        let reference = reference();
        let report = validate(
            &ValidationInput {
                ensemble: &ensemble,
                buildings: &set,
                label: &label,
                reference: Some(&reference),
                has_raster: false,
                source_status: SourceStatus::Online,
            },
            &ValidationConfig::default(),
        );
        assert!(report.overall_quality_score <= 60.0);
        assert!(report.has_flag(FlagCode::SingleSource));
        assert!(report.has_flag(FlagCode::EstimatorFailed));
    }

    #[test]
    fn offline_source_with_no_data_is_poor() {
        let ensemble = single_ensemble();
        let set = NormalizedBuildingSet::no_data(0.75);
        let label = label(0.0);
        let report = validate(
            &ValidationInput {
                ensemble: &ensemble,
                buildings: &set,
                label: &label,
                reference: None,
                has_raster: false,
                source_status: SourceStatus::Offline,
            },
            &ValidationConfig::default(),
        );
        assert!(report.overall_quality_score <= 40.0);
        assert_eq!(report.quality_rating, QualityRating::Poor);
        for code in [
            FlagCode::SourceOffline,
            FlagCode::NoBuildingData,
            FlagCode::LowClassificationConfidence,
        ] {
            assert!(report.has_flag(code), "missing {code}");
        }
        assert!(!report.has_flag(FlagCode::ZeroBuildings));
    }

    #[test]
    fn disagreement_and_low_counts_are_flagged() {
        let mut ensemble = agreeing_ensemble();
        ensemble.coefficient_of_variation = 0.4;
        let set = buildings(4);
        let label = label(0.8);
        let report = validate(
            &ValidationInput {
                ensemble: &ensemble,
                buildings: &set,
                label: &label,
                reference: None,
                has_raster: true,
                source_status: SourceStatus::Degraded,
            },
            &ValidationConfig::default(),
        );
        assert!(report.has_flag(FlagCode::HighDisagreement));
        assert!(report.has_flag(FlagCode::LowBuildingCount));
        assert!(report.has_flag(FlagCode::DegradedSource));
        assert!(report.overall_quality_score <= 50.0);
    }

    #[test]
    fn reference_without_usable_figures_earns_no_credit() {
        let ensemble = agreeing_ensemble();
        let set = buildings(100);
        let label = label(0.8);
        let empty = ReferenceDataset {
            name: "stale survey".to_string(),
            building_count: Some(0),
            population: Some(f64::NAN),
        };
        let config = ValidationConfig::default();
        let input = ValidationInput {
            ensemble: &ensemble,
            buildings: &set,
            label: &label,
            reference: Some(&empty),
            has_raster: true,
            source_status: SourceStatus::Online,
        };

        let with_empty = validate(&input, &config);
        let without = validate(
            &ValidationInput {
                reference: None,
                ..input
            },
            &config,
        );
        assert_eq!(with_empty.agreement, Agreement::NotApplicable);
        assert!(with_empty.has_flag(FlagCode::NoIndependentValidation));
        assert!((with_empty.completeness_score - without.completeness_score).abs() < 1e-9);
        assert!((with_empty.overall_quality_score - without.overall_quality_score).abs() < 1e-9);
    }

    #[test]
    fn rating_bands() {
        let config = ValidationConfig::default();
        assert_eq!(config.rating(95.0), QualityRating::Excellent);
        assert_eq!(config.rating(90.0), QualityRating::Excellent);
        assert_eq!(config.rating(80.0), QualityRating::Good);
        assert_eq!(config.rating(50.0), QualityRating::Fair);
        assert_eq!(config.rating(49.9), QualityRating::Poor);
    }
}
