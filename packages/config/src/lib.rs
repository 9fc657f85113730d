#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Engine configuration.
//!
//! Every threshold, density, occupancy factor, per-capita rate, tariff and
//! scoring weight the engine uses lives in [`EngineConfig`]. Each section
//! has defaults, so a TOML file only needs the keys it overrides. The
//! shipped `default.toml` lists every key with its default value.

use std::path::Path;

use serde::{Deserialize, Serialize};
use waste_map_estimate::EstimatorConfig;
use waste_map_estimate::ensemble::EnsembleConfig;
use waste_map_estimate::fallback::AreaHeuristicConfig;
use waste_map_normalize::NormalizerConfig;
use waste_map_settlement::ClassifierConfig;
use waste_map_source::http::HttpSourceConfig;
use waste_map_validation::ValidationConfig;
use waste_map_waste::{RevenueConfig, WasteConfig};

/// Single-source intervals are never narrower than ±30%.
const MIN_SINGLE_SOURCE_HALF_WIDTH: f64 = 0.3;

/// The shipped defaults, documented.
pub const DEFAULT_TOML: &str = include_str!("../default.toml");

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value is outside its meaningful range.
    #[error("Invalid configuration: {key} {message}")]
    Invalid { key: String, message: String },
}

/// Run-level limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct RuntimeConfig {
    /// Deadline for each imagery-service call.
    pub source_timeout_secs: u64,
    /// Zones kept in the feature cache before the oldest is evicted.
    pub cache_capacity: usize,
    /// Zones analysed at once by batch runs.
    pub batch_concurrency: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            source_timeout_secs: 30,
            cache_capacity: 256,
            batch_concurrency: 4,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct EngineConfig {
    pub runtime: RuntimeConfig,
    pub source: HttpSourceConfig,
    pub normalizer: NormalizerConfig,
    pub classifier: ClassifierConfig,
    pub estimators: EstimatorConfig,
    pub ensemble: EnsembleConfig,
    pub fallback: AreaHeuristicConfig,
    pub waste: WasteConfig,
    pub revenue: RevenueConfig,
    pub validation: ValidationConfig,
}

impl EngineConfig {
    /// Parses and validates a TOML document. Missing keys take their
    /// defaults.
    ///
    /// # Errors
    ///
    /// * [`ConfigError::Parse`] if the document is not valid TOML or has
    ///   wrongly typed values
    /// * [`ConfigError::Invalid`] if a value is out of range
    pub fn from_toml_str(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::de::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// * [`ConfigError::Io`] if the file cannot be read
    /// * any error from [`Self::from_toml_str`]
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        log::info!("Loaded engine configuration from {}", path.display());
        Ok(config)
    }

    /// Serializes the effective configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Serialize`] if serialization fails.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Checks that every value is in its meaningful range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let unit = [
            ("normalizer.confidence_threshold", self.normalizer.confidence_threshold),
            ("normalizer.vegetation_threshold", self.normalizer.vegetation_threshold),
            ("classifier.ambiguity_floor", self.classifier.ambiguity_floor),
            ("fallback.confidence", self.fallback.confidence),
            ("revenue.collection_rate", self.revenue.collection_rate),
            (
                "validation.low_classification_confidence",
                self.validation.low_classification_confidence,
            ),
            (
                "validation.mostly_provisional_share",
                self.validation.mostly_provisional_share,
            ),
            (
                "estimators.volumetric_base_confidence",
                self.estimators.volumetric_base_confidence,
            ),
            (
                "estimators.raster_base_confidence",
                self.estimators.raster_base_confidence,
            ),
            (
                "estimators.dasymetric_base_confidence",
                self.estimators.dasymetric_base_confidence,
            ),
        ];
        for (key, value) in unit {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(key, "must be between 0 and 1"));
            }
        }

        let positive = [
            ("classifier.tile_size_m", self.classifier.tile_size_m),
            ("estimators.informal_m2_per_person", self.estimators.informal_m2_per_person),
            ("estimators.formal_m2_per_person", self.estimators.formal_m2_per_person),
            ("estimators.mixed_m2_per_person", self.estimators.mixed_m2_per_person),
            (
                "estimators.commercial_m2_per_person",
                self.estimators.commercial_m2_per_person,
            ),
            ("estimators.floor_height_m", self.estimators.floor_height_m),
            ("validation.cv_ceiling", self.validation.cv_ceiling),
        ];
        for (key, value) in positive {
            if value.is_nan() || value <= 0.0 {
                return Err(invalid(key, "must be greater than 0"));
            }
        }

        let w = &self.waste;
        let r = &self.revenue;
        let f = &self.fallback;
        let non_negative = [
            ("ensemble.min_relative_half_width", self.ensemble.min_relative_half_width),
            ("waste.informal_kg_per_capita", w.informal_kg_per_capita),
            ("waste.mixed_kg_per_capita", w.mixed_kg_per_capita),
            ("waste.formal_kg_per_capita", w.formal_kg_per_capita),
            ("waste.low_income_multiplier", w.low_income_multiplier),
            ("waste.middle_income_multiplier", w.middle_income_multiplier),
            ("waste.high_income_multiplier", w.high_income_multiplier),
            (
                "waste.residential_zone_kg_per_building",
                w.residential_zone_kg_per_building,
            ),
            ("waste.mixed_use_zone_kg_per_building", w.mixed_use_zone_kg_per_building),
            (
                "waste.commercial_zone_kg_per_building",
                w.commercial_zone_kg_per_building,
            ),
            (
                "waste.institutional_zone_kg_per_building",
                w.institutional_zone_kg_per_building,
            ),
            (
                "waste.industrial_zone_kg_per_building",
                w.industrial_zone_kg_per_building,
            ),
            (
                "waste.green_space_zone_kg_per_building",
                w.green_space_zone_kg_per_building,
            ),
            ("waste.wet_season_multiplier", w.wet_season_multiplier),
            ("waste.dry_season_multiplier", w.dry_season_multiplier),
            (
                "waste.unmeasured_relative_half_width",
                w.unmeasured_relative_half_width,
            ),
            ("revenue.informal_monthly_charge", r.informal_monthly_charge),
            ("revenue.mixed_monthly_charge", r.mixed_monthly_charge),
            ("revenue.formal_monthly_charge", r.formal_monthly_charge),
            ("revenue.commercial_monthly_charge", r.commercial_monthly_charge),
            ("fallback.residential_density_km2", f.residential_density_km2),
            ("fallback.mixed_use_density_km2", f.mixed_use_density_km2),
            ("fallback.commercial_density_km2", f.commercial_density_km2),
            ("fallback.institutional_density_km2", f.institutional_density_km2),
            ("fallback.industrial_density_km2", f.industrial_density_km2),
            ("fallback.green_space_density_km2", f.green_space_density_km2),
        ];
        for (key, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(key, "must be 0 or greater"));
            }
        }

        let single = self.ensemble.single_source_min_relative_half_width;
        if !single.is_finite() || single < MIN_SINGLE_SOURCE_HALF_WIDTH {
            return Err(invalid(
                "ensemble.single_source_min_relative_half_width",
                "must be at least 0.3",
            ));
        }

        let v = &self.validation;
        for (key, value) in [
            ("validation.excellent_threshold", v.excellent_threshold),
            ("validation.good_threshold", v.good_threshold),
            ("validation.fair_threshold", v.fair_threshold),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(invalid(key, "must be between 0 and 100"));
            }
        }
        if v.good_threshold > v.excellent_threshold {
            return Err(invalid(
                "validation.good_threshold",
                "must not exceed validation.excellent_threshold",
            ));
        }
        if v.fair_threshold > v.good_threshold {
            return Err(invalid(
                "validation.fair_threshold",
                "must not exceed validation.good_threshold",
            ));
        }

        if self.classifier.formal_max_density_km2 >= self.classifier.informal_min_density_km2 {
            return Err(invalid(
                "classifier.formal_max_density_km2",
                "must be below classifier.informal_min_density_km2",
            ));
        }
        if self.classifier.informal_max_mean_area_m2 >= self.classifier.formal_min_mean_area_m2 {
            return Err(invalid(
                "classifier.informal_max_mean_area_m2",
                "must be below classifier.formal_min_mean_area_m2",
            ));
        }
        if self.runtime.source_timeout_secs == 0 {
            return Err(invalid("runtime.source_timeout_secs", "must be at least 1"));
        }
        if self.runtime.batch_concurrency == 0 {
            return Err(invalid("runtime.batch_concurrency", "must be at least 1"));
        }

        Ok(())
    }
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waste_map_normalize::SingleSnapshotPolicy;

    #[test]
    fn shipped_defaults_match_code_defaults() {
        let parsed = EngineConfig::from_toml_str(DEFAULT_TOML).unwrap();
        assert_eq!(parsed, EngineConfig::default());
    }

    #[test]
    fn empty_document_is_all_defaults() {
        assert_eq!(
            EngineConfig::from_toml_str("").unwrap(),
            EngineConfig::default()
        );
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            [normalizer]
            confidence_threshold = 0.6
            single_snapshot_policy = "drop"

            [waste]
            formal_kg_per_capita = 0.7
            "#,
        )
        .unwrap();
        assert!((config.normalizer.confidence_threshold - 0.6).abs() < f64::EPSILON);
        assert_eq!(
            config.normalizer.single_snapshot_policy,
            SingleSnapshotPolicy::Drop
        );
        assert!((config.normalizer.vegetation_threshold - 0.25).abs() < f64::EPSILON);
        assert!((config.waste.formal_kg_per_capita - 0.7).abs() < f64::EPSILON);
        assert!((config.waste.informal_kg_per_capita - 0.4).abs() < f64::EPSILON);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let err = EngineConfig::from_toml_str("[normalizer]\nconfidence_threshold = 1.5\n")
            .unwrap_err();
        assert!(
            matches!(&err, ConfigError::Invalid { key, .. } if key == "normalizer.confidence_threshold"),
            "{err}"
        );

        let err = EngineConfig::from_toml_str(
            "[classifier]\nformal_max_density_km2 = 150.0\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    fn rejected_key(toml_str: &str) -> String {
        match EngineConfig::from_toml_str(toml_str) {
            Err(ConfigError::Invalid { key, .. }) => key,
            other => panic!("expected an invalid key for {toml_str:?}, got {other:?}"),
        }
    }

    #[test]
    fn ensemble_widths_are_range_checked() {
        assert_eq!(
            rejected_key("[ensemble]\nsingle_source_min_relative_half_width = -0.5\n"),
            "ensemble.single_source_min_relative_half_width"
        );
        assert_eq!(
            rejected_key("[ensemble]\nsingle_source_min_relative_half_width = 0.1\n"),
            "ensemble.single_source_min_relative_half_width"
        );
        assert_eq!(
            rejected_key("[ensemble]\nmin_relative_half_width = -0.01\n"),
            "ensemble.min_relative_half_width"
        );
        assert!(
            EngineConfig::from_toml_str("[ensemble]\nsingle_source_min_relative_half_width = 0.45\n")
                .is_ok()
        );
    }

    #[test]
    fn negative_rates_are_rejected() {
        assert_eq!(
            rejected_key("[waste]\nformal_kg_per_capita = -0.1\n"),
            "waste.formal_kg_per_capita"
        );
        assert_eq!(
            rejected_key("[waste]\ncommercial_zone_kg_per_building = -3.0\n"),
            "waste.commercial_zone_kg_per_building"
        );
        assert_eq!(
            rejected_key("[waste]\nwet_season_multiplier = -1.0\n"),
            "waste.wet_season_multiplier"
        );
        assert_eq!(
            rejected_key("[revenue]\nformal_monthly_charge = -5.0\n"),
            "revenue.formal_monthly_charge"
        );
        assert_eq!(
            rejected_key("[fallback]\nresidential_density_km2 = -10.0\n"),
            "fallback.residential_density_km2"
        );
    }

    #[test]
    fn rating_thresholds_must_be_ordered() {
        assert_eq!(
            rejected_key("[validation]\ngood_threshold = 95.0\n"),
            "validation.good_threshold"
        );
        assert_eq!(
            rejected_key("[validation]\nfair_threshold = 80.0\n"),
            "validation.fair_threshold"
        );
        assert_eq!(
            rejected_key("[validation]\nexcellent_threshold = 120.0\n"),
            "validation.excellent_threshold"
        );
    }

    #[test]
    fn wrong_types_are_parse_errors() {
        let err = EngineConfig::from_toml_str("[runtime]\ncache_capacity = \"lots\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn serializes_back_to_equivalent_toml() {
        let config = EngineConfig::default();
        let text = config.to_toml_string().unwrap();
        assert_eq!(EngineConfig::from_toml_str(&text).unwrap(), config);
    }
}
