#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Quality assessment types attached to every analysis result.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Quality band derived from the overall score.
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
pub enum QualityRating {
    Poor,
    Fair,
    Good,
    Excellent,
}

/// How the imagery service behaved during a run.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SourceStatus {
    /// Every request returned a complete response.
    #[default]
    Online,
    /// A response was partial, or one of the requests failed.
    Degraded,
    /// The service could not be reached; the area heuristic was used.
    Offline,
}

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
pub enum FlagSeverity {
    Info,
    Warning,
    Critical,
}

/// Machine-readable quality flag.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FlagCode {
    /// Only one estimator contributed.
    SingleSource,
    /// Detections were returned but none survived normalization.
    ZeroBuildings,
    /// The service returned no building detections at all.
    NoBuildingData,
    LowBuildingCount,
    LowClassificationConfidence,
    /// No reference dataset to compare against.
    NoIndependentValidation,
    DegradedSource,
    SourceOffline,
    EstimatorFailed,
    /// Estimators disagree beyond the coefficient-of-variation limit.
    HighDisagreement,
    /// Most surviving buildings were seen in a single snapshot.
    MostlyProvisional,
}

impl FlagCode {
    /// Severity a flag with this code is raised at.
    #[must_use]
    pub const fn severity(self) -> FlagSeverity {
        match self {
            Self::ZeroBuildings | Self::NoBuildingData | Self::SourceOffline => {
                FlagSeverity::Critical
            }
            Self::SingleSource
            | Self::LowBuildingCount
            | Self::LowClassificationConfidence
            | Self::DegradedSource
            | Self::HighDisagreement
            | Self::MostlyProvisional => FlagSeverity::Warning,
            Self::NoIndependentValidation | Self::EstimatorFailed => FlagSeverity::Info,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityFlag {
    pub code: FlagCode,
    pub severity: FlagSeverity,
    /// Human-readable explanation.
    pub message: String,
}

impl QualityFlag {
    #[must_use]
    pub fn new(code: FlagCode, message: impl Into<String>) -> Self {
        Self {
            code,
            severity: code.severity(),
            message: message.into(),
        }
    }
}

/// Agreement between the engine's output and a reference dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Agreement {
    Measured {
        /// 0-100; higher is closer agreement.
        score: f64,
        /// Mean absolute percentage difference over the compared fields.
        #[serde(rename = "meanAbsPctDiff")]
        mean_abs_pct_diff: f64,
        #[serde(rename = "comparedFields")]
        compared_fields: Vec<String>,
    },
    NotApplicable,
}

impl Agreement {
    #[must_use]
    pub const fn score(&self) -> Option<f64> {
        match self {
            Self::Measured { score, .. } => Some(*score),
            Self::NotApplicable => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub agreement: Agreement,
    /// 0-100 share of the optional inputs that were available.
    pub completeness_score: f64,
    /// 0-100 after caps.
    pub overall_quality_score: f64,
    pub quality_rating: QualityRating,
    pub flags: Vec<QualityFlag>,
}

impl ValidationReport {
    #[must_use]
    pub fn has_flag(&self, code: FlagCode) -> bool {
        self.flags.iter().any(|f| f.code == code)
    }

    /// Highest severity among the flags, if any were raised.
    #[must_use]
    pub fn worst_severity(&self) -> Option<FlagSeverity> {
        self.flags.iter().map(|f| f.severity).max()
    }
}
