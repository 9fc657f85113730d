#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Waste-generation and revenue projection types.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Season used for an optional seasonal adjustment of waste output.
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
pub enum Season {
    Wet,
    Dry,
}

/// Symmetric relative uncertainty around a projected quantity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UncertaintyBand {
    /// Half-width relative to the central value, in percent.
    pub relative_percent: f64,
    /// Central value minus the band, clamped at zero.
    pub low: f64,
    /// Central value plus the band.
    pub high: f64,
}

impl UncertaintyBand {
    /// Band of `relative` (a fraction, e.g. `0.3`) around `value`.
    #[must_use]
    pub fn around(value: f64, relative: f64) -> Self {
        let relative = if relative.is_finite() {
            relative.max(0.0)
        } else {
            0.0
        };
        Self {
            relative_percent: relative * 100.0,
            low: value.mul_add(-relative, value).max(0.0),
            high: value.mul_add(relative, value),
        }
    }
}

/// Projected waste generation for a zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WasteProjection {
    pub daily_kg: f64,
    pub weekly_tonnes: f64,
    pub monthly_tonnes: f64,
    /// Band on `daily_kg`; the same relative band applies to the weekly
    /// and monthly figures.
    pub uncertainty: UncertaintyBand,
    /// Residential rate applied, after the socioeconomic and seasonal
    /// multipliers.
    pub per_capita_kg_per_day: f64,
    /// Daily kilograms attributed to non-residential buildings.
    pub non_residential_kg_per_day: f64,
    /// Season applied, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seasonal_adjustment: Option<Season>,
}

/// Projected monthly collection revenue for a zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueProjection {
    pub billable_buildings: u64,
    pub monthly_gross: f64,
    /// Gross revenue × expected collection rate.
    pub expected_monthly_collected: f64,
    pub currency: String,
    /// Band on `expected_monthly_collected`.
    pub uncertainty: UncertaintyBand,
}
