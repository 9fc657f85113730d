#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Settlement classification types.
//!
//! A [`SettlementLabel`] is always derived from the normalized buildings of
//! a run and carries the feature values that produced it, so a consumer
//! can see why a zone was labelled the way it was.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use waste_map_source_models::CellBounds;

/// Urban morphology class of a zone.
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
pub enum SettlementType {
    /// Planned layout: sparse, large, regular buildings
    Formal,
    /// Unplanned layout: dense, small buildings
    Informal,
    /// Neither extreme, or conflicting evidence
    Mixed,
}

impl SettlementType {
    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Formal, Self::Informal, Self::Mixed]
    }
}

/// Morphological features a classification was computed from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementFeatures {
    /// Number of buildings considered.
    pub building_count: u64,
    /// Buildings per hectare.
    pub density_per_hectare: f64,
    /// Buildings per km².
    pub density_per_km2: f64,
    /// Mean footprint area in m².
    pub mean_area_m2: Option<f64>,
    /// Mean normalized shape complexity (1.0 = square).
    pub mean_shape_complexity: Option<f64>,
}

/// Classification of one sub-tile of a large zone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileLabel {
    /// Tile extent.
    pub bounds: CellBounds,
    /// Tile class.
    pub settlement_type: SettlementType,
    /// Tile classification confidence, 0-1.
    pub classification_confidence: f64,
    /// Features computed over the in-zone part of the tile.
    pub features: SettlementFeatures,
}

/// Settlement classification of a zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementLabel {
    /// Zone class.
    pub settlement_type: SettlementType,
    /// Classification confidence, 0-1.
    pub classification_confidence: f64,
    /// Features the decision was based on.
    pub features: SettlementFeatures,
    /// Confidence fell below the ambiguity floor.
    pub ambiguous: bool,
    /// Per-tile labels for large zones; empty for small ones.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_tiles: Vec<TileLabel>,
}
