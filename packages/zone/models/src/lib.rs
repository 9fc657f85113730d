#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Zone types shared across the estimation pipeline.
//!
//! A [`Zone`] is the user-drawn polygon under analysis together with the
//! metadata the operator supplied when drawing it. Zones are immutable once
//! handed to the engine; re-analysis of an edited zone is a new run.
//!
//! Area and perimeter are intentionally absent from this type. They are
//! always derived from the ring by `waste_map_spatial::ZoneGeometry`.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// A `[longitude, latitude]` coordinate pair in WGS84 degrees.
pub type LonLat = [f64; 2];

/// Primary land use the operator assigned to a zone.
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
pub enum ZoneType {
    /// Predominantly housing
    Residential,
    /// Shops, offices, markets
    Commercial,
    /// Factories, warehouses, yards
    Industrial,
    /// Schools, hospitals, government
    Institutional,
    /// Residential with substantial non-residential use
    MixedUse,
    /// Parks and open land
    GreenSpace,
}

impl ZoneType {
    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Residential,
            Self::Commercial,
            Self::Industrial,
            Self::Institutional,
            Self::MixedUse,
            Self::GreenSpace,
        ]
    }
}

/// Operator hint about the socioeconomic level of a zone.
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
pub enum SocioeconomicLevel {
    /// Low-income area
    Low,
    /// Middle-income area
    Middle,
    /// High-income area
    High,
}

/// A user-drawn analysis polygon plus operator metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Zone {
    /// Caller-assigned identifier, carried through to exports.
    pub id: String,
    /// Optional human-readable name.
    #[serde(default)]
    pub name: Option<String>,
    /// Closed exterior ring of `[lon, lat]` vertices (first == last).
    pub ring: Vec<LonLat>,
    /// Operator-assigned land use.
    pub zone_type: ZoneType,
    /// Declared population density hint, in people per km².
    #[serde(default)]
    pub declared_density: Option<f64>,
    /// Declared socioeconomic level hint.
    #[serde(default)]
    pub socioeconomic_level: Option<SocioeconomicLevel>,
}

impl Zone {
    /// Creates a zone with no optional hints.
    #[must_use]
    pub fn new(id: impl Into<String>, ring: Vec<LonLat>, zone_type: ZoneType) -> Self {
        Self {
            id: id.into(),
            name: None,
            ring,
            zone_type,
            declared_density: None,
            socioeconomic_level: None,
        }
    }

    /// Sets the declared density hint (people per km²).
    #[must_use]
    pub const fn with_declared_density(mut self, density: f64) -> Self {
        self.declared_density = Some(density);
        self
    }

    /// Sets the socioeconomic level hint.
    #[must_use]
    pub const fn with_socioeconomic_level(mut self, level: SocioeconomicLevel) -> Self {
        self.socioeconomic_level = Some(level);
        self
    }
}
