#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Raw input types produced by the external imagery/raster service.
//!
//! Everything here is consumed read-only by the engine. Building records
//! arrive as detected footprints with a detector confidence and optional
//! temporal tags; population rasters arrive as `(cell bounds, count)` grids.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use waste_map_zone_models::LonLat;

/// Building use signal reported by the detector, when it has one.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
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
pub enum BuildingUse {
    /// Dwelling
    Residential,
    /// Shop, office, market stall
    Commercial,
    /// School, clinic, government building
    Institutional,
    /// Workshop, factory, warehouse
    Industrial,
    /// No use signal; treated as residential
    #[default]
    Unknown,
}

impl BuildingUse {
    /// Whether buildings of this use are counted as dwellings.
    ///
    /// `Unknown` counts as residential: most detected footprints in the
    /// zones this engine targets are homes.
    #[must_use]
    pub const fn is_residential(self) -> bool {
        matches!(self, Self::Residential | Self::Unknown)
    }
}

/// One detected building footprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildingRecord {
    /// Detector-assigned identifier.
    pub id: String,
    /// Footprint centroid as `[lon, lat]`.
    pub centroid: LonLat,
    /// Footprint ring, when the detector supplies the full polygon.
    #[serde(default)]
    pub footprint: Option<Vec<LonLat>>,
    /// Footprint area in m².
    pub area_m2: f64,
    /// Detector confidence, 0-1.
    pub confidence: f64,
    /// Estimated building height in metres.
    #[serde(default)]
    pub height_m: Option<f64>,
    /// First year the footprint was observed.
    #[serde(default)]
    pub first_seen: Option<i32>,
    /// Last year the footprint was observed.
    #[serde(default)]
    pub last_seen: Option<i32>,
    /// Number of independent imagery snapshots containing the footprint.
    #[serde(default)]
    pub snapshot_count: Option<u32>,
    /// Normalized shape complexity (1.0 = square).
    #[serde(default)]
    pub shape_complexity: Option<f64>,
    /// Seasonal vegetation-index differential at the footprint.
    #[serde(default)]
    pub vegetation_differential: Option<f64>,
    /// Use signal, if classified.
    #[serde(default)]
    pub building_use: BuildingUse,
}

impl BuildingRecord {
    /// Creates a record with only the required detector fields set.
    #[must_use]
    pub fn new(id: impl Into<String>, centroid: LonLat, area_m2: f64, confidence: f64) -> Self {
        Self {
            id: id.into(),
            centroid,
            footprint: None,
            area_m2,
            confidence,
            height_m: None,
            first_seen: None,
            last_seen: None,
            snapshot_count: None,
            shape_complexity: None,
            vegetation_differential: None,
            building_use: BuildingUse::Unknown,
        }
    }

    /// Whether the record carries any multi-temporal evidence at all.
    #[must_use]
    pub const fn has_temporal_tags(&self) -> bool {
        self.snapshot_count.is_some() || (self.first_seen.is_some() && self.last_seen.is_some())
    }

    /// Whether the footprint was seen in at least two independent snapshots.
    #[must_use]
    pub fn seen_in_multiple_snapshots(&self) -> bool {
        if let Some(count) = self.snapshot_count {
            return count >= 2;
        }
        matches!(
            (self.first_seen, self.last_seen),
            (Some(first), Some(last)) if last > first
        )
    }
}

/// Axis-aligned cell bounds in WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellBounds {
    /// Minimum longitude.
    pub west: f64,
    /// Minimum latitude.
    pub south: f64,
    /// Maximum longitude.
    pub east: f64,
    /// Maximum latitude.
    pub north: f64,
}

impl CellBounds {
    /// Whether the bounds contain the given `[lon, lat]` (half-open on the
    /// east and north edges, so adjacent cells never both claim a point).
    #[must_use]
    pub fn contains(&self, point: LonLat) -> bool {
        point[0] >= self.west
            && point[0] < self.east
            && point[1] >= self.south
            && point[1] < self.north
    }

    /// Whether the bounds are non-degenerate and finite.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        [self.west, self.south, self.east, self.north]
            .iter()
            .all(|v| v.is_finite())
            && self.east > self.west
            && self.north > self.south
    }
}

/// One cell of an externally supplied population-density raster.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RasterCell {
    /// Cell extent.
    pub bounds: CellBounds,
    /// Estimated number of people living in the whole cell.
    pub estimated_count: f64,
}

/// Seasonal vegetation signal for a tile of imagery.
///
/// Used when the detector cannot attach the differential per record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VegetationTile {
    /// Tile extent.
    pub bounds: CellBounds,
    /// Wet-minus-dry season vegetation-index differential.
    pub differential: f64,
}

/// An independent dataset used to cross-check a run's results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceDataset {
    /// Name of the reference source (e.g. a second footprint provider).
    pub name: String,
    /// Building count the reference reports for the zone.
    #[serde(default)]
    pub building_count: Option<u64>,
    /// Population the reference reports for the zone.
    #[serde(default)]
    pub population: Option<f64>,
}

impl ReferenceDataset {
    /// The building count, if it is positive.
    #[must_use]
    pub fn usable_building_count(&self) -> Option<u64> {
        self.building_count.filter(|&c| c > 0)
    }

    /// The population, if it is finite and positive.
    #[must_use]
    pub fn usable_population(&self) -> Option<f64> {
        self.population.filter(|p| p.is_finite() && *p > 0.0)
    }

    /// Whether the reference carries at least one comparable figure.
    #[must_use]
    pub fn has_figures(&self) -> bool {
        self.usable_building_count().is_some() || self.usable_population().is_some()
    }
}

/// Response envelope for a building-footprint request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildingResponse {
    /// Detected footprints.
    pub records: Vec<BuildingRecord>,
    /// Set when the service answered with a partial or stale result.
    #[serde(default)]
    pub partial: bool,
}

/// Response envelope for a population-raster request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RasterResponse {
    /// Raster cells intersecting the requested zone.
    pub cells: Vec<RasterCell>,
    /// Set when the service answered with a partial or stale result.
    #[serde(default)]
    pub partial: bool,
}
