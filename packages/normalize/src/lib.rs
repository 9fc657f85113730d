#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Feature normalization for raw building detections.
//!
//! Raw footprints from the imagery service pass through four filters, in
//! order:
//!
//! 1. **Spatial**: centroid must fall inside the zone polygon.
//! 2. **Confidence**: detector confidence must meet the threshold.
//! 3. **Temporal stability**: when the dataset carries multi-year
//!    snapshots, footprints seen only once are flagged `provisional` (or
//!    dropped under [`SingleSnapshotPolicy::Drop`]).
//! 4. **Vegetation**: footprints whose seasonal vegetation differential
//!    exceeds the threshold are seasonal canopy, not structures.
//!
//! Every drop is counted per stage in a [`DropHistogram`] so a run can
//! always explain where its candidates went.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use waste_map_source_models::{BuildingRecord, VegetationTile};
use waste_map_spatial::ZoneGeometry;

/// What to do with footprints seen in only one imagery snapshot when the
/// dataset is multi-temporal.
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
pub enum SingleSnapshotPolicy {
    /// Keep the footprint and mark it provisional.
    #[default]
    Provisional,
    /// Drop the footprint.
    Drop,
}

/// Normalizer thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct NormalizerConfig {
    /// Minimum detector confidence to keep a footprint.
    pub confidence_threshold: f64,
    /// Handling of single-snapshot footprints.
    pub single_snapshot_policy: SingleSnapshotPolicy,
    /// Vegetation differential above which a footprint is discarded.
    pub vegetation_threshold: f64,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.75,
            single_snapshot_policy: SingleSnapshotPolicy::Provisional,
            vegetation_threshold: 0.25,
        }
    }
}

/// Filter stage that discarded a candidate.
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
pub enum DropReason {
    /// Area or centroid not finite/positive.
    InvalidRecord,
    /// Centroid outside the zone polygon.
    OutsideZone,
    /// Detector confidence below threshold.
    LowConfidence,
    /// Seen in a single snapshot under the drop policy.
    TemporallyUnstable,
    /// Seasonal vegetation, not a structure.
    Vegetation,
}

/// Per-stage drop counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropHistogram {
    /// Dropped as malformed.
    pub invalid_record: u64,
    /// Dropped by the spatial filter.
    pub outside_zone: u64,
    /// Dropped by the confidence filter.
    pub low_confidence: u64,
    /// Dropped by the temporal-stability filter.
    pub temporally_unstable: u64,
    /// Dropped by the vegetation filter.
    pub vegetation: u64,
}

impl DropHistogram {
    fn record(&mut self, reason: DropReason) {
        match reason {
            DropReason::InvalidRecord => self.invalid_record += 1,
            DropReason::OutsideZone => self.outside_zone += 1,
            DropReason::LowConfidence => self.low_confidence += 1,
            DropReason::TemporallyUnstable => self.temporally_unstable += 1,
            DropReason::Vegetation => self.vegetation += 1,
        }
    }

    /// Number of candidates dropped at a given stage.
    #[must_use]
    pub const fn count(&self, reason: DropReason) -> u64 {
        match reason {
            DropReason::InvalidRecord => self.invalid_record,
            DropReason::OutsideZone => self.outside_zone,
            DropReason::LowConfidence => self.low_confidence,
            DropReason::TemporallyUnstable => self.temporally_unstable,
            DropReason::Vegetation => self.vegetation,
        }
    }

    /// Total candidates dropped across all stages.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.invalid_record
            + self.outside_zone
            + self.low_confidence
            + self.temporally_unstable
            + self.vegetation
    }
}

/// A footprint that survived normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedBuilding {
    /// The original detection.
    pub record: BuildingRecord,
    /// Seen in one snapshot of a multi-temporal dataset.
    pub provisional: bool,
    /// Shape complexity, as supplied or derived from the footprint ring.
    pub shape_complexity: Option<f64>,
}

impl NormalizedBuilding {
    /// Whether the building counts as a dwelling.
    #[must_use]
    pub const fn is_residential(&self) -> bool {
        self.record.building_use.is_residential()
    }
}

/// The buildings that survived every filter, plus an audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedBuildingSet {
    /// Surviving buildings, in input order.
    pub buildings: Vec<NormalizedBuilding>,
    /// Drop counts per stage.
    pub drops: DropHistogram,
    /// Number of raw candidates supplied.
    pub raw_count: u64,
    /// Confidence threshold applied.
    pub confidence_threshold: f64,
    /// Whether the in-zone candidates carried multi-temporal tags.
    pub multi_temporal: bool,
    /// Set when zero raw candidates were supplied. Distinct from zero
    /// buildings surviving the filters.
    pub no_data: bool,
}

impl NormalizedBuildingSet {
    /// An explicitly empty set for a run where the source returned nothing.
    #[must_use]
    pub const fn no_data(confidence_threshold: f64) -> Self {
        Self {
            buildings: Vec::new(),
            drops: DropHistogram {
                invalid_record: 0,
                outside_zone: 0,
                low_confidence: 0,
                temporally_unstable: 0,
                vegetation: 0,
            },
            raw_count: 0,
            confidence_threshold,
            multi_temporal: false,
            no_data: true,
        }
    }

    /// Number of surviving buildings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buildings.len()
    }

    /// Whether no building survived.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buildings.is_empty()
    }

    /// Share of surviving buildings with a measured height, 0-1.
    #[must_use]
    pub fn height_coverage(&self) -> f64 {
        self.share(|b| b.record.height_m.is_some_and(|h| h.is_finite() && h > 0.0))
    }

    /// Share of surviving buildings flagged provisional, 0-1.
    #[must_use]
    pub fn provisional_share(&self) -> f64 {
        self.share(|b| b.provisional)
    }

    /// Number of provisional buildings.
    #[must_use]
    pub fn provisional_count(&self) -> usize {
        self.buildings.iter().filter(|b| b.provisional).count()
    }

    /// Number of residential buildings.
    #[must_use]
    pub fn residential_count(&self) -> usize {
        self.buildings.iter().filter(|b| b.is_residential()).count()
    }

    /// Number of non-residential buildings.
    #[must_use]
    pub fn non_residential_count(&self) -> usize {
        self.len() - self.residential_count()
    }

    /// Total footprint area in m².
    #[must_use]
    pub fn total_footprint_m2(&self) -> f64 {
        self.buildings.iter().map(|b| b.record.area_m2).sum()
    }

    /// Residential footprint area in m².
    #[must_use]
    pub fn residential_footprint_m2(&self) -> f64 {
        self.buildings
            .iter()
            .filter(|b| b.is_residential())
            .map(|b| b.record.area_m2)
            .sum()
    }

    /// Mean footprint area in m², or `None` when empty.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean_area_m2(&self) -> Option<f64> {
        if self.is_empty() {
            return None;
        }
        Some(self.total_footprint_m2() / self.len() as f64)
    }

    /// Mean shape complexity over buildings that have one.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean_shape_complexity(&self) -> Option<f64> {
        let values: Vec<f64> = self
            .buildings
            .iter()
            .filter_map(|b| b.shape_complexity)
            .collect();
        if values.is_empty() {
            return None;
        }
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }

    #[allow(clippy::cast_precision_loss)]
    fn share(&self, predicate: impl Fn(&NormalizedBuilding) -> bool) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        self.buildings.iter().filter(|b| predicate(b)).count() as f64 / self.len() as f64
    }
}

/// Runs all four filters over the raw detections for one zone.
///
/// An empty `records` slice yields [`NormalizedBuildingSet::no_data`].
#[must_use]
pub fn normalize(
    records: &[BuildingRecord],
    zone: &ZoneGeometry,
    vegetation_tiles: &[VegetationTile],
    config: &NormalizerConfig,
) -> NormalizedBuildingSet {
    if records.is_empty() {
        log::info!("No raw building records supplied; returning no-data set");
        return NormalizedBuildingSet::no_data(config.confidence_threshold);
    }

    let mut drops = DropHistogram::default();

    // (a) spatial
    let mut in_zone = Vec::with_capacity(records.len());
    for record in records {
        if is_malformed(record) {
            drops.record(DropReason::InvalidRecord);
        } else if zone.contains(record.centroid) {
            in_zone.push(record);
        } else {
            drops.record(DropReason::OutsideZone);
        }
    }

    // Only a dataset that carries temporal tags can be filtered on them.
    let multi_temporal = in_zone.iter().any(|r| r.has_temporal_tags());

    let mut buildings = Vec::with_capacity(in_zone.len());
    for record in in_zone {
        // (b) confidence; NaN fails the comparison and is dropped.
        if record.confidence.is_nan() || record.confidence < config.confidence_threshold {
            drops.record(DropReason::LowConfidence);
            continue;
        }

        // (c) temporal stability
        let provisional = multi_temporal && !record.seen_in_multiple_snapshots();
        if provisional && config.single_snapshot_policy == SingleSnapshotPolicy::Drop {
            drops.record(DropReason::TemporallyUnstable);
            continue;
        }

        // (d) vegetation
        let differential = record.vegetation_differential.or_else(|| {
            vegetation_tiles
                .iter()
                .find(|tile| tile.bounds.contains(record.centroid))
                .map(|tile| tile.differential)
        });
        if differential.is_some_and(|d| d > config.vegetation_threshold) {
            drops.record(DropReason::Vegetation);
            continue;
        }

        let shape_complexity = record.shape_complexity.or_else(|| {
            record
                .footprint
                .as_deref()
                .and_then(waste_map_spatial::shape_complexity)
        });

        buildings.push(NormalizedBuilding {
            record: record.clone(),
            provisional,
            shape_complexity,
        });
    }

    let set = NormalizedBuildingSet {
        buildings,
        drops,
        raw_count: records.len() as u64,
        confidence_threshold: config.confidence_threshold,
        multi_temporal,
        no_data: false,
    };

    log::info!(
        "Normalized {} raw records to {} buildings ({} provisional); dropped: \
         invalid={} outside={} confidence={} temporal={} vegetation={}",
        set.raw_count,
        set.len(),
        set.provisional_count(),
        drops.invalid_record,
        drops.outside_zone,
        drops.low_confidence,
        drops.temporally_unstable,
        drops.vegetation,
    );

    set
}

fn is_malformed(record: &BuildingRecord) -> bool {
    !record.area_m2.is_finite()
        || record.area_m2 <= 0.0
        || !record.centroid[0].is_finite()
        || !record.centroid[1].is_finite()
}

#[cfg(test)]
mod tests {
    use super::*;
    use waste_map_source_models::{BuildingUse, CellBounds};

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

    fn building(id: &str, lon: f64, lat: f64, confidence: f64) -> BuildingRecord {
        BuildingRecord::new(id, [lon, lat], 60.0, confidence)
    }

    #[test]
    fn empty_input_is_no_data() {
        let set = normalize(&[], &zone(), &[], &NormalizerConfig::default());
        assert!(set.no_data);
        assert!(set.is_empty());
        assert_eq!(set.raw_count, 0);
    }

    #[test]
    fn zero_survivors_is_not_no_data() {
        let records = vec![building("a", 0.005, 0.005, 0.1)];
        let set = normalize(&records, &zone(), &[], &NormalizerConfig::default());
        assert!(!set.no_data);
        assert!(set.is_empty());
        assert_eq!(set.drops.low_confidence, 1);
    }

    #[test]
    fn counts_each_drop_stage() {
        let mut veg = building("veg", 0.002, 0.002, 0.9);
        veg.vegetation_differential = Some(0.4);
        let mut bad = building("bad", 0.003, 0.003, 0.9);
        bad.area_m2 = 0.0;
        let records = vec![
            building("keep", 0.005, 0.005, 0.9),
            building("out", 0.02, 0.005, 0.9),
            building("low", 0.005, 0.006, 0.5),
            veg,
            bad,
        ];
        let set = normalize(&records, &zone(), &[], &NormalizerConfig::default());

        assert_eq!(set.len(), 1);
        assert_eq!(set.buildings[0].record.id, "keep");
        assert_eq!(set.drops.count(DropReason::OutsideZone), 1);
        assert_eq!(set.drops.count(DropReason::LowConfidence), 1);
        assert_eq!(set.drops.count(DropReason::Vegetation), 1);
        assert_eq!(set.drops.count(DropReason::InvalidRecord), 1);
        assert_eq!(set.drops.total() + set.len() as u64, set.raw_count);
    }

    #[test]
    fn every_survivor_meets_threshold() {
        let records: Vec<BuildingRecord> = (0..20)
            .map(|i| building(&format!("b{i}"), 0.005, 0.005, f64::from(i) / 20.0))
            .collect();
        let config = NormalizerConfig {
            confidence_threshold: 0.6,
            ..NormalizerConfig::default()
        };
        let set = normalize(&records, &zone(), &[], &config);
        assert!(set.buildings.iter().all(|b| b.record.confidence >= 0.6));
        assert_eq!(set.len(), 8);
    }

    #[test]
    fn single_snapshot_buildings_are_provisional_by_default() {
        let mut stable = building("stable", 0.005, 0.005, 0.9);
        stable.snapshot_count = Some(3);
        let mut once = building("once", 0.006, 0.006, 0.9);
        once.snapshot_count = Some(1);
        let records = vec![stable, once];

        let set = normalize(&records, &zone(), &[], &NormalizerConfig::default());
        assert!(set.multi_temporal);
        assert_eq!(set.len(), 2);
        assert_eq!(set.provisional_count(), 1);
        assert!(set.buildings.iter().any(|b| b.record.id == "once" && b.provisional));

        let drop = NormalizerConfig {
            single_snapshot_policy: SingleSnapshotPolicy::Drop,
            ..NormalizerConfig::default()
        };
        let set = normalize(&records, &zone(), &[], &drop);
        assert_eq!(set.len(), 1);
        assert_eq!(set.drops.temporally_unstable, 1);
    }

    #[test]
    fn untagged_dataset_is_not_provisional() {
        let records = vec![building("a", 0.005, 0.005, 0.9)];
        let set = normalize(&records, &zone(), &[], &NormalizerConfig::default());
        assert!(!set.multi_temporal);
        assert_eq!(set.provisional_count(), 0);
    }

    #[test]
    fn vegetation_tile_applies_when_record_has_no_signal() {
        let tiles = vec![VegetationTile {
            bounds: CellBounds {
                west: 0.0,
                south: 0.0,
                east: 0.005,
                north: 0.005,
            },
            differential: 0.5,
        }];
        let records = vec![
            building("canopy", 0.001, 0.001, 0.9),
            building("roof", 0.007, 0.007, 0.9),
        ];
        let set = normalize(&records, &zone(), &tiles, &NormalizerConfig::default());
        assert_eq!(set.len(), 1);
        assert_eq!(set.buildings[0].record.id, "roof");
        assert_eq!(set.drops.vegetation, 1);
    }

    #[test]
    fn derives_shape_complexity_from_footprint() {
        let mut record = building("sq", 0.005, 0.005, 0.9);
        record.footprint = Some(vec![
            [0.005, 0.005],
            [0.0051, 0.005],
            [0.0051, 0.0051],
            [0.005, 0.0051],
            [0.005, 0.005],
        ]);
        let set = normalize(&[record], &zone(), &[], &NormalizerConfig::default());
        let complexity = set.buildings[0].shape_complexity.unwrap();
        assert!((complexity - 1.0).abs() < 0.02, "{complexity}");
    }

    #[test]
    fn summaries() {
        let mut tall = building("tall", 0.005, 0.005, 0.9);
        tall.height_m = Some(9.0);
        let mut shop = building("shop", 0.006, 0.006, 0.9);
        shop.building_use = BuildingUse::Commercial;
        shop.area_m2 = 140.0;
        let set = normalize(&[tall, shop], &zone(), &[], &NormalizerConfig::default());

        assert!((set.height_coverage() - 0.5).abs() < f64::EPSILON);
        assert_eq!(set.residential_count(), 1);
        assert_eq!(set.non_residential_count(), 1);
        assert!((set.total_footprint_m2() - 200.0).abs() < f64::EPSILON);
        assert!((set.residential_footprint_m2() - 60.0).abs() < f64::EPSILON);
        assert!((set.mean_area_m2().unwrap() - 100.0).abs() < f64::EPSILON);
    }
}
