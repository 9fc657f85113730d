//! Per-engine cache of normalized features.
//!
//! Normalizing and classifying a zone only depends on the zone geometry,
//! the data the source served and the normalizer settings, so repeated
//! analyses of the same zone against the same dataset version skip the
//! fetch entirely. Entries are evicted oldest-first once the cache is
//! full.

use std::collections::{HashMap, VecDeque};

use waste_map_normalize::{NormalizedBuildingSet, NormalizerConfig, SingleSnapshotPolicy};
use waste_map_settlement_models::SettlementLabel;
use waste_map_spatial::raster::ClippedRaster;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub geometry_hash: String,
    pub source_version: String,
    /// Bit pattern of the confidence threshold, so the key can be hashed.
    pub confidence_threshold_bits: u64,
    pub single_snapshot_policy: SingleSnapshotPolicy,
}

impl CacheKey {
    #[must_use]
    pub fn new(geometry_hash: &str, source_version: &str, normalizer: &NormalizerConfig) -> Self {
        Self {
            geometry_hash: geometry_hash.to_string(),
            source_version: source_version.to_string(),
            confidence_threshold_bits: normalizer.confidence_threshold.to_bits(),
            single_snapshot_policy: normalizer.single_snapshot_policy,
        }
    }
}

/// Everything the engine reuses on a hit.
#[derive(Debug, Clone)]
pub struct CachedFeatures {
    pub buildings: NormalizedBuildingSet,
    pub label: SettlementLabel,
    pub raster: Option<ClippedRaster>,
}

#[derive(Debug)]
pub struct FeatureCache {
    capacity: usize,
    entries: HashMap<CacheKey, CachedFeatures>,
    order: VecDeque<CacheKey>,
}

impl FeatureCache {
    /// A cache holding at most `capacity` zones. Zero disables caching.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    #[must_use]
    pub fn get(&self, key: &CacheKey) -> Option<&CachedFeatures> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: CacheKey, features: CachedFeatures) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.insert(key.clone(), features).is_some() {
            return;
        }
        self.order.push_back(key);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                log::debug!("Evicting cached features for zone {}", oldest.geometry_hash);
                self.entries.remove(&oldest);
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}
