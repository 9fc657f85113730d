#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Zone analysis pipeline.
//!
//! [`Engine::analyze`] runs one zone through every stage in a fixed order:
//!
//! 1. validate the geometry
//! 2. fetch building detections and the population raster (in parallel,
//!    each under the configured deadline)
//! 3. normalize the detections
//! 4. classify the settlement
//! 5. run the estimator battery
//! 6. combine the estimates
//! 7. derive waste and revenue projections
//! 8. validate the run
//!
//! Source failures never fail a run. When the imagery service cannot be
//! reached at all, population falls back to an area heuristic and the
//! report says so. Normalized features are cached per engine, keyed by
//! geometry hash, dataset version and normalizer settings.

pub mod cache;
pub mod cancel;
pub mod export;
pub mod progress;

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::StreamExt;
use serde::Serialize;
use waste_map_config::EngineConfig;
use waste_map_estimate::battery::run_battery;
use waste_map_estimate::ensemble::{EnsembleError, combine};
use waste_map_estimate::fallback::area_heuristic;
use waste_map_estimate::{EstimationContext, Estimator};
use waste_map_estimate_models::EnsembleEstimate;
use waste_map_normalize::{DropHistogram, NormalizedBuildingSet, NormalizerConfig, normalize};
use waste_map_settlement::classify;
use waste_map_settlement_models::SettlementLabel;
use waste_map_source::{ImagerySource, SourceError};
use waste_map_source_models::{
    BuildingResponse, RasterResponse, ReferenceDataset, VegetationTile,
};
use waste_map_spatial::raster::ClippedRaster;
use waste_map_spatial::{GeometryError, ZoneGeometry};
use waste_map_validation::{ValidationInput, validate};
use waste_map_validation_models::{SourceStatus, ValidationReport};
use waste_map_waste::{project_revenue, project_waste};
use waste_map_waste_models::{RevenueProjection, Season, WasteProjection};
use waste_map_zone_models::Zone;

use crate::cache::{CacheKey, CachedFeatures, FeatureCache};
use crate::cancel::CancellationFlag;
use crate::progress::{AnalysisStage, NullProgress, ProgressCallback};

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// The zone polygon is unusable. Raised before any source call.
    #[error("Invalid zone geometry: {0}")]
    InvalidGeometry(#[from] GeometryError),

    /// The source answered but nothing could be estimated from it.
    #[error("No data for zone {zone_id}: no estimator produced a value")]
    NoData { zone_id: String },

    /// The caller's cancellation flag was set.
    #[error("Analysis cancelled before the {stage} stage")]
    Cancelled { stage: AnalysisStage },

    #[error("Invalid analysis option: {message}")]
    InvalidOption { message: String },

    #[error(transparent)]
    Ensemble(#[from] EnsembleError),
}

/// Per-run settings.
#[derive(Debug, Clone, Default)]
pub struct AnalysisOptions {
    /// Overrides the configured normalizer confidence threshold.
    pub confidence_threshold: Option<f64>,
    /// Seasonal adjustment for the waste projection.
    pub season: Option<Season>,
    /// Independent data to validate against.
    pub reference: Option<ReferenceDataset>,
    /// Also project collection revenue.
    pub include_revenue: bool,
    /// Zone-level vegetation differentials for footprints that carry none.
    /// Runs that supply tiles bypass the feature cache.
    pub vegetation_tiles: Vec<VegetationTile>,
    pub cancellation: Option<CancellationFlag>,
}

/// What the normalizer kept and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizationSummary {
    pub raw_count: u64,
    pub surviving_count: u64,
    pub provisional_count: u64,
    pub residential_count: u64,
    pub non_residential_count: u64,
    pub drops: DropHistogram,
    pub confidence_threshold: f64,
    pub multi_temporal: bool,
    pub no_data: bool,
}

impl From<&NormalizedBuildingSet> for NormalizationSummary {
    fn from(set: &NormalizedBuildingSet) -> Self {
        Self {
            raw_count: set.raw_count,
            surviving_count: set.len() as u64,
            provisional_count: set.provisional_count() as u64,
            residential_count: set.residential_count() as u64,
            non_residential_count: set.non_residential_count() as u64,
            drops: set.drops,
            confidence_threshold: set.confidence_threshold,
            multi_temporal: set.multi_temporal,
            no_data: set.no_data,
        }
    }
}

/// Everything one run produces.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub zone_id: String,
    pub zone_name: Option<String>,
    pub geometry_hash: String,
    pub area_km2: f64,
    pub source_status: SourceStatus,
    pub source_version: String,
    pub normalization: NormalizationSummary,
    pub settlement_label: SettlementLabel,
    pub ensemble_estimate: EnsembleEstimate,
    pub waste_projection: WasteProjection,
    pub revenue_projection: Option<RevenueProjection>,
    pub validation_report: ValidationReport,
}

/// Outcome of one zone in a batch.
#[derive(Debug)]
pub struct BatchOutcome {
    pub zone_id: String,
    pub result: Result<AnalysisResult, AnalysisError>,
}

/// What the two source calls returned, failures already logged.
struct Fetched {
    buildings: Option<BuildingResponse>,
    raster: Option<RasterResponse>,
}

impl Fetched {
    fn status(&self) -> SourceStatus {
        match (&self.buildings, &self.raster) {
            (None, None) => SourceStatus::Offline,
            (Some(b), Some(r)) if !b.partial && !r.partial => SourceStatus::Online,
            _ => SourceStatus::Degraded,
        }
    }
}

pub struct Engine {
    config: EngineConfig,
    source: Arc<dyn ImagerySource>,
    cache: Mutex<FeatureCache>,
}

impl Engine {
    #[must_use]
    pub fn new(config: EngineConfig, source: Arc<dyn ImagerySource>) -> Self {
        let cache = Mutex::new(FeatureCache::new(config.runtime.cache_capacity));
        Self {
            config,
            source,
            cache,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Number of zones currently held in the feature cache.
    #[must_use]
    pub fn cached_zones(&self) -> usize {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Analyses one zone.
    ///
    /// Running the same zone and options twice against an unchanged source
    /// returns equal results.
    ///
    /// # Errors
    ///
    /// * [`AnalysisError::InvalidGeometry`] if the zone polygon is invalid
    /// * [`AnalysisError::InvalidOption`] if an option is out of range
    /// * [`AnalysisError::NoData`] if the source answered completely but no
    ///   estimator could produce a value
    /// * [`AnalysisError::Cancelled`] if the cancellation flag was set
    pub async fn analyze(
        &self,
        zone: &Zone,
        options: &AnalysisOptions,
    ) -> Result<AnalysisResult, AnalysisError> {
        self.analyze_with_progress(zone, options, &NullProgress).await
    }

    /// [`Self::analyze`], reporting one unit of progress per stage.
    ///
    /// # Errors
    ///
    /// See [`Self::analyze`].
    pub async fn analyze_with_progress(
        &self,
        zone: &Zone,
        options: &AnalysisOptions,
        progress: &dyn ProgressCallback,
    ) -> Result<AnalysisResult, AnalysisError> {
        progress.set_total(AnalysisStage::count());

        let enter = |stage: AnalysisStage| {
            if options
                .cancellation
                .as_ref()
                .is_some_and(CancellationFlag::is_cancelled)
            {
                log::info!("Analysis of zone {} cancelled before {stage}", zone.id);
                return Err(AnalysisError::Cancelled { stage });
            }
            log::debug!("Zone {}: {stage}", zone.id);
            progress.set_message(format!("{}: {stage}", zone.id));
            Ok(())
        };

        enter(AnalysisStage::Geometry)?;
        let geometry = ZoneGeometry::from_zone(zone)?;
        let normalizer = self.normalizer_config(options)?;
        progress.inc(1);

        let key = CacheKey::new(geometry.geometry_hash(), self.source.version(), &normalizer);
        let cacheable = options.vegetation_tiles.is_empty();
        let cached = if cacheable { self.cached(&key) } else { None };

        let (features, source_status) = if let Some(features) = cached {
            log::info!("Feature cache hit for zone {}", zone.id);
            progress.inc(3);
            (features, SourceStatus::Online)
        } else {
            enter(AnalysisStage::Fetch)?;
            let fetched = self.fetch(&zone.id, &geometry).await;
            let status = fetched.status();
            progress.inc(1);

            enter(AnalysisStage::Normalize)?;
            let records = fetched
                .buildings
                .map(|response| response.records)
                .unwrap_or_default();
            let buildings = normalize(&records, &geometry, &options.vegetation_tiles, &normalizer);
            progress.inc(1);

            enter(AnalysisStage::Classify)?;
            let label = classify(&buildings, &geometry, &self.config.classifier);
            let raster = fetched
                .raster
                .map(|response| ClippedRaster::clip(&response.cells, &geometry))
                .filter(|raster| !raster.is_empty());
            progress.inc(1);

            let features = CachedFeatures {
                buildings,
                label,
                raster,
            };
            if cacheable && status == SourceStatus::Online {
                self.cache
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(key, features.clone());
            }
            (features, status)
        };

        enter(AnalysisStage::Estimate)?;
        let context = Arc::new(EstimationContext {
            buildings: features.buildings,
            label: features.label,
            raster: features.raster,
            zone_area_m2: geometry.area_m2(),
        });
        let (estimates, failed_methods) = if source_status == SourceStatus::Offline {
            log::warn!(
                "Imagery service unreachable for zone {}; using area heuristic",
                zone.id
            );
            let estimate = area_heuristic(zone, geometry.area_km2(), &self.config.fallback);
            (vec![estimate], Vec::new())
        } else {
            let battery = Estimator::battery(&self.config.estimators);
            let outcome = run_battery(&battery, Arc::clone(&context)).await;
            let failed_methods = outcome.failed_methods();
            if !outcome.estimates.is_empty() {
                (outcome.estimates, failed_methods)
            } else if source_status == SourceStatus::Online {
                return Err(AnalysisError::NoData {
                    zone_id: zone.id.clone(),
                });
            } else {
                log::warn!(
                    "No estimator succeeded on degraded data for zone {}; using area heuristic",
                    zone.id
                );
                let estimate = area_heuristic(zone, geometry.area_km2(), &self.config.fallback);
                (vec![estimate], failed_methods)
            }
        };
        progress.inc(1);

        enter(AnalysisStage::Combine)?;
        let ensemble = combine(estimates, failed_methods, &self.config.ensemble)?;
        progress.inc(1);

        enter(AnalysisStage::Derive)?;
        let buildings = &context.buildings;
        let label = &context.label;
        let waste_projection = project_waste(
            &ensemble,
            label.settlement_type,
            zone,
            buildings.non_residential_count(),
            options.season,
            &self.config.waste,
        );
        let revenue_projection = options.include_revenue.then(|| {
            project_revenue(
                buildings.residential_count(),
                buildings.non_residential_count(),
                label.settlement_type,
                ensemble.relative_half_width(),
                &self.config.revenue,
            )
        });
        progress.inc(1);

        enter(AnalysisStage::Validate)?;
        let validation_report = validate(
            &ValidationInput {
                ensemble: &ensemble,
                buildings,
                label,
                reference: options.reference.as_ref(),
                has_raster: context.raster.is_some(),
                source_status,
            },
            &self.config.validation,
        );
        progress.inc(1);

        log::info!(
            "Zone {}: {:.0} residents [{:.0}, {:.0}], {:.0} kg/day, quality {} ({:.0})",
            zone.id,
            ensemble.consensus_value,
            ensemble.confidence_interval_95.lower,
            ensemble.confidence_interval_95.upper,
            waste_projection.daily_kg,
            validation_report.quality_rating,
            validation_report.overall_quality_score,
        );
        progress.finish(format!("{}: done", zone.id));

        Ok(AnalysisResult {
            zone_id: zone.id.clone(),
            zone_name: zone.name.clone(),
            geometry_hash: geometry.geometry_hash().to_string(),
            area_km2: geometry.area_km2(),
            source_status,
            source_version: self.source.version().to_string(),
            normalization: NormalizationSummary::from(buildings),
            settlement_label: label.clone(),
            ensemble_estimate: ensemble,
            waste_projection,
            revenue_projection,
            validation_report,
        })
    }

    /// Analyses `zones` with at most `runtime.batch_concurrency` in flight.
    ///
    /// Outcomes come back in completion order. `progress` advances once
    /// per finished zone.
    pub async fn analyze_batch(
        &self,
        zones: &[Zone],
        options: &AnalysisOptions,
        progress: &dyn ProgressCallback,
    ) -> Vec<BatchOutcome> {
        progress.set_total(zones.len() as u64);
        let concurrency = self.config.runtime.batch_concurrency.max(1);

        let outcomes: Vec<BatchOutcome> = futures::stream::iter(zones)
            .map(|zone| async move {
                let result = self.analyze(zone, options).await;
                if let Err(e) = &result {
                    log::warn!("Zone {} failed: {e}", zone.id);
                }
                progress.inc(1);
                BatchOutcome {
                    zone_id: zone.id.clone(),
                    result,
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
        progress.finish(format!(
            "{} zones analysed, {failed} failed",
            outcomes.len()
        ));
        outcomes
    }

    fn normalizer_config(&self, options: &AnalysisOptions) -> Result<NormalizerConfig, AnalysisError> {
        let mut normalizer = self.config.normalizer.clone();
        if let Some(threshold) = options.confidence_threshold {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(AnalysisError::InvalidOption {
                    message: format!("confidence threshold {threshold} is outside [0, 1]"),
                });
            }
            normalizer.confidence_threshold = threshold;
        }
        Ok(normalizer)
    }

    fn cached(&self, key: &CacheKey) -> Option<CachedFeatures> {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    async fn fetch(&self, zone_id: &str, geometry: &ZoneGeometry) -> Fetched {
        let seconds = self.config.runtime.source_timeout_secs;
        let (buildings, raster) = tokio::join!(
            with_deadline("get_buildings", seconds, self.source.get_buildings(geometry)),
            with_deadline(
                "get_population_raster",
                seconds,
                self.source.get_population_raster(geometry)
            ),
        );
        Fetched {
            buildings: recovered(zone_id, "building detections", buildings),
            raster: recovered(zone_id, "population raster", raster),
        }
    }
}

async fn with_deadline<T>(
    operation: &str,
    seconds: u64,
    call: impl Future<Output = Result<T, SourceError>>,
) -> Result<T, SourceError> {
    tokio::time::timeout(Duration::from_secs(seconds), call)
        .await
        .unwrap_or_else(|_| {
            Err(SourceError::Timeout {
                operation: operation.to_string(),
                seconds,
            })
        })
}

fn recovered<T>(zone_id: &str, what: &str, result: Result<T, SourceError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            log::warn!(
                "Could not fetch {what} for zone {zone_id} ({}): {e}",
                if e.is_unreachable() { "unreachable" } else { "failed" }
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use waste_map_estimate_models::EstimationMethod;
    use waste_map_source::file::{FileImagerySource, SourceFixture};
    use waste_map_source_models::{BuildingRecord, CellBounds, RasterCell};
    use waste_map_validation_models::{FlagCode, QualityRating};
    use waste_map_zone_models::ZoneType;

    use super::*;

    /// In-memory source; `None` responses fail as unreachable.
    struct StubSource {
        buildings: Option<BuildingResponse>,
        raster: Option<RasterResponse>,
        delay: Option<Duration>,
        building_calls: AtomicUsize,
    }

    impl StubSource {
        fn new(buildings: Option<BuildingResponse>, raster: Option<RasterResponse>) -> Self {
            Self {
                buildings,
                raster,
                delay: None,
                building_calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.building_calls.load(Ordering::SeqCst)
        }
    }

    fn unavailable() -> SourceError {
        SourceError::Unavailable {
            message: "connection refused".to_string(),
        }
    }

    #[async_trait]
    impl ImagerySource for StubSource {
        fn version(&self) -> &str {
            "stub-1"
        }

        async fn get_buildings(
            &self,
            _zone: &ZoneGeometry,
        ) -> Result<BuildingResponse, SourceError> {
            self.building_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.buildings.clone().ok_or_else(unavailable)
        }

        async fn get_population_raster(
            &self,
            _zone: &ZoneGeometry,
        ) -> Result<RasterResponse, SourceError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.raster.clone().ok_or_else(unavailable)
        }
    }

    fn zone(id: &str) -> Zone {
        Zone::new(
            id,
            vec![[0.0, 0.0], [0.01, 0.0], [0.01, 0.01], [0.0, 0.01], [0.0, 0.0]],
            ZoneType::Residential,
        )
    }

    /// A 6 x 6 grid of small, tall-ish dwellings.
    fn buildings() -> BuildingResponse {
        let mut records = Vec::new();
        for i in 0..6 {
            for j in 0..6 {
                let mut record = BuildingRecord::new(
                    format!("b{i}{j}"),
                    [0.0008 + f64::from(i) * 0.0016, 0.0008 + f64::from(j) * 0.0016],
                    60.0,
                    0.9,
                );
                record.height_m = Some(5.0);
                records.push(record);
            }
        }
        BuildingResponse {
            records,
            partial: false,
        }
    }

    fn raster() -> RasterResponse {
        let mut cells = Vec::new();
        for i in 0..2 {
            for j in 0..2 {
                let west = f64::from(i) * 0.005;
                let south = f64::from(j) * 0.005;
                cells.push(RasterCell {
                    bounds: CellBounds {
                        west,
                        south,
                        east: west + 0.005,
                        north: south + 0.005,
                    },
                    estimated_count: 25.0,
                });
            }
        }
        RasterResponse {
            cells,
            partial: false,
        }
    }

    fn engine(source: Arc<dyn ImagerySource>) -> Engine {
        Engine::new(EngineConfig::default(), source)
    }

    #[tokio::test]
    async fn full_run_uses_all_estimators() {
        let source = Arc::new(StubSource::new(Some(buildings()), Some(raster())));
        let result = engine(source)
            .analyze(&zone("z1"), &AnalysisOptions::default())
            .await
            .unwrap();

        assert_eq!(result.source_status, SourceStatus::Online);
        assert_eq!(result.source_version, "stub-1");
        assert_eq!(result.normalization.surviving_count, 36);
        assert_eq!(result.ensemble_estimate.source_count(), 3);
        assert!(!result.ensemble_estimate.single_source);
        assert!(result.ensemble_estimate.consensus_value > 0.0);
        assert!(result.waste_projection.daily_kg > 0.0);
        assert!(result.revenue_projection.is_none());
        assert!(!result.validation_report.has_flag(FlagCode::SourceOffline));
    }

    #[tokio::test]
    async fn repeated_runs_are_identical_and_hit_the_cache() {
        let source = Arc::new(StubSource::new(Some(buildings()), Some(raster())));
        let engine = engine(Arc::clone(&source) as Arc<dyn ImagerySource>);
        let options = AnalysisOptions::default();

        let first = engine.analyze(&zone("z1"), &options).await.unwrap();
        let second = engine.analyze(&zone("z1"), &options).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(source.calls(), 1);
        assert_eq!(engine.cached_zones(), 1);
    }

    #[tokio::test]
    async fn changed_threshold_misses_the_cache() {
        let source = Arc::new(StubSource::new(Some(buildings()), Some(raster())));
        let engine = engine(Arc::clone(&source) as Arc<dyn ImagerySource>);

        engine
            .analyze(&zone("z1"), &AnalysisOptions::default())
            .await
            .unwrap();
        let stricter = AnalysisOptions {
            confidence_threshold: Some(0.95),
            ..AnalysisOptions::default()
        };
        let result = engine.analyze(&zone("z1"), &stricter).await.unwrap();

        assert_eq!(source.calls(), 2);
        // Every record is at 0.9 confidence, so only the raster contributes.
        assert_eq!(result.normalization.surviving_count, 0);
        assert_eq!(result.normalization.drops.low_confidence, 36);
        assert!(result.ensemble_estimate.single_source);
        assert!(result.ensemble_estimate.has_method(EstimationMethod::Raster));
    }

    #[tokio::test]
    async fn zero_buildings_and_no_raster_is_no_data() {
        let source = Arc::new(StubSource::new(
            Some(BuildingResponse::default()),
            Some(RasterResponse::default()),
        ));
        let err = engine(source)
            .analyze(&zone("empty"), &AnalysisOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::NoData { zone_id } if zone_id == "empty"));
    }

    #[tokio::test]
    async fn zero_buildings_with_raster_is_raster_only() {
        let source = Arc::new(StubSource::new(
            Some(BuildingResponse::default()),
            Some(raster()),
        ));
        let result = engine(source)
            .analyze(&zone("bare"), &AnalysisOptions::default())
            .await
            .unwrap();

        assert_eq!(result.source_status, SourceStatus::Online);
        assert!(result.normalization.no_data);
        let ensemble = &result.ensemble_estimate;
        assert!(ensemble.single_source);
        assert!(ensemble.has_method(EstimationMethod::Raster));
        assert!(ensemble.failed_methods.contains(&EstimationMethod::Volumetric));
        assert!(ensemble.failed_methods.contains(&EstimationMethod::Dasymetric));
        assert!(ensemble.relative_half_width() >= 0.3 - 1e-9);

        let report = &result.validation_report;
        assert!(report.has_flag(FlagCode::NoBuildingData));
        assert!(report.has_flag(FlagCode::SingleSource));
        assert!(!report.has_flag(FlagCode::ZeroBuildings));
        assert!(report.overall_quality_score <= 40.0);
        assert_eq!(report.quality_rating, QualityRating::Poor);
    }

    #[tokio::test]
    async fn unreachable_source_falls_back_to_area_heuristic() {
        let source = Arc::new(StubSource::new(None, None));
        let result = engine(source)
            .analyze(&zone("offline"), &AnalysisOptions::default())
            .await
            .unwrap();

        assert_eq!(result.source_status, SourceStatus::Offline);
        let ensemble = &result.ensemble_estimate;
        assert!(ensemble.single_source);
        assert!(ensemble.has_method(EstimationMethod::AreaHeuristic));
        assert!(ensemble.relative_half_width() >= 0.3 - 1e-9);
        // 5000 people/km² default for residential zones.
        let expected = result.area_km2 * 5000.0;
        assert!((ensemble.consensus_value - expected).abs() < 1e-6);

        let report = &result.validation_report;
        assert!(report.has_flag(FlagCode::SourceOffline));
        assert!(report.has_flag(FlagCode::NoBuildingData));
        assert!(report.overall_quality_score <= 40.0);
    }

    #[tokio::test]
    async fn offline_runs_are_not_cached() {
        let source = Arc::new(StubSource::new(None, None));
        let engine = engine(Arc::clone(&source) as Arc<dyn ImagerySource>);
        let options = AnalysisOptions::default();
        engine.analyze(&zone("z"), &options).await.unwrap();
        engine.analyze(&zone("z"), &options).await.unwrap();
        assert_eq!(source.calls(), 2);
        assert_eq!(engine.cached_zones(), 0);
    }

    #[tokio::test]
    async fn missing_raster_degrades_the_run() {
        let source = Arc::new(StubSource::new(Some(buildings()), None));
        let result = engine(source)
            .analyze(&zone("z"), &AnalysisOptions::default())
            .await
            .unwrap();

        assert_eq!(result.source_status, SourceStatus::Degraded);
        let ensemble = &result.ensemble_estimate;
        assert!(ensemble.has_method(EstimationMethod::Volumetric));
        assert!(ensemble.failed_methods.contains(&EstimationMethod::Raster));
        assert!(ensemble.failed_methods.contains(&EstimationMethod::Dasymetric));
        assert!(result.validation_report.has_flag(FlagCode::DegradedSource));
        assert!(result.validation_report.overall_quality_score <= 50.0);
    }

    #[tokio::test]
    async fn slow_source_times_out_into_fallback() {
        let mut stub = StubSource::new(Some(buildings()), Some(raster()));
        stub.delay = Some(Duration::from_secs(30));
        let mut config = EngineConfig::default();
        config.runtime.source_timeout_secs = 1;
        let engine = Engine::new(config, Arc::new(stub));

        let result = engine
            .analyze(&zone("slow"), &AnalysisOptions::default())
            .await
            .unwrap();
        assert_eq!(result.source_status, SourceStatus::Offline);
        assert!(
            result
                .ensemble_estimate
                .has_method(EstimationMethod::AreaHeuristic)
        );
    }

    #[tokio::test]
    async fn invalid_geometry_fails_before_fetching() {
        let source = Arc::new(StubSource::new(Some(buildings()), Some(raster())));
        let engine = engine(Arc::clone(&source) as Arc<dyn ImagerySource>);
        let zone = Zone::new(
            "bad",
            vec![[0.0, 0.0], [0.01, 0.0], [0.0, 0.0]],
            ZoneType::Residential,
        );

        let err = engine
            .analyze(&zone, &AnalysisOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidGeometry(_)));
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn cancelled_flag_stops_the_run() {
        let source = Arc::new(StubSource::new(Some(buildings()), Some(raster())));
        let engine = engine(Arc::clone(&source) as Arc<dyn ImagerySource>);
        let flag = CancellationFlag::new();
        flag.cancel();
        let options = AnalysisOptions {
            cancellation: Some(flag),
            ..AnalysisOptions::default()
        };

        let err = engine.analyze(&zone("z"), &options).await.unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::Cancelled {
                stage: AnalysisStage::Geometry
            }
        ));
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn out_of_range_threshold_is_rejected() {
        let source = Arc::new(StubSource::new(Some(buildings()), Some(raster())));
        let options = AnalysisOptions {
            confidence_threshold: Some(1.2),
            ..AnalysisOptions::default()
        };
        let err = engine(source)
            .analyze(&zone("z"), &options)
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidOption { .. }));
    }

    #[tokio::test]
    async fn revenue_and_season_follow_options() {
        let source = Arc::new(StubSource::new(Some(buildings()), Some(raster())));
        let engine = engine(source);
        let options = AnalysisOptions {
            include_revenue: true,
            season: Some(Season::Wet),
            reference: Some(ReferenceDataset {
                name: "census".to_string(),
                building_count: Some(36),
                population: None,
            }),
            ..AnalysisOptions::default()
        };

        let result = engine.analyze(&zone("z"), &options).await.unwrap();
        let revenue = result.revenue_projection.unwrap();
        assert_eq!(revenue.billable_buildings, 36);
        assert!(revenue.monthly_gross > 0.0);
        assert_eq!(result.waste_projection.seasonal_adjustment, Some(Season::Wet));
        assert!(result.validation_report.agreement.score().is_some());
        assert!(!result.validation_report.has_flag(FlagCode::NoIndependentValidation));
    }

    #[tokio::test]
    async fn file_source_runs_end_to_end() {
        let source = FileImagerySource::from_fixture(SourceFixture {
            version: "fixture-2026".to_string(),
            buildings: buildings(),
            raster: raster(),
        });
        let result = engine(Arc::new(source))
            .analyze(&zone("fixture"), &AnalysisOptions::default())
            .await
            .unwrap();
        assert_eq!(result.source_version, "fixture-2026");
        assert_eq!(result.source_status, SourceStatus::Online);
        assert_eq!(result.settlement_label.features.building_count, 36);
    }

    #[tokio::test]
    async fn batch_reports_every_zone() {
        struct Counter(AtomicUsize);
        impl ProgressCallback for Counter {
            fn set_total(&self, _total: u64) {}
            fn inc(&self, delta: u64) {
                self.0.fetch_add(usize::try_from(delta).unwrap(), Ordering::SeqCst);
            }
            fn set_message(&self, _msg: String) {}
            fn finish(&self, _msg: String) {}
        }

        let source = Arc::new(StubSource::new(Some(buildings()), Some(raster())));
        let engine = engine(source);
        let zones = vec![
            zone("a"),
            Zone::new("bad", vec![[0.0, 0.0]], ZoneType::Commercial),
            zone("c"),
        ];
        let counter = Counter(AtomicUsize::new(0));

        let outcomes = engine
            .analyze_batch(&zones, &AnalysisOptions::default(), &counter)
            .await;

        assert_eq!(outcomes.len(), 3);
        assert_eq!(counter.0.load(Ordering::SeqCst), 3);
        let failed: Vec<&str> = outcomes
            .iter()
            .filter(|o| o.result.is_err())
            .map(|o| o.zone_id.as_str())
            .collect();
        assert_eq!(failed, ["bad"]);
    }
}
