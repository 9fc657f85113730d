//! File-backed imagery source.
//!
//! Serves a single JSON fixture containing both the building detections
//! and the population raster for an area. Records and cells outside the
//! requested zone's envelope are left out of the response, as a real
//! service would.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use waste_map_source_models::{BuildingResponse, CellBounds, RasterResponse};
use waste_map_spatial::ZoneGeometry;

use crate::{ImagerySource, SourceError};

/// On-disk fixture layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceFixture {
    pub version: String,
    #[serde(default)]
    pub buildings: BuildingResponse,
    #[serde(default)]
    pub raster: RasterResponse,
}

#[derive(Debug, Clone)]
pub struct FileImagerySource {
    fixture: SourceFixture,
}

impl FileImagerySource {
    #[must_use]
    pub const fn from_fixture(fixture: SourceFixture) -> Self {
        Self { fixture }
    }

    /// Reads a fixture from disk.
    ///
    /// # Errors
    ///
    /// * [`SourceError::Io`] if the file cannot be read
    /// * [`SourceError::Json`] if it is not a valid fixture
    pub async fn load(path: &Path) -> Result<Self, SourceError> {
        let text = tokio::fs::read_to_string(path).await?;
        let fixture: SourceFixture = serde_json::from_str(&text)?;
        log::info!(
            "Loaded imagery fixture {} (version {}, {} buildings, {} raster cells)",
            path.display(),
            fixture.version,
            fixture.buildings.records.len(),
            fixture.raster.cells.len(),
        );
        Ok(Self::from_fixture(fixture))
    }
}

fn envelope_bounds(zone: &ZoneGeometry) -> CellBounds {
    let envelope = zone.envelope();
    CellBounds {
        west: envelope.min().x,
        south: envelope.min().y,
        east: envelope.max().x,
        north: envelope.max().y,
    }
}

fn overlaps(a: &CellBounds, b: &CellBounds) -> bool {
    a.west <= b.east && b.west <= a.east && a.south <= b.north && b.south <= a.north
}

#[async_trait]
impl ImagerySource for FileImagerySource {
    fn version(&self) -> &str {
        &self.fixture.version
    }

    async fn get_buildings(&self, zone: &ZoneGeometry) -> Result<BuildingResponse, SourceError> {
        let bounds = envelope_bounds(zone);
        let records = self
            .fixture
            .buildings
            .records
            .iter()
            .filter(|r| {
                let [lon, lat] = r.centroid;
                // Malformed centroids pass through for the normalizer to count.
                !lon.is_finite()
                    || !lat.is_finite()
                    || ((bounds.west..=bounds.east).contains(&lon)
                        && (bounds.south..=bounds.north).contains(&lat))
            })
            .cloned()
            .collect();
        Ok(BuildingResponse {
            records,
            partial: self.fixture.buildings.partial,
        })
    }

    async fn get_population_raster(
        &self,
        zone: &ZoneGeometry,
    ) -> Result<RasterResponse, SourceError> {
        let bounds = envelope_bounds(zone);
        let cells = self
            .fixture
            .raster
            .cells
            .iter()
            .filter(|c| overlaps(&c.bounds, &bounds))
            .copied()
            .collect();
        Ok(RasterResponse {
            cells,
            partial: self.fixture.raster.partial,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waste_map_source_models::{BuildingRecord, RasterCell};

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

    fn fixture() -> SourceFixture {
        SourceFixture {
            version: "2026-06".to_string(),
            buildings: BuildingResponse {
                records: vec![
                    BuildingRecord::new("in", [0.005, 0.005], 50.0, 0.9),
                    BuildingRecord::new("out", [0.5, 0.5], 50.0, 0.9),
                ],
                partial: false,
            },
            raster: RasterResponse {
                cells: vec![
                    RasterCell {
                        bounds: CellBounds {
                            west: 0.0,
                            south: 0.0,
                            east: 0.01,
                            north: 0.01,
                        },
                        estimated_count: 10.0,
                    },
                    RasterCell {
                        bounds: CellBounds {
                            west: 1.0,
                            south: 1.0,
                            east: 1.01,
                            north: 1.01,
                        },
                        estimated_count: 10.0,
                    },
                ],
                partial: true,
            },
        }
    }

    #[tokio::test]
    async fn serves_only_what_overlaps_the_zone() {
        let source = FileImagerySource::from_fixture(fixture());
        assert_eq!(source.version(), "2026-06");

        let buildings = source.get_buildings(&zone()).await.unwrap();
        assert_eq!(buildings.records.len(), 1);
        assert_eq!(buildings.records[0].id, "in");

        let raster = source.get_population_raster(&zone()).await.unwrap();
        assert_eq!(raster.cells.len(), 1);
        assert!(raster.partial);
    }

    #[tokio::test]
    async fn loads_fixture_from_disk() {
        let path = std::env::temp_dir().join(format!(
            "waste_map_fixture_{}.json",
            std::process::id()
        ));
        tokio::fs::write(&path, serde_json::to_string(&fixture()).unwrap())
            .await
            .unwrap();
        let source = FileImagerySource::load(&path).await.unwrap();
        tokio::fs::remove_file(&path).await.unwrap();
        assert_eq!(source.version(), "2026-06");
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let err = FileImagerySource::load(Path::new("/nonexistent/fixture.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Io(_)));
    }
}
