//! Population raster clipping.
//!
//! Raster cells are bulk-loaded into an R-tree keyed by their envelopes.
//! Clipping queries the tree with the zone envelope, then intersects each
//! candidate cell with the zone polygon to get the share of the cell that
//! lies inside the zone.

use rstar::{AABB, RTree, RTreeObject};
use waste_map_source_models::RasterCell;
use waste_map_zone_models::LonLat;

use crate::{ZoneGeometry, bounds_area_m2, bounds_to_rect};

/// Fractions below this are treated as edge-touching noise.
const MIN_FRACTION: f64 = 1e-9;

/// A raster cell stored in the R-tree, referring back into the cell list.
#[derive(Debug, Clone)]
struct CellEntry {
    index: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for CellEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// One raster cell after clipping against a zone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClippedCell {
    /// The source cell.
    pub cell: RasterCell,
    /// Share of the cell's area inside the zone, 0-1.
    pub in_zone_fraction: f64,
    /// Geodesic area of the whole cell in m².
    pub cell_area_m2: f64,
}

impl ClippedCell {
    /// Population attributed to the in-zone part under a uniform
    /// within-cell density assumption.
    #[must_use]
    pub fn in_zone_count(&self) -> f64 {
        self.cell.estimated_count * self.in_zone_fraction
    }

    /// Whether the whole cell lies inside the zone.
    #[must_use]
    pub fn is_interior(&self) -> bool {
        self.in_zone_fraction >= 1.0 - 1e-6
    }
}

/// A population raster clipped to a single zone.
#[derive(Debug, Clone)]
pub struct ClippedRaster {
    cells: Vec<ClippedCell>,
    tree: RTree<CellEntry>,
    coverage: f64,
}

impl ClippedRaster {
    /// Clips `cells` against `zone`.
    ///
    /// Cells with invalid bounds or negative counts are skipped with a
    /// warning; cells that do not overlap the zone are dropped.
    #[must_use]
    pub fn clip(cells: &[RasterCell], zone: &ZoneGeometry) -> Self {
        let entries: Vec<CellEntry> = cells
            .iter()
            .enumerate()
            .filter_map(|(index, cell)| {
                if !cell.bounds.is_valid() {
                    log::warn!("Skipping raster cell {index} with invalid bounds");
                    return None;
                }
                if !cell.estimated_count.is_finite() || cell.estimated_count < 0.0 {
                    log::warn!(
                        "Skipping raster cell {index} with invalid count {}",
                        cell.estimated_count
                    );
                    return None;
                }
                Some(CellEntry {
                    index,
                    envelope: AABB::from_corners(
                        [cell.bounds.west, cell.bounds.south],
                        [cell.bounds.east, cell.bounds.north],
                    ),
                })
            })
            .collect();
        let source_tree = RTree::bulk_load(entries);

        let mut clipped = Vec::new();
        for entry in source_tree.locate_in_envelope_intersecting(&zone.aabb()) {
            let cell = cells[entry.index];
            let in_zone_fraction = zone.overlap_fraction(&bounds_to_rect(&cell.bounds));
            if in_zone_fraction < MIN_FRACTION {
                continue;
            }

            clipped.push(ClippedCell {
                cell,
                in_zone_fraction,
                cell_area_m2: bounds_area_m2(&cell.bounds),
            });
        }

        let covered_m2: f64 = clipped
            .iter()
            .map(|c| c.cell_area_m2 * c.in_zone_fraction)
            .sum();
        let coverage = (covered_m2 / zone.area_m2()).clamp(0.0, 1.0);

        log::debug!(
            "Clipped raster: {} of {} cells overlap zone, coverage {:.1}%",
            clipped.len(),
            cells.len(),
            coverage * 100.0
        );

        let tree = RTree::bulk_load(
            clipped
                .iter()
                .enumerate()
                .map(|(index, c)| CellEntry {
                    index,
                    envelope: AABB::from_corners(
                        [c.cell.bounds.west, c.cell.bounds.south],
                        [c.cell.bounds.east, c.cell.bounds.north],
                    ),
                })
                .collect(),
        );

        Self {
            cells: clipped,
            tree,
            coverage,
        }
    }

    /// The clipped cells, in no particular order.
    #[must_use]
    pub fn cells(&self) -> &[ClippedCell] {
        &self.cells
    }

    /// Whether no cell overlaps the zone.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Share of the zone's area covered by raster cells, 0-1.
    #[must_use]
    pub const fn coverage(&self) -> f64 {
        self.coverage
    }

    /// Mean in-zone fraction over the clipped cells (1.0 when every cell
    /// sits wholly inside the zone).
    #[must_use]
    pub fn mean_in_zone_fraction(&self) -> f64 {
        if self.cells.is_empty() {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let n = self.cells.len() as f64;
        self.cells.iter().map(|c| c.in_zone_fraction).sum::<f64>() / n
    }

    /// Sum of in-zone population under uniform within-cell density.
    #[must_use]
    pub fn in_zone_population(&self) -> f64 {
        self.cells.iter().map(ClippedCell::in_zone_count).sum()
    }

    /// Index into [`Self::cells`] of the cell containing a point.
    ///
    /// Cell bounds are half-open, so a point on a shared edge belongs to
    /// exactly one cell.
    #[must_use]
    pub fn cell_containing(&self, point: LonLat) -> Option<usize> {
        self.tree
            .locate_in_envelope_intersecting(&AABB::from_point(point))
            .map(|entry| entry.index)
            .find(|&index| self.cells[index].cell.bounds.contains(point))
    }
}
