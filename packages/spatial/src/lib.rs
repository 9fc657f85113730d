#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Zone geometry for the estimation pipeline.
//!
//! [`ZoneGeometry`] validates a zone ring once, up front, and derives its
//! area, perimeter, envelope and content hash from the ring. Every later
//! stage reads geometry through it, so derived measures can never drift
//! from the ring they came from.
//!
//! The [`raster`] module clips population rasters against a zone using an
//! R-tree over cell envelopes.

pub mod raster;

use geo::{
    Area, BooleanOps, BoundingRect, Contains, Coord, Distance, GeodesicArea, Haversine,
    Intersects, Line, LineString, Point, Polygon, Rect,
};
use geojson::GeoJson;
use rstar::AABB;
use sha2::{Digest, Sha256};
use waste_map_source_models::CellBounds;
use waste_map_zone_models::{LonLat, Zone};

/// Metres per degree of latitude (mean).
pub const METRES_PER_DEGREE: f64 = 111_320.0;

/// Errors raised while validating or parsing zone geometry.
#[derive(Debug, thiserror::Error)]
pub enum GeometryError {
    /// Ring has fewer than four points.
    #[error("ring has {count} points, at least 4 are required")]
    TooFewPoints {
        /// Number of points supplied.
        count: usize,
    },

    /// First and last ring points differ.
    #[error("ring is not closed (first point != last point)")]
    NotClosed,

    /// A coordinate is NaN or infinite.
    #[error("coordinate {index} is not finite")]
    NonFinite {
        /// Index of the offending vertex.
        index: usize,
    },

    /// A coordinate lies outside WGS84 bounds.
    #[error("coordinate {index} is outside lon [-180, 180] / lat [-90, 90]")]
    OutOfRange {
        /// Index of the offending vertex.
        index: usize,
    },

    /// Two non-adjacent ring edges cross.
    #[error("ring edges {first} and {second} intersect")]
    SelfIntersecting {
        /// Index of the first edge.
        first: usize,
        /// Index of the second edge.
        second: usize,
    },

    /// The ring encloses no area.
    #[error("ring encloses zero area")]
    ZeroArea,

    /// `GeoJSON` input could not be parsed.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// `GeoJSON` parsed but did not hold a single polygon.
    #[error("unsupported geometry: {0}")]
    Unsupported(String),
}

/// A validated zone polygon with its derived measures.
#[derive(Debug, Clone)]
pub struct ZoneGeometry {
    polygon: Polygon<f64>,
    envelope: Rect<f64>,
    area_m2: f64,
    perimeter_m: f64,
    hash: String,
}

impl ZoneGeometry {
    /// Validates a zone's ring and derives its measures.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError`] if the ring is malformed.
    pub fn from_zone(zone: &Zone) -> Result<Self, GeometryError> {
        Self::from_ring(&zone.ring)
    }

    /// Validates a closed `[lon, lat]` ring and derives its measures.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError`] if the ring has fewer than four points, is
    /// not closed, holds non-finite or out-of-range coordinates, crosses
    /// itself, or encloses no area. Repeated consecutive vertices are
    /// collapsed before the shape is checked.
    pub fn from_ring(ring: &[LonLat]) -> Result<Self, GeometryError> {
        validate_coordinates(ring)?;
        let mut ring = ring.to_vec();
        ring.dedup();
        let ring = ring.as_slice();
        validate_shape(ring)?;

        let polygon = ring_to_polygon(ring);
        let area_m2 = polygon.geodesic_area_unsigned();
        if area_m2.is_nan() || area_m2 <= 0.0 {
            return Err(GeometryError::ZeroArea);
        }
        let envelope = polygon.bounding_rect().ok_or(GeometryError::ZeroArea)?;
        let perimeter_m = ring_length_m(ring);
        let hash = ring_hash(ring);

        log::debug!(
            "Validated zone geometry: {} vertices, {area_m2:.0} m², perimeter {perimeter_m:.0} m",
            ring.len()
        );

        Ok(Self {
            polygon,
            envelope,
            area_m2,
            perimeter_m,
            hash,
        })
    }

    /// Geodesic area in m².
    #[must_use]
    pub const fn area_m2(&self) -> f64 {
        self.area_m2
    }

    /// Geodesic area in km².
    #[must_use]
    pub fn area_km2(&self) -> f64 {
        self.area_m2 / 1_000_000.0
    }

    /// Geodesic area in hectares.
    #[must_use]
    pub fn area_hectares(&self) -> f64 {
        self.area_m2 / 10_000.0
    }

    /// Perimeter in metres (haversine).
    #[must_use]
    pub const fn perimeter_m(&self) -> f64 {
        self.perimeter_m
    }

    /// Hex SHA-256 of the ring coordinates, stable across runs.
    #[must_use]
    pub fn geometry_hash(&self) -> &str {
        &self.hash
    }

    /// The underlying polygon.
    #[must_use]
    pub const fn polygon(&self) -> &Polygon<f64> {
        &self.polygon
    }

    /// Bounding box of the zone.
    #[must_use]
    pub const fn envelope(&self) -> Rect<f64> {
        self.envelope
    }

    /// Bounding box as an R-tree query envelope.
    #[must_use]
    pub fn aabb(&self) -> AABB<[f64; 2]> {
        AABB::from_corners(
            [self.envelope.min().x, self.envelope.min().y],
            [self.envelope.max().x, self.envelope.max().y],
        )
    }

    /// Whether a `[lon, lat]` point falls inside the zone.
    #[must_use]
    pub fn contains(&self, point: LonLat) -> bool {
        self.polygon.contains(&Point::new(point[0], point[1]))
    }

    /// Share of `rect`'s planar area that lies inside the zone, 0-1.
    #[must_use]
    pub fn overlap_fraction(&self, rect: &Rect<f64>) -> f64 {
        let cell = rect.to_polygon();
        if self.polygon.contains(&cell) {
            return 1.0;
        }
        let cell_area = rect.unsigned_area();
        if cell_area <= 0.0 {
            return 0.0;
        }
        (self.polygon.intersection(&cell).unsigned_area() / cell_area).clamp(0.0, 1.0)
    }

    /// Geodesic area of the part of `bounds` inside the zone, in m².
    #[must_use]
    pub fn clipped_area_m2(&self, bounds: &CellBounds) -> f64 {
        bounds_area_m2(bounds) * self.overlap_fraction(&bounds_to_rect(bounds))
    }

    /// Serializes the zone polygon as a `GeoJSON` geometry string.
    #[must_use]
    pub fn to_geojson(&self) -> String {
        let ring: Vec<Vec<f64>> = self
            .polygon
            .exterior()
            .coords()
            .map(|c| vec![c.x, c.y])
            .collect();
        let geometry = geojson::Geometry::new(geojson::Value::Polygon(vec![ring]));
        GeoJson::Geometry(geometry).to_string()
    }

    /// Splits the zone's bounding box into square tiles of roughly
    /// `tile_size_m` and returns the tiles that intersect the zone.
    #[must_use]
    pub fn tile_grid(&self, tile_size_m: f64) -> Vec<CellBounds> {
        if tile_size_m.is_nan() || tile_size_m <= 0.0 {
            return Vec::new();
        }

        let min = self.envelope.min();
        let max = self.envelope.max();
        let mid_lat = f64::midpoint(min.y, max.y).to_radians();
        let dlat = tile_size_m / METRES_PER_DEGREE;
        let dlon = tile_size_m / (METRES_PER_DEGREE * mid_lat.cos().max(1e-6));

        let mut tiles = Vec::new();
        let mut south = min.y;
        while south < max.y {
            let north = (south + dlat).min(max.y);
            let mut west = min.x;
            while west < max.x {
                let east = (west + dlon).min(max.x);
                let rect = Rect::new(Coord { x: west, y: south }, Coord { x: east, y: north });
                if self.polygon.intersects(&rect) {
                    tiles.push(CellBounds {
                        west,
                        south,
                        east,
                        north,
                    });
                }
                west += dlon;
            }
            south += dlat;
        }
        tiles
    }
}

/// Parses a `GeoJSON` string (geometry, feature, or the first feature of a
/// collection) into a closed `[lon, lat]` ring.
///
/// # Errors
///
/// Returns [`GeometryError`] if the input is not valid `GeoJSON` or does not
/// contain exactly one polygon.
pub fn parse_geojson_ring(geojson_str: &str) -> Result<Vec<LonLat>, GeometryError> {
    let geojson: GeoJson = geojson_str.parse()?;
    let geometry = match geojson {
        GeoJson::Geometry(geom) => geom,
        GeoJson::Feature(feature) => feature
            .geometry
            .ok_or_else(|| GeometryError::Unsupported("feature has no geometry".to_string()))?,
        GeoJson::FeatureCollection(collection) => collection
            .features
            .into_iter()
            .next()
            .and_then(|f| f.geometry)
            .ok_or_else(|| GeometryError::Unsupported("empty feature collection".to_string()))?,
    };

    let geo_geom: geo::Geometry<f64> = geometry.try_into()?;
    let polygon = match geo_geom {
        geo::Geometry::Polygon(p) => p,
        geo::Geometry::MultiPolygon(mp) if mp.0.len() == 1 => mp.0.into_iter().next().ok_or_else(
            || GeometryError::Unsupported("empty multipolygon".to_string()),
        )?,
        other => {
            return Err(GeometryError::Unsupported(format!(
                "expected a single polygon, got {}",
                geometry_name(&other)
            )));
        }
    };

    Ok(polygon.exterior().coords().map(|c| [c.x, c.y]).collect())
}

/// Normalized shape complexity of a footprint ring: `perimeter² / (16 · area)`.
///
/// A square scores 1.0, a circle about 0.785, and elongated or jagged
/// outlines score higher. Returns `None` for degenerate rings.
#[must_use]
pub fn shape_complexity(ring: &[LonLat]) -> Option<f64> {
    if ring.len() < 4 {
        return None;
    }
    let area = ring_to_polygon(ring).geodesic_area_unsigned();
    if area.is_nan() || area <= 0.0 {
        return None;
    }
    let perimeter = ring_length_m(ring);
    Some(perimeter * perimeter / (16.0 * area))
}

/// Geodesic area of a raster cell or tile, in m².
#[must_use]
pub fn bounds_area_m2(bounds: &CellBounds) -> f64 {
    bounds_to_rect(bounds).to_polygon().geodesic_area_unsigned()
}

/// Converts cell bounds to a `geo` rectangle.
#[must_use]
pub fn bounds_to_rect(bounds: &CellBounds) -> Rect<f64> {
    Rect::new(
        Coord {
            x: bounds.west,
            y: bounds.south,
        },
        Coord {
            x: bounds.east,
            y: bounds.north,
        },
    )
}

fn validate_coordinates(ring: &[LonLat]) -> Result<(), GeometryError> {
    for (index, [lon, lat]) in ring.iter().enumerate() {
        if !lon.is_finite() || !lat.is_finite() {
            return Err(GeometryError::NonFinite { index });
        }
        if !(-180.0..=180.0).contains(lon) || !(-90.0..=90.0).contains(lat) {
            return Err(GeometryError::OutOfRange { index });
        }
    }
    Ok(())
}

/// Checks point count, closure and self-intersection. `ring` holds no
/// repeated consecutive vertices.
fn validate_shape(ring: &[LonLat]) -> Result<(), GeometryError> {
    if ring.len() < 4 {
        return Err(GeometryError::TooFewPoints { count: ring.len() });
    }

    if ring.first() != ring.last() {
        return Err(GeometryError::NotClosed);
    }

    let edges: Vec<Line<f64>> = ring
        .windows(2)
        .map(|w| Line::new(Coord::from((w[0][0], w[0][1])), Coord::from((w[1][0], w[1][1]))))
        .collect();
    let n = edges.len();

    // Adjacent edges share a vertex, as do the first and last edge.
    for i in 0..n {
        for j in (i + 2)..n {
            if i == 0 && j == n - 1 {
                continue;
            }
            if edges[i].intersects(&edges[j]) {
                return Err(GeometryError::SelfIntersecting {
                    first: i,
                    second: j,
                });
            }
        }
    }

    Ok(())
}

fn ring_to_polygon(ring: &[LonLat]) -> Polygon<f64> {
    let exterior: LineString<f64> = ring.iter().map(|&[x, y]| Coord { x, y }).collect();
    Polygon::new(exterior, vec![])
}

fn ring_length_m(ring: &[LonLat]) -> f64 {
    ring.windows(2)
        .map(|w| {
            Haversine.distance(
                Point::new(w[0][0], w[0][1]),
                Point::new(w[1][0], w[1][1]),
            )
        })
        .sum()
}

fn ring_hash(ring: &[LonLat]) -> String {
    let mut hasher = Sha256::new();
    for [lon, lat] in ring {
        hasher.update(lon.to_le_bytes());
        hasher.update(lat.to_le_bytes());
    }
    hex::encode(hasher.finalize())
}

const fn geometry_name(geometry: &geo::Geometry<f64>) -> &'static str {
    match geometry {
        geo::Geometry::Point(_) => "Point",
        geo::Geometry::Line(_) => "Line",
        geo::Geometry::LineString(_) => "LineString",
        geo::Geometry::Polygon(_) => "Polygon",
        geo::Geometry::MultiPoint(_) => "MultiPoint",
        geo::Geometry::MultiLineString(_) => "MultiLineString",
        geo::Geometry::MultiPolygon(_) => "MultiPolygon",
        geo::Geometry::GeometryCollection(_) => "GeometryCollection",
        geo::Geometry::Rect(_) => "Rect",
        geo::Geometry::Triangle(_) => "Triangle",
    }
}
