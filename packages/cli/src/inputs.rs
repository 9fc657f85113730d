//! Reading zones and reference datasets from disk.

use std::error::Error;
use std::path::Path;

use waste_map_source_models::{ReferenceDataset, VegetationTile};
use waste_map_spatial::parse_geojson_ring;
use waste_map_zone_models::{Zone, ZoneType};

/// Loads one zone.
///
/// The file is either a JSON [`Zone`] or a plain `GeoJSON` polygon. A
/// `GeoJSON` zone takes its id from the file stem and needs `zone_type`;
/// for a JSON zone, `zone_type` overrides the stored one.
pub fn load_zone(path: &Path, zone_type: Option<ZoneType>) -> Result<Zone, Box<dyn Error>> {
    let text = std::fs::read_to_string(path)?;
    parse_zone(&text, &file_stem(path), zone_type)
}

fn parse_zone(text: &str, default_id: &str, zone_type: Option<ZoneType>) -> Result<Zone, Box<dyn Error>> {
    if let Ok(mut zone) = serde_json::from_str::<Zone>(text) {
        if let Some(zone_type) = zone_type {
            zone.zone_type = zone_type;
        }
        return Ok(zone);
    }

    let ring = parse_geojson_ring(text)?;
    let zone_type = zone_type.ok_or("GeoJSON zones need --zone-type")?;
    Ok(Zone::new(default_id, ring, zone_type))
}

/// Loads a JSON array of zones for a batch run.
pub fn load_zones(path: &Path) -> Result<Vec<Zone>, Box<dyn Error>> {
    let text = std::fs::read_to_string(path)?;
    let zones: Vec<Zone> = serde_json::from_str(&text)?;
    if zones.is_empty() {
        return Err(format!("{} contains no zones", path.display()).into());
    }
    Ok(zones)
}

pub fn load_reference(path: &Path) -> Result<ReferenceDataset, Box<dyn Error>> {
    let text = std::fs::read_to_string(path)?;
    let reference: ReferenceDataset = serde_json::from_str(&text)?;
    if !reference.has_figures() {
        log::warn!(
            "Reference {} has no positive building count or population; agreement will be not_applicable",
            reference.name
        );
    }
    Ok(reference)
}

/// Loads a JSON array of vegetation tiles.
pub fn load_vegetation(path: &Path) -> Result<Vec<VegetationTile>, Box<dyn Error>> {
    let text = std::fs::read_to_string(path)?;
    parse_vegetation(&text)
}

fn parse_vegetation(text: &str) -> Result<Vec<VegetationTile>, Box<dyn Error>> {
    let tiles: Vec<VegetationTile> = serde_json::from_str(text)?;
    if let Some(tile) = tiles
        .iter()
        .find(|t| t.bounds.west >= t.bounds.east || t.bounds.south >= t.bounds.north)
    {
        return Err(format!("vegetation tile has empty bounds: {:?}", tile.bounds).into());
    }
    log::debug!("Loaded {} vegetation tiles", tiles.len());
    Ok(tiles)
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map_or_else(|| "zone".to_string(), |s| s.to_string_lossy().into_owned())
}
