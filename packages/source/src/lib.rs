#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Imagery service abstraction.
//!
//! The engine never fetches imagery itself. It asks an [`ImagerySource`]
//! for the building detections and the population raster covering a zone.
//! Two implementations ship with the crate:
//!
//! - [`http::HttpImagerySource`] talks to a remote analytics service and
//!   retries transient failures with exponential backoff
//! - [`file::FileImagerySource`] serves a JSON fixture, for offline runs
//!   and tests

pub mod file;
pub mod http;
pub mod retry;

use async_trait::async_trait;
use waste_map_source_models::{BuildingResponse, RasterResponse};
use waste_map_spatial::ZoneGeometry;

/// Errors that can occur while talking to an imagery source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body was not the expected JSON.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error (fixture read).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The call did not complete within its deadline.
    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    /// The service is known to be unreachable.
    #[error("Imagery service unavailable: {message}")]
    Unavailable { message: String },

    /// The service answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },
}

impl SourceError {
    /// Whether the error means the service could not be reached at all,
    /// as opposed to answering badly.
    #[must_use]
    pub fn is_unreachable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_connect() || e.is_timeout(),
            Self::Timeout { .. } | Self::Unavailable { .. } => true,
            Self::Status { status, .. } => *status >= 500,
            Self::Json(_) | Self::Io(_) => false,
        }
    }
}

/// A provider of building detections and population rasters.
#[async_trait]
pub trait ImagerySource: Send + Sync {
    /// Dataset version served by this source. Part of the feature-cache
    /// key, so it must change whenever the underlying data does.
    fn version(&self) -> &str;

    /// Building detections intersecting the zone.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the detections cannot be retrieved.
    async fn get_buildings(&self, zone: &ZoneGeometry) -> Result<BuildingResponse, SourceError>;

    /// Population raster cells intersecting the zone.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the raster cannot be retrieved.
    async fn get_population_raster(
        &self,
        zone: &ZoneGeometry,
    ) -> Result<RasterResponse, SourceError>;
}
