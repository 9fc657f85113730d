//! HTTP client for a remote imagery analytics service.
//!
//! The zone is POSTed as a `GeoJSON` geometry to
//! `{base_url}/buildings` and `{base_url}/population-raster`; the service
//! answers with the JSON form of [`BuildingResponse`] and
//! [`RasterResponse`].

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use waste_map_source_models::{BuildingResponse, RasterResponse};
use waste_map_spatial::ZoneGeometry;

use crate::retry::{RetryPolicy, send_json};
use crate::{ImagerySource, SourceError};

/// Connection settings for [`HttpImagerySource`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct HttpSourceConfig {
    pub base_url: String,
    /// Dataset version reported to the feature cache.
    pub dataset_version: String,
    /// Per-request timeout.
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for HttpSourceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/v1".to_string(),
            dataset_version: "unversioned".to_string(),
            request_timeout_secs: 20,
            max_retries: 3,
            retry_base_delay_ms: 500,
        }
    }
}

impl HttpSourceConfig {
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            max_body_retries: 1,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
        }
    }
}

#[derive(Serialize)]
struct ZoneRequest<'a> {
    zone: serde_json::Value,
    #[serde(rename = "geometryHash")]
    geometry_hash: &'a str,
}

pub struct HttpImagerySource {
    client: reqwest::Client,
    base_url: String,
    version: String,
    retry: RetryPolicy,
}

impl HttpImagerySource {
    /// Builds a client from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Http`] if the HTTP client cannot be built.
    pub fn new(config: &HttpSourceConfig) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(concat!("waste-map/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            version: config.dataset_version.clone(),
            retry: config.retry_policy(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    async fn post_zone<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        zone: &ZoneGeometry,
    ) -> Result<T, SourceError> {
        let url = self.endpoint(path);
        let body = ZoneRequest {
            zone: serde_json::from_str(&zone.to_geojson())?,
            geometry_hash: zone.geometry_hash(),
        };
        log::debug!("POST {url} (zone {})", zone.geometry_hash());
        send_json(&self.retry, || self.client.post(&url).json(&body)).await
    }
}

#[async_trait]
impl ImagerySource for HttpImagerySource {
    fn version(&self) -> &str {
        &self.version
    }

    async fn get_buildings(&self, zone: &ZoneGeometry) -> Result<BuildingResponse, SourceError> {
        let response: BuildingResponse = self.post_zone("buildings", zone).await?;
        log::info!(
            "Imagery service returned {} building records{}",
            response.records.len(),
            if response.partial { " (partial)" } else { "" }
        );
        Ok(response)
    }

    async fn get_population_raster(
        &self,
        zone: &ZoneGeometry,
    ) -> Result<RasterResponse, SourceError> {
        let response: RasterResponse = self.post_zone("population-raster", zone).await?;
        log::info!(
            "Imagery service returned {} raster cells{}",
            response.cells.len(),
            if response.partial { " (partial)" } else { "" }
        );
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_ignore_trailing_slash() {
        let source = HttpImagerySource::new(&HttpSourceConfig {
            base_url: "https://imagery.example/v2/".to_string(),
            ..HttpSourceConfig::default()
        })
        .unwrap();
        assert_eq!(source.endpoint("buildings"), "https://imagery.example/v2/buildings");
        assert_eq!(source.version(), "unversioned");
    }

    #[test]
    fn retry_policy_follows_config() {
        let config = HttpSourceConfig {
            max_retries: 5,
            retry_base_delay_ms: 250,
            ..HttpSourceConfig::default()
        };
        let policy = config.retry_policy();
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.base_delay, Duration::from_millis(250));
    }

    #[tokio::test]
    async fn unreachable_service_is_reported_as_unreachable() {
        let source = HttpImagerySource::new(&HttpSourceConfig {
            // Port 9 (discard) on localhost is reliably closed.
            base_url: "http://127.0.0.1:9".to_string(),
            max_retries: 0,
            retry_base_delay_ms: 1,
            request_timeout_secs: 2,
            ..HttpSourceConfig::default()
        })
        .unwrap();
        let zone = ZoneGeometry::from_ring(&[
            [0.0, 0.0],
            [0.01, 0.0],
            [0.01, 0.01],
            [0.0, 0.01],
            [0.0, 0.0],
        ])
        .unwrap();
        let err = source.get_buildings(&zone).await.unwrap_err();
        assert!(err.is_unreachable(), "{err:?}");
    }
}
