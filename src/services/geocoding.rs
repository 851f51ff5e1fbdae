//! Address geocoding via Nominatim-shaped gazetteer.
//!
//! Independent of the upstream weather network — converts address strings
//! to coordinates and vice versa, to back the front-end search box.

use serde::Deserialize;
use utoipa::ToSchema;

use crate::errors::AppError;

const GAZETTEER_HTTP_TIMEOUT_SECS: u64 = 10;

/// Minimum results biased toward this region (tweak per deployment).
const REGION_VIEWBOX: &str = "10.9,55.3,24.2,69.1";
const REGION_COUNTRY_CODES: &str = "se";

/// Don't call the gazetteer for queries too short to return anything useful.
pub const MIN_AUTOCOMPLETE_QUERY_LEN: usize = 3;

#[derive(Debug, Deserialize)]
struct NominatimHit {
    lat: String,
    lon: String,
    display_name: String,
}

#[derive(Debug, Clone, serde::Serialize, ToSchema)]
pub struct GeocodeResult {
    pub lat: f64,
    pub lng: f64,
    pub display_name: String,
}

fn hit_to_result(hit: NominatimHit) -> Option<GeocodeResult> {
    Some(GeocodeResult {
        lat: hit.lat.parse().ok()?,
        lng: hit.lon.parse().ok()?,
        display_name: hit.display_name,
    })
}

/// Client for a Nominatim-shaped address search API.
#[derive(Debug, Clone)]
pub struct GeocodingClient {
    client: reqwest::Client,
    base_url: String,
}

impl GeocodingClient {
    pub fn new(base_url: String, user_agent: String) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .expect("failed to build reqwest client");
        Self { client, base_url }
    }

    fn search_url(&self) -> String {
        format!("{}/search", self.base_url)
    }

    /// Geocode a single address string, returning the best match.
    pub async fn geocode_address(&self, query: &str) -> Result<Option<GeocodeResult>, AppError> {
        let resp = self
            .client
            .get(self.search_url())
            .query(&[("q", query), ("format", "json"), ("limit", "1")])
            .timeout(std::time::Duration::from_secs(GAZETTEER_HTTP_TIMEOUT_SECS))
            .send()
            .await
            .map_err(|e| AppError::ExternalServiceError(format!("geocoding request failed: {e}")))?
            .error_for_status()
            .map_err(|e| AppError::ExternalServiceError(format!("geocoding returned an error: {e}")))?;

        let hits: Vec<NominatimHit> = resp
            .json()
            .await
            .map_err(|e| AppError::ExternalServiceError(format!("geocoding parse failed: {e}")))?;

        Ok(hits.into_iter().next().and_then(hit_to_result))
    }

    /// Return up to `limit` place suggestions for a partial query, biased
    /// toward the deployment region.
    pub async fn autocomplete_address(&self, query: &str, limit: usize) -> Result<Vec<GeocodeResult>, AppError> {
        if query.trim().chars().count() < MIN_AUTOCOMPLETE_QUERY_LEN {
            return Ok(Vec::new());
        }

        let limit_str = limit.to_string();
        let resp = self
            .client
            .get(self.search_url())
            .query(&[
                ("q", query),
                ("format", "json"),
                ("limit", limit_str.as_str()),
                ("countrycodes", REGION_COUNTRY_CODES),
                ("viewbox", REGION_VIEWBOX),
                ("bounded", "0"),
            ])
            .timeout(std::time::Duration::from_secs(GAZETTEER_HTTP_TIMEOUT_SECS))
            .send()
            .await
            .map_err(|e| AppError::ExternalServiceError(format!("autocomplete request failed: {e}")))?
            .error_for_status()
            .map_err(|e| AppError::ExternalServiceError(format!("autocomplete returned an error: {e}")))?;

        let hits: Vec<NominatimHit> = resp
            .json()
            .await
            .map_err(|e| AppError::ExternalServiceError(format!("autocomplete parse failed: {e}")))?;

        Ok(hits.into_iter().filter_map(hit_to_result).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_geocode_address_returns_first_hit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"lat": "59.33", "lon": "18.07", "display_name": "Stockholm, Sweden"}
            ])))
            .mount(&server)
            .await;

        let client = GeocodingClient::new(server.uri(), "test-agent".to_string());
        let result = client.geocode_address("Stockholm").await.unwrap().unwrap();
        assert_eq!(result.display_name, "Stockholm, Sweden");
        assert!((result.lat - 59.33).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_geocode_address_no_hits_returns_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let client = GeocodingClient::new(server.uri(), "test-agent".to_string());
        let result = client.geocode_address("nowhere").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_autocomplete_short_query_skips_request() {
        let server = MockServer::start().await;
        // No mock mounted — a request would fail loudly.
        let client = GeocodingClient::new(server.uri(), "test-agent".to_string());
        let result = client.autocomplete_address("st", 5).await.unwrap();
        assert!(result.is_empty());
    }
}
