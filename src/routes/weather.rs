//! Weather estimate HTTP endpoints.
//!
//! - GET /api/location-weather?lat&lng&resolution=
//! - GET /api/weather-data/{station_id}?resolution=

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use utoipa::IntoParams;

use crate::errors::{AppError, ErrorResponse};
use crate::services::aggregator::Resolution;
use crate::services::engine::{LocationEngine, LocationResult, StationResult};

#[derive(Clone)]
pub struct WeatherState {
    pub engine: LocationEngine,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct LocationWeatherQuery {
    /// Latitude in decimal degrees.
    pub lat: f64,
    /// Longitude in decimal degrees.
    pub lng: f64,
    /// Aggregation resolution: "day", "month" (default), or "year".
    pub resolution: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct StationWeatherQuery {
    pub resolution: Option<String>,
}

fn validate_latlng(lat: f64, lng: f64) -> Result<(), AppError> {
    if !(-90.0..=90.0).contains(&lat) {
        return Err(AppError::BadRequest(format!("lat {lat} is out of range [-90, 90]")));
    }
    if !(-180.0..=180.0).contains(&lng) {
        return Err(AppError::BadRequest(format!("lng {lng} is out of range [-180, 180]")));
    }
    Ok(())
}

/// Estimate cloud coverage and lightning probability at an arbitrary location.
#[utoipa::path(
    get,
    path = "/api/location-weather",
    tag = "Weather",
    params(LocationWeatherQuery),
    responses(
        (status = 200, description = "Blended weather estimate for the location", body = LocationResult),
        (status = 400, description = "Invalid lat/lng", body = ErrorResponse),
        (status = 502, description = "Upstream station network unavailable", body = ErrorResponse),
    )
)]
pub async fn get_location_weather(
    State(state): State<WeatherState>,
    Query(params): Query<LocationWeatherQuery>,
) -> Result<Json<LocationResult>, AppError> {
    validate_latlng(params.lat, params.lng)?;
    let resolution = Resolution::parse_or_default(params.resolution.as_deref());
    let result = state.engine.get_location_weather(params.lat, params.lng, resolution).await?;
    Ok(Json(result))
}

/// Get a single station's aggregated historical series.
#[utoipa::path(
    get,
    path = "/api/weather-data/{station_id}",
    tag = "Weather",
    params(
        ("station_id" = String, Path, description = "Station id"),
        StationWeatherQuery,
    ),
    responses(
        (status = 200, description = "Aggregated series for the station", body = StationResult),
        (status = 404, description = "Unknown station id", body = ErrorResponse),
        (status = 502, description = "Upstream station network unavailable", body = ErrorResponse),
    )
)]
pub async fn get_station_weather(
    State(state): State<WeatherState>,
    Path(station_id): Path<String>,
    Query(params): Query<StationWeatherQuery>,
) -> Result<Json<StationResult>, AppError> {
    if !state.engine.catalog().station_known(&station_id).await? {
        return Err(AppError::NotFound(format!("unknown station id: {station_id}")));
    }
    let resolution = Resolution::parse_or_default(params.resolution.as_deref());
    let result = state.engine.get_station_weather_data(&station_id, resolution).await;
    Ok(Json(result))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_latlng_rejects_out_of_range_lat() {
        assert!(validate_latlng(91.0, 18.0).is_err());
    }

    #[test]
    fn test_validate_latlng_rejects_out_of_range_lng() {
        assert!(validate_latlng(59.0, 181.0).is_err());
    }

    #[test]
    fn test_validate_latlng_accepts_valid_coords() {
        assert!(validate_latlng(59.33, 18.07).is_ok());
    }
}
