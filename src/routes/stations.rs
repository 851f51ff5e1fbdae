//! Station listing HTTP endpoints.
//!
//! - GET /api/stations?lat&lng
//! - GET /api/all-stations

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use utoipa::IntoParams;

use crate::errors::{AppError, ErrorResponse};
use crate::services::stations::{Candidate, StationCatalog, StationListing};
use crate::services::upstream::PARAM_CLOUD_COVERAGE;

#[derive(Clone)]
pub struct StationsState {
    pub catalog: StationCatalog,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct NearbyQuery {
    pub lat: f64,
    pub lng: f64,
}

/// List the nearest active cloud-coverage stations to a point.
#[utoipa::path(
    get,
    path = "/api/stations",
    tag = "Stations",
    params(NearbyQuery),
    responses(
        (status = 200, description = "Nearest stations, sorted by distance", body = [Candidate]),
        (status = 502, description = "Upstream station network unavailable", body = ErrorResponse),
    )
)]
pub async fn get_nearby_stations(
    State(state): State<StationsState>,
    Query(params): Query<NearbyQuery>,
) -> Result<Json<Vec<Candidate>>, AppError> {
    let stations = state
        .catalog
        .get_nearby(params.lat, params.lng, PARAM_CLOUD_COVERAGE, StationCatalog::DEFAULT_NEARBY_COUNT)
        .await?;
    Ok(Json(stations))
}

/// List every active station in the network with its parameter coverage flags.
#[utoipa::path(
    get,
    path = "/api/all-stations",
    tag = "Stations",
    responses(
        (status = 200, description = "Every active station", body = [StationListing]),
        (status = 502, description = "Upstream station network unavailable", body = ErrorResponse),
    )
)]
pub async fn get_all_stations(State(state): State<StationsState>) -> Result<Json<Vec<StationListing>>, AppError> {
    let stations = state.catalog.get_all().await?;
    Ok(Json(stations))
}
