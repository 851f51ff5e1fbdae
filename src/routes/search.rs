//! Address search HTTP endpoints.
//!
//! - GET /api/search?q=
//! - GET /api/autocomplete?q=

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::errors::{AppError, ErrorResponse};
use crate::services::geocoding::{GeocodeResult, GeocodingClient};

#[derive(Clone)]
pub struct SearchState {
    pub geocoder: GeocodingClient,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct SearchQuery {
    pub q: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AutocompleteResponse {
    pub suggestions: Vec<GeocodeResult>,
}

/// Geocode a single address query.
#[utoipa::path(
    get,
    path = "/api/search",
    tag = "Search",
    params(SearchQuery),
    responses(
        (status = 200, description = "Best-match geocode result", body = GeocodeResult),
        (status = 404, description = "No geocode match for the query", body = ErrorResponse),
        (status = 502, description = "Gazetteer service unavailable", body = ErrorResponse),
    )
)]
pub async fn search_address(
    State(state): State<SearchState>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<GeocodeResult>, AppError> {
    let result = state.geocoder.geocode_address(&params.q).await?;
    match result {
        Some(result) => Ok(Json(result)),
        None => Err(AppError::NotFound(format!("no geocode match for '{}'", params.q))),
    }
}

/// Autocomplete suggestions for a partial address query.
#[utoipa::path(
    get,
    path = "/api/autocomplete",
    tag = "Search",
    params(SearchQuery),
    responses(
        (status = 200, description = "Place suggestions", body = AutocompleteResponse),
        (status = 502, description = "Gazetteer service unavailable", body = ErrorResponse),
    )
)]
pub async fn autocomplete_address(
    State(state): State<SearchState>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<AutocompleteResponse>, AppError> {
    let suggestions = state.geocoder.autocomplete_address(&params.q, 5).await?;
    Ok(Json(AutocompleteResponse { suggestions }))
}
