//! Pre-warmer status HTTP endpoint.
//!
//! GET /api/prewarmer/status — returns the current state of the background
//! station pre-warmer as JSON.

use axum::extract::State;
use axum::Json;

use crate::services::prewarmer::{PrewarmStatus, SharedPrewarmStatus};

/// Get the current pre-warmer status.
#[utoipa::path(
    get,
    path = "/api/prewarmer/status",
    tag = "Prewarmer",
    responses(
        (status = 200, description = "Current pre-warmer status", body = PrewarmStatus),
    )
)]
pub async fn get_prewarmer_status(State(status): State<SharedPrewarmStatus>) -> Json<PrewarmStatus> {
    let s = status.read().await;
    Json(s.clone())
}
