//! Liveness and readiness probes

use axum::{extract::State, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{error::AppResult, AppState};

/// Probe answer
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    /// `healthy` for liveness, `ready` once the store answers
    pub status: String,
    pub version: String,
}

impl HealthResponse {
    fn new(status: &str) -> Json<Self> {
        Json(Self {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }
}

/// The process is up
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses((status = 200, description = "Process alive", body = HealthResponse))
)]
pub async fn health_check() -> Json<HealthResponse> {
    HealthResponse::new("healthy")
}

/// The store is reachable and lending requests can be served
#[utoipa::path(
    get,
    path = "/ready",
    tag = "health",
    responses(
        (status = 200, description = "Store reachable", body = HealthResponse),
        (status = 503, description = "Store unreachable", body = crate::error::ErrorResponse)
    )
)]
pub async fn readiness_check(State(state): State<AppState>) -> AppResult<Json<HealthResponse>> {
    state.services.store.ping().await?;
    Ok(HealthResponse::new("ready"))
}
