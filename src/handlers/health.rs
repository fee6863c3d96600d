//! Health check endpoints.
//!
//! Provides endpoints for monitoring server health and readiness.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Liveness probe - server is running
///
/// GET /health/live
async fn liveness() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Readiness probe - server can accept requests
///
/// GET /health/ready
async fn readiness(State(state): State<AppState>) -> Json<ReadinessResponse> {
    let storage_ok = state.storage.has_object(&probe_identifier()).await.is_ok();

    Json(ReadinessResponse {
        status: if storage_ok { "ready" } else { "not_ready" },
    })
}

#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
}

/// A deterministic identifier used only to probe that the storage backend
/// answers `has_object` without touching real data.
fn probe_identifier() -> crate::models::identifier::Identifier {
    use crate::models::identifier::{DeviceId, Identifier, MeasurementId};
    Identifier::Measurement {
        device_id: DeviceId(uuid::Uuid::nil()),
        measurement_id: MeasurementId(1),
    }
}

/// Create health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/live", get(liveness)).route("/ready", get(readiness))
}
