//! Health check and version endpoints.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::errors::ApiResponse;
use crate::AppState;

/// Readiness probe detail.
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub store: String,
    pub execution_backend: String,
}

#[derive(Debug, Serialize)]
pub struct VersionInfo {
    pub name: &'static str,
    pub version: &'static str,
}

/// Liveness probe. Always returns OK if the process is running.
pub async fn live() -> &'static str {
    "OK"
}

/// Readiness probe. Checks the store and the execution backend.
pub async fn ready(State(state): State<AppState>) -> Json<ApiResponse<HealthStatus>> {
    let store_status = match state.store.ping().await {
        Ok(()) => format!("{}: connected", state.store.backend_name()),
        Err(e) => {
            tracing::warn!(error = %e, "Store health check failed");
            format!("error: {e}")
        }
    };

    let backend = state.orchestrator.runner().backend();
    let backend_status = match backend.ping().await {
        Ok(()) => format!("{}: connected", backend.name()),
        Err(e) => {
            tracing::warn!(error = %e, "Execution backend health check failed");
            format!("error: {e}")
        }
    };

    ApiResponse::success(HealthStatus {
        status: "ok".to_string(),
        store: store_status,
        execution_backend: backend_status,
    })
}

/// GET /version
pub async fn version() -> Json<ApiResponse<VersionInfo>> {
    ApiResponse::success(VersionInfo {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
    })
}
