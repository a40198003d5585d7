//! Analysis routes: admission and status polling.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{ApiResponse, AppError};
use crate::models::analysis::Analysis;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct StartAnalysis {
    #[serde(rename = "repositoryURL")]
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct AnalysisAdmitted {
    #[serde(rename = "RID")]
    pub rid: Uuid,
}

/// POST /analysis: admit an analysis for a registered repository.
pub async fn start(
    State(state): State<AppState>,
    Json(body): Json<StartAnalysis>,
) -> Result<(StatusCode, Json<ApiResponse<AnalysisAdmitted>>), AppError> {
    let url = body.url.trim();
    if url.is_empty() {
        return Err(AppError::Validation("repositoryURL is required".to_string()));
    }
    let rid = state.orchestrator.admit(url).await?;
    Ok((StatusCode::CREATED, ApiResponse::success(AnalysisAdmitted { rid })))
}

/// GET /analysis/{rid}: current snapshot with aggregate status and result.
pub async fn get_by_rid(
    State(state): State<AppState>,
    Path(rid): Path<Uuid>,
) -> Result<Json<ApiResponse<Analysis>>, AppError> {
    let analysis = state.orchestrator.status(rid).await?;
    Ok(ApiResponse::success(analysis))
}
