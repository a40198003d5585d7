//! Repository registration route.

use axum::{extract::State, http::StatusCode, Json};

use crate::errors::{ApiResponse, AppError};
use crate::models::repository::{CreateRepository, Repository};
use crate::services::registration;
use crate::AppState;

/// POST /repository: register a scan target.
pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<CreateRepository>,
) -> Result<(StatusCode, Json<ApiResponse<Repository>>), AppError> {
    let repository = registration::register_repository(state.store.as_ref(), body).await?;
    Ok((StatusCode::CREATED, ApiResponse::success(repository)))
}
