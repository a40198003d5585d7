//! Route definitions for the scanforge API.

pub mod analysis;
pub mod health;
pub mod repositories;

use axum::{
    routing::{get, post},
    Router,
};

use crate::AppState;

/// Build the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health/live", get(health::live))
        .route("/health/ready", get(health::ready))
        .route("/version", get(health::version))
        .route("/analysis", post(analysis::start))
        .route("/analysis/{rid}", get(analysis::get_by_rid))
        .route("/repository", post(repositories::create))
        .route("/securitytest", post(security_tests::create))
        .with_state(state)
}
