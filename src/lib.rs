pub mod config;
pub mod db;
pub mod errors;
pub mod executor;
pub mod models;
pub mod parsers;
pub mod routes;
pub mod services;

use std::sync::Arc;

use db::Store;
use services::orchestrator::Orchestrator;

/// Shared application state passed to all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub orchestrator: Arc<Orchestrator>,
    pub config: config::AppConfig,
}
