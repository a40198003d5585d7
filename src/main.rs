use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use mimalloc::MiMalloc;
use scanforge::config::AppConfig;
use scanforge::db::{self, PgStore, Store};
use scanforge::executor::docker::DockerBackend;
use scanforge::executor::retry::RetryingBackend;
use scanforge::executor::ExecutionBackend;
use scanforge::parsers::ParserRegistry;
use scanforge::services::defaults;
use scanforge::services::orchestrator::Orchestrator;
use scanforge::services::runner::JobRunner;
use scanforge::AppState;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// M-MIMALLOC-APP: Use mimalloc as global allocator for improved performance.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scanforge=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = AppConfig::from_env().context("DATABASE_URL must be set")?;

    let pool = db::create_pool(&config.database_url, config.database_max_connections).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool.clone()));

    let inserted = defaults::ensure_defaults(store.as_ref()).await?;
    tracing::info!(inserted, "Default security tests checked");

    let docker = DockerBackend::new(config.docker_host_url.clone())?;
    let backend: Arc<dyn ExecutionBackend> = Arc::new(RetryingBackend::new(
        Arc::new(docker),
        config.backend_retry_attempts,
        config.retry_delay(),
    ));
    if let Err(e) = backend.ping().await {
        tracing::warn!(error = %e, "Execution backend not reachable at startup");
    }

    let runner = Arc::new(JobRunner::new(
        store.clone(),
        backend,
        Arc::new(ParserRegistry::with_defaults()),
        config.runner_config(),
    ));
    let orchestrator = Arc::new(Orchestrator::new(store.clone(), runner));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid BACKEND_HOST/BACKEND_PORT")?;

    let state = AppState {
        store,
        orchestrator,
        config,
    };
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = scanforge::routes::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    tracing::info!(host = %addr, "Starting scanforge API server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.close().await;
    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
