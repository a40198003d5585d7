//! Execution-backend contract: isolated, disposable units that run one scan tool.

pub mod docker;
pub mod retry;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::errors::AppError;

pub use docker::DockerBackend;
pub use retry::RetryingBackend;

/// Placeholder in a command template replaced by the repository URL.
pub const REPOSITORY_PLACEHOLDER: &str = "%GIT_REPO%";

pub type ExecutorResult<T> = Result<T, ExecutorError>;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Request to execution backend failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Execution backend returned {status}: {message}")]
    Api { status: u16, message: String },

    /// The unit did not terminate within the allowed time.
    #[error("Execution timed out after {0:?}")]
    Timeout(Duration),

    #[error("Unit terminated abnormally: {0}")]
    Abnormal(String),
}

impl ExecutorError {
    /// Failures worth another attempt. Timeouts and explicit 4xx rejections are final.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Request(e) => !e.is_timeout(),
            Self::Api { status, .. } => *status >= 500,
            Self::Timeout(_) | Self::Abnormal(_) => false,
        }
    }
}

impl From<ExecutorError> for AppError {
    fn from(e: ExecutorError) -> Self {
        match e {
            ExecutorError::Timeout(after) => AppError::Timeout(format!("unit still running after {after:?}")),
            other => AppError::Environment(other.to_string()),
        }
    }
}

/// What a unit needs to know about the analysis it belongs to.
#[derive(Debug, Clone)]
pub struct UnitContext {
    pub rid: Uuid,
    pub repository_url: String,
}

/// Substitute the repository placeholder in a command template.
pub fn render_command(ctx: &UnitContext, command: &str) -> String {
    command.replace(REPOSITORY_PLACEHOLDER, &ctx.repository_url)
}

/// Isolated execution capability consumed by the job runner.
///
/// Implementations must be dyn-compatible; the runner holds `Arc<dyn ExecutionBackend>`.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &'static str;

    async fn image_is_loaded(&self, image: &str) -> ExecutorResult<bool>;

    /// Request a pull. Completion is observed by polling `image_is_loaded`.
    async fn pull_image(&self, image: &str) -> ExecutorResult<()>;

    /// Create a unit and return its execution identifier.
    async fn create_unit(
        &self,
        ctx: &UnitContext,
        image: &str,
        command: &str,
    ) -> ExecutorResult<String>;

    async fn start_unit(&self, execution_id: &str) -> ExecutorResult<()>;

    /// Block until the unit terminates, at most `timeout`.
    async fn wait_unit(&self, execution_id: &str, timeout: Duration) -> ExecutorResult<()>;

    async fn read_output(&self, execution_id: &str) -> ExecutorResult<String>;

    async fn ping(&self) -> ExecutorResult<()>;
}
