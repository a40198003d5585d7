use std::env;
use std::time::Duration;

/// Application configuration loaded from environment variables.
#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    pub host: String,
    pub port: u16,
    pub docker_host_url: String,
    pub git_private_ssh_key: String,
    pub image_pull_poll_secs: u64,
    pub image_pull_ceiling_secs: u64,
    pub backend_retry_attempts: u32,
    pub backend_retry_delay_ms: u64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, env::VarError> {
        Ok(Self {
            database_url: env::var("DATABASE_URL")?,
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
            host: env::var("BACKEND_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("BACKEND_PORT")
                .unwrap_or_else(|_| "9999".to_string())
                .parse()
                .unwrap_or(9999),
            docker_host_url: env::var("DOCKER_HOST_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:2375".to_string()),
            git_private_ssh_key: env::var("GIT_PRIVATE_SSH_KEY").unwrap_or_default(),
            image_pull_poll_secs: env::var("IMAGE_PULL_POLL_SECS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(5),
            image_pull_ceiling_secs: env::var("IMAGE_PULL_CEILING_SECS")
                .unwrap_or_else(|_| "120".to_string())
                .parse()
                .unwrap_or(120),
            backend_retry_attempts: env::var("BACKEND_RETRY_ATTEMPTS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .unwrap_or(3),
            backend_retry_delay_ms: env::var("BACKEND_RETRY_DELAY_MS")
                .unwrap_or_else(|_| "500".to_string())
                .parse()
                .unwrap_or(500),
        })
    }

    /// Job runner settings derived from this configuration.
    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            secret: self.git_private_ssh_key.clone(),
            pull_poll_interval: Duration::from_secs(self.image_pull_poll_secs.max(1)),
            pull_ceiling: Duration::from_secs(self.image_pull_ceiling_secs),
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.backend_retry_delay_ms)
    }
}

// The database URL may embed credentials.
impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("database_url", &"<redacted>")
            .field("database_max_connections", &self.database_max_connections)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("docker_host_url", &self.docker_host_url)
            .field("git_private_ssh_key", &"<redacted>")
            .field("image_pull_poll_secs", &self.image_pull_poll_secs)
            .field("image_pull_ceiling_secs", &self.image_pull_ceiling_secs)
            .field("backend_retry_attempts", &self.backend_retry_attempts)
            .field("backend_retry_delay_ms", &self.backend_retry_delay_ms)
            .finish()
    }
}

/// Job runner settings.
#[derive(Clone)]
pub struct RunnerConfig {
    /// Substituted for the secret placeholder in command templates.
    pub secret: String,
    pub pull_poll_interval: Duration,
    /// Soft ceiling: once reached the runner proceeds without the image.
    pub pull_ceiling: Duration,
}

impl std::fmt::Debug for RunnerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunnerConfig")
            .field("secret", &"<redacted>")
            .field("pull_poll_interval", &self.pull_poll_interval)
            .field("pull_ceiling", &self.pull_ceiling)
            .finish()
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            pull_poll_interval: Duration::from_secs(5),
            pull_ceiling: Duration::from_secs(120),
        }
    }
}
