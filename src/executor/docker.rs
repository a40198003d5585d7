//! Docker Engine HTTP API backend.
//!
//! Units are containers created with a TTY running `/bin/sh -c <cmd>`, so
//! `/logs` returns the raw combined stream without multiplexing headers.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::executor::{
    render_command, ExecutionBackend, ExecutorError, ExecutorResult, UnitContext,
};

/// Container label carrying the owning analysis RID.
const RID_LABEL: &str = "scanforge.rid";

#[derive(Debug, Clone)]
pub struct DockerBackend {
    client: Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct CreateContainerPayload<'a> {
    image: &'a str,
    tty: bool,
    cmd: [&'a str; 3],
    labels: HashMap<&'a str, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreateContainerResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WaitResponse {
    status_code: i64,
    error: Option<WaitError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WaitError {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DaemonMessage {
    message: String,
}

impl DockerBackend {
    pub fn new(base_url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

/// Split `image:tag` into its parts, defaulting the tag to `latest`.
fn split_image(image: &str) -> (&str, &str) {
    match image.rsplit_once(':') {
        Some((name, tag)) if !tag.contains('/') => (name, tag),
        _ => (image, "latest"),
    }
}

/// Turn a non-success daemon response into `ExecutorError::Api`.
async fn check(response: Response) -> ExecutorResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<DaemonMessage>(&body)
        .map(|m| m.message)
        .unwrap_or(body);
    Err(ExecutorError::Api {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl ExecutionBackend for DockerBackend {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn image_is_loaded(&self, image: &str) -> ExecutorResult<bool> {
        let response = self
            .client
            .get(self.url(&format!("/images/{image}/json")))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        check(response).await?;
        Ok(true)
    }

    async fn pull_image(&self, image: &str) -> ExecutorResult<()> {
        let (name, tag) = split_image(image);
        let response = self
            .client
            .post(self.url(&format!("/images/create?fromImage={name}&tag={tag}")))
            .send()
            .await?;
        check(response).await?;
        tracing::debug!(image = %image, "Image pull requested");
        Ok(())
    }

    async fn create_unit(
        &self,
        ctx: &UnitContext,
        image: &str,
        command: &str,
    ) -> ExecutorResult<String> {
        let command = render_command(ctx, command);
        let payload = CreateContainerPayload {
            image,
            tty: true,
            cmd: ["/bin/sh", "-c", &command],
            labels: HashMap::from([(RID_LABEL, ctx.rid.to_string())]),
        };

        let response = self
            .client
            .post(self.url("/containers/create"))
            .json(&payload)
            .send()
            .await?;
        let created: CreateContainerResponse = check(response).await?.json().await?;
        Ok(created.id)
    }

    async fn start_unit(&self, execution_id: &str) -> ExecutorResult<()> {
        let response = self
            .client
            .post(self.url(&format!("/containers/{execution_id}/start")))
            .send()
            .await?;
        // 304: already started
        if response.status() == StatusCode::NOT_MODIFIED {
            return Ok(());
        }
        check(response).await?;
        Ok(())
    }

    async fn wait_unit(&self, execution_id: &str, timeout: Duration) -> ExecutorResult<()> {
        let response = self
            .client
            .post(self.url(&format!("/containers/{execution_id}/wait")))
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ExecutorError::Timeout(timeout)
                } else {
                    ExecutorError::Request(e)
                }
            })?;

        let waited: WaitResponse = check(response).await?.json().await.map_err(|e| {
            if e.is_timeout() {
                ExecutorError::Timeout(timeout)
            } else {
                ExecutorError::Request(e)
            }
        })?;

        if let Some(message) = waited
            .error
            .and_then(|e| e.message)
            .filter(|m| !m.is_empty())
        {
            return Err(ExecutorError::Abnormal(message));
        }

        // Scan tools exit non-zero when they report findings.
        tracing::debug!(
            execution_id = %execution_id,
            exit_code = waited.status_code,
            "Unit terminated"
        );
        Ok(())
    }

    async fn read_output(&self, execution_id: &str) -> ExecutorResult<String> {
        let response = self
            .client
            .get(self.url(&format!(
                "/containers/{execution_id}/logs?stdout=true&stderr=true"
            )))
            .send()
            .await?;
        Ok(check(response).await?.text().await?)
    }

    async fn ping(&self) -> ExecutorResult<()> {
        let response = self.client.get(self.url("/_ping")).send().await?;
        check(response).await?;
        Ok(())
    }
}
