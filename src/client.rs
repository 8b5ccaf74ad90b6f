//! Typed HTTP client for a running execbox server.
//!
//! Every call returns the route's result record. Transport failures and
//! unexpected statuses are folded into a `success:false` record, so a caller
//! (an agent's tool layer, say) never has to handle an `Err`.

use crate::deadline::{Deadline, SHELL_TIMEOUT_CEILING, SNIPPET_TIMEOUT_CEILING};
use crate::error::{ClientError, FailureRecord};
use crate::files::{ReadFileRequest, ReadFileResult, WriteFileRequest, WriteFileResult};
use crate::shell::{ShellRequest, ShellResult};
use crate::snippet::{SnippetRequest, SnippetResult};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Slack on top of the execution deadline for the HTTP round trip.
const TRANSPORT_GRACE: Duration = Duration::from_secs(10);
const FILE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct SandboxClient {
    client: Client,
    base_url: String,
}

impl SandboxClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: Client::new(),
            base_url,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// True when the server answers `/health` with `{"status":"ok"}`.
    pub async fn health(&self) -> bool {
        let response = self
            .client
            .get(self.url("/health"))
            .timeout(Duration::from_secs(5))
            .send()
            .await;
        match response {
            Ok(response) if response.status().is_success() => response
                .json::<serde_json::Value>()
                .await
                .map(|body| body["status"] == "ok")
                .unwrap_or(false),
            Ok(response) => {
                debug!(status = %response.status(), "Health check failed");
                false
            }
            Err(e) => {
                debug!(error = %e, "Health check failed");
                false
            }
        }
    }

    pub async fn bash(&self, command: &str, timeout_secs: Option<i64>) -> ShellResult {
        let deadline = Deadline::clamp(timeout_secs, SHELL_TIMEOUT_CEILING);
        let request = ShellRequest {
            command: command.to_string(),
            timeout: Some(deadline.as_secs() as i64),
        };
        self.call("/bash", &request, deadline.duration() + TRANSPORT_GRACE)
            .await
    }

    pub async fn execute(&self, code: &str, timeout_secs: Option<i64>) -> SnippetResult {
        let deadline = Deadline::clamp(timeout_secs, SNIPPET_TIMEOUT_CEILING);
        let request = SnippetRequest {
            code: code.to_string(),
            timeout: Some(deadline.as_secs() as i64),
        };
        self.call("/execute", &request, deadline.duration() + TRANSPORT_GRACE)
            .await
    }

    pub async fn read_file(&self, path: &str) -> ReadFileResult {
        let request = ReadFileRequest {
            path: path.to_string(),
        };
        self.call("/read-file", &request, FILE_TIMEOUT).await
    }

    pub async fn write_file(&self, path: &str, content: &str) -> WriteFileResult {
        let request = WriteFileRequest {
            path: path.to_string(),
            content: content.to_string(),
        };
        self.call("/write-file", &request, FILE_TIMEOUT).await
    }

    fn url(&self, route: &str) -> String {
        format!("{}{}", self.base_url, route)
    }

    async fn call<Req, Res>(&self, route: &str, request: &Req, timeout: Duration) -> Res
    where
        Req: Serialize,
        Res: DeserializeOwned + FailureRecord,
    {
        match self.try_call(route, request, timeout).await {
            Ok(result) => result,
            Err(e) => {
                warn!(route, error = %e, "Sandbox request failed");
                Res::failure(e.to_string())
            }
        }
    }

    async fn try_call<Req, Res>(
        &self,
        route: &str,
        request: &Req,
        timeout: Duration,
    ) -> Result<Res, ClientError>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.url(route))
            .json(request)
            .timeout(timeout)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<Res>().await?);
        }
        // A 500 from the dispatcher still carries a route-shaped record.
        let body = response.bytes().await?;
        serde_json::from_slice::<Res>(&body).map_err(|_| ClientError::Status(status))
    }
}

impl Default for SandboxClient {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}
