//! HTTP client for the remote extraction workflow.
//!
//! Two calls make up the whole protocol:
//!
//! ```text
//! POST {api_base}/workflows/{workflow_id}/runs          {"input": {"CV": "<base64>"}}
//! GET  {api_base}/workflows/{workflow_id}/runs/{run_id}
//! ```
//!
//! Both carry the API token in the `X-API-KEY` header. The run is owned by
//! the remote service; this module only starts it and observes it.

use crate::config::{ForgeConfig, ENV_API_TOKEN, ENV_WORKFLOW_ID};
use crate::error::ForgeError;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;
use tracing::debug;

const API_KEY_HEADER: &str = "X-API-KEY";

/// Status of a workflow run as reported by the remote service.
///
/// Anything other than `completed` or `failed` (`queued`, `running`, …) is
/// [`RunStatus::Pending`]; the raw string is kept for progress reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Pending(String),
    Completed,
    Failed,
}

impl RunStatus {
    /// Map the wire status string onto the three observable states.
    ///
    /// Comparison is exact: `"Completed"` or `" failed"` keep polling.
    pub fn from_wire(raw: &str) -> Self {
        match raw {
            "completed" => RunStatus::Completed,
            "failed" => RunStatus::Failed,
            other => RunStatus::Pending(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            RunStatus::Pending(raw) => raw,
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    /// True for `Completed` and `Failed`; no query follows a terminal status.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Pending(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, RunStatus::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observation of a workflow run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSnapshot {
    pub status: RunStatus,
    /// Node name → node output, in the order the service returned them.
    pub output: Map<String, Value>,
    /// Failure detail when `status` is `Failed`.
    pub error: Option<String>,
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Serialize)]
struct StartRunRequest {
    input: Map<String, Value>,
}

/// Pending label used when a status response omits `status`.
const UNREPORTED_STATUS: &str = "unreported";

#[derive(Deserialize)]
struct StartRunResponse {
    id: Value,
}

#[derive(Deserialize)]
struct RunStatusResponse {
    /// Absent or null while some deployments are still scheduling the run.
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    output: Option<Map<String, Value>>,
    #[serde(default)]
    error: Option<Value>,
}

/// The two credentials every remote call needs.
#[derive(Clone)]
pub struct WorkflowCredentials {
    pub workflow_id: String,
    pub api_token: String,
}

impl WorkflowCredentials {
    /// Extract credentials from `config`, failing on missing or blank values.
    pub fn from_config(config: &ForgeConfig) -> Result<Self, ForgeError> {
        let workflow_id = non_blank(config.workflow_id.as_deref()).ok_or(ForgeError::Config {
            setting: "workflow identifier",
            env_var: ENV_WORKFLOW_ID,
        })?;
        let api_token = non_blank(config.api_token.as_deref()).ok_or(ForgeError::Config {
            setting: "API token",
            env_var: ENV_API_TOKEN,
        })?;
        Ok(Self {
            workflow_id: workflow_id.to_string(),
            api_token: api_token.to_string(),
        })
    }
}

impl fmt::Debug for WorkflowCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowCredentials")
            .field("workflow_id", &self.workflow_id)
            .field("api_token", &"<redacted>")
            .finish()
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Client bound to one workflow.
#[derive(Debug, Clone)]
pub struct WorkflowClient {
    http: Client,
    runs_url: String,
    credentials: WorkflowCredentials,
    input_field: String,
}

impl WorkflowClient {
    /// Build a client from `config`.
    ///
    /// Credentials are checked first, so a missing workflow id or token fails
    /// with [`ForgeError::Config`] before any connection is opened.
    pub fn new(config: &ForgeConfig) -> Result<Self, ForgeError> {
        let credentials = WorkflowCredentials::from_config(config)?;

        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ForgeError::Internal(format!("Failed to build HTTP client: {e}")))?;

        let runs_url = format!(
            "{}/workflows/{}/runs",
            config.api_base_url.trim_end_matches('/'),
            credentials.workflow_id
        );

        Ok(Self {
            http,
            runs_url,
            credentials,
            input_field: config.input_field.clone(),
        })
    }

    /// Endpoint that creates runs; status URLs hang off it.
    pub fn runs_url(&self) -> &str {
        &self.runs_url
    }

    /// Start one run with `encoded` (base64) as the document input.
    pub async fn start_run(&self, encoded: &str) -> Result<String, ForgeError> {
        let mut input = Map::new();
        input.insert(self.input_field.clone(), Value::String(encoded.to_string()));

        let response = self
            .http
            .post(&self.runs_url)
            .header(API_KEY_HEADER, &self.credentials.api_token)
            .json(&StartRunRequest { input })
            .send()
            .await
            .map_err(|e| ForgeError::Submission {
                status: e.status().map(|s| s.as_u16()),
                detail: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ForgeError::Submission {
                status: Some(status.as_u16()),
                detail: describe_failure(status, &body),
            });
        }

        let body: StartRunResponse = response.json().await.map_err(|e| ForgeError::Submission {
            status: Some(status.as_u16()),
            detail: format!("Malformed run creation response: {e}"),
        })?;

        run_id_from(&body.id).ok_or_else(|| ForgeError::Submission {
            status: Some(status.as_u16()),
            detail: format!("Run creation response carried no usable id: {}", body.id),
        })
    }

    /// Query the current state of `run_id`.
    ///
    /// `attempt` is only used to label errors.
    pub async fn run_status(&self, run_id: &str, attempt: u32) -> Result<RunSnapshot, ForgeError> {
        let poll_error = |detail: String| ForgeError::Poll {
            run_id: run_id.to_string(),
            attempt,
            detail,
        };

        let response = self
            .http
            .get(format!("{}/{}", self.runs_url, run_id))
            .header(API_KEY_HEADER, &self.credentials.api_token)
            .send()
            .await
            .map_err(|e| poll_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(poll_error(describe_failure(status, &body)));
        }

        let body: RunStatusResponse = response
            .json()
            .await
            .map_err(|e| poll_error(format!("Malformed status response: {e}")))?;

        let run_status = match body.status.as_deref() {
            Some(raw) => RunStatus::from_wire(raw),
            None => RunStatus::Pending(UNREPORTED_STATUS.to_string()),
        };

        debug!(
            "Run {}: status={} output_nodes={}",
            run_id,
            run_status.as_str(),
            body.output.as_ref().map_or(0, Map::len)
        );

        Ok(RunSnapshot {
            status: run_status,
            output: body.output.unwrap_or_default(),
            error: body.error.map(|e| match e {
                Value::String(s) => s,
                other => other.to_string(),
            }),
        })
    }
}

/// Run identifiers are opaque; accept strings and numbers.
fn run_id_from(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn describe_failure(status: StatusCode, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        format!("HTTP {status}")
    } else {
        let snippet: String = body.chars().take(200).collect();
        format!("HTTP {status}: {snippet}")
    }
}
