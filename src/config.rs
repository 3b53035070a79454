//! Configuration for the CV processing pipeline.
//!
//! All behaviour is controlled through [`ForgeConfig`], built via its
//! [`ForgeConfigBuilder`] or loaded with [`ForgeConfig::from_env`].
//!
//! The two credentials (`workflow_id`, `api_token`) are optional
//! here: a config without them is still useful for the direct-render flow,
//! and their absence is reported as [`ForgeError::Config`] at first use,
//! before any network call.

use crate::error::ForgeError;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Default base URL of the remote workflow API.
pub const DEFAULT_API_BASE_URL: &str = "https://app.noxus.ai/api/backend/v1";

/// Default base URL used to build download links for remote file objects.
pub const DEFAULT_FILE_BASE_URL: &str = "https://app.noxus.ai/api/backend/file";

/// Default name of the workflow input field that receives the document.
pub const DEFAULT_INPUT_FIELD: &str = "CV";

/// Default location of the Word template asset.
pub const DEFAULT_TEMPLATE_PATH: &str = "templates/AW_cv_template.docx";

/// Environment variable holding the workflow identifier.
pub const ENV_WORKFLOW_ID: &str = "NOXUS_WORKFLOW_ID";

/// Environment variable holding the API token.
pub const ENV_API_TOKEN: &str = "NOXUS_API_TOKEN";

/// Configuration for one or more CV processing flows.
///
/// Cheap to clone; every flow reads it immutably.
///
/// # Example
/// ```rust
/// use cv_forge::ForgeConfig;
/// use std::time::Duration;
///
/// let config = ForgeConfig::builder()
///     .workflow_id("wf-123")
///     .api_token("secret")
///     .poll_interval(Duration::from_secs(2))
///     .max_attempts(30)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_attempts, 30);
/// ```
#[derive(Clone)]
pub struct ForgeConfig {
    /// Remote workflow identifier. Required for submission.
    pub workflow_id: Option<String>,

    /// API token sent as `X-API-KEY`. Required for submission.
    pub api_token: Option<String>,

    /// Base URL of the workflow API. Runs live under
    /// `{api_base_url}/workflows/{workflow_id}/runs`.
    pub api_base_url: String,

    /// Base URL for download links of remote file objects (`{file_base_url}/{id}`).
    pub file_base_url: String,

    /// Name of the workflow input field carrying the base64 document. Default: `"CV"`.
    pub input_field: String,

    /// Delay before each status query. Default: 5 s.
    pub poll_interval: Duration,

    /// Maximum number of status queries. Default: 60.
    pub max_attempts: u32,

    /// Upload size ceiling in bytes. Default: 10 MiB.
    pub max_file_size: u64,

    /// Path of the Word template asset used for structured records.
    pub template_path: PathBuf,

    /// Per-request HTTP timeout in seconds. Default: 60.
    pub request_timeout_secs: u64,

    /// Optional observer for pipeline events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            workflow_id: None,
            api_token: None,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            file_base_url: DEFAULT_FILE_BASE_URL.to_string(),
            input_field: DEFAULT_INPUT_FIELD.to_string(),
            poll_interval: Duration::from_secs(5),
            max_attempts: 60,
            max_file_size: 10 * 1024 * 1024,
            template_path: PathBuf::from(DEFAULT_TEMPLATE_PATH),
            request_timeout_secs: 60,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ForgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForgeConfig")
            .field("workflow_id", &self.workflow_id)
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .field("api_base_url", &self.api_base_url)
            .field("file_base_url", &self.file_base_url)
            .field("input_field", &self.input_field)
            .field("poll_interval", &self.poll_interval)
            .field("max_attempts", &self.max_attempts)
            .field("max_file_size", &self.max_file_size)
            .field("template_path", &self.template_path)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ProcessProgressCallback>"),
            )
            .finish()
    }
}

impl ForgeConfig {
    /// Create a new builder for `ForgeConfig`.
    pub fn builder() -> ForgeConfigBuilder {
        ForgeConfigBuilder {
            config: Self::default(),
        }
    }

    /// Load configuration from the process environment.
    ///
    /// Reads `NOXUS_WORKFLOW_ID`, `NOXUS_API_TOKEN` and the optional
    /// `CVFORGE_*` overrides. Unset variables keep their defaults; a set but
    /// unparsable numeric variable is an [`ForgeError::InvalidConfig`].
    pub fn from_env() -> Result<Self, ForgeError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reads variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ForgeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::builder();

        if let Some(v) = lookup(ENV_WORKFLOW_ID) {
            builder = builder.workflow_id(v);
        }
        if let Some(v) = lookup(ENV_API_TOKEN) {
            builder = builder.api_token(v);
        }
        if let Some(v) = lookup("CVFORGE_API_BASE_URL") {
            builder = builder.api_base_url(v);
        }
        if let Some(v) = lookup("CVFORGE_FILE_BASE_URL") {
            builder = builder.file_base_url(v);
        }
        if let Some(v) = lookup("CVFORGE_INPUT_FIELD") {
            builder = builder.input_field(v);
        }
        if let Some(v) = lookup("CVFORGE_POLL_INTERVAL_SECS") {
            builder = builder.poll_interval(Duration::from_secs(parse_number(
                "CVFORGE_POLL_INTERVAL_SECS",
                &v,
            )?));
        }
        if let Some(v) = lookup("CVFORGE_MAX_ATTEMPTS") {
            builder = builder.max_attempts(parse_number("CVFORGE_MAX_ATTEMPTS", &v)?);
        }
        if let Some(v) = lookup("CVFORGE_MAX_FILE_SIZE") {
            builder = builder.max_file_size(parse_number("CVFORGE_MAX_FILE_SIZE", &v)?);
        }
        if let Some(v) = lookup("CVFORGE_TEMPLATE") {
            builder = builder.template_path(v);
        }

        builder.build()
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ForgeError> {
    value
        .trim()
        .parse()
        .map_err(|_| ForgeError::InvalidConfig(format!("{key} must be a number, got '{value}'")))
}

/// Builder for [`ForgeConfig`].
#[derive(Debug)]
pub struct ForgeConfigBuilder {
    config: ForgeConfig,
}

impl ForgeConfigBuilder {
    pub fn workflow_id(mut self, id: impl Into<String>) -> Self {
        self.config.workflow_id = Some(id.into());
        self
    }

    pub fn api_token(mut self, token: impl Into<String>) -> Self {
        self.config.api_token = Some(token.into());
        self
    }

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_base_url = url.into();
        self
    }

    pub fn file_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.file_base_url = url.into();
        self
    }

    pub fn input_field(mut self, field: impl Into<String>) -> Self {
        self.config.input_field = field.into();
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n.max(1);
        self
    }

    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.config.max_file_size = bytes;
        self
    }

    pub fn template_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.template_path = path.into();
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs.max(1);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ForgeConfig, ForgeError> {
        let c = &self.config;
        if c.max_attempts == 0 {
            return Err(ForgeError::InvalidConfig("max_attempts must be ≥ 1".into()));
        }
        if c.max_file_size == 0 {
            return Err(ForgeError::InvalidConfig("max_file_size must be > 0".into()));
        }
        for (name, url) in [("api_base_url", &c.api_base_url), ("file_base_url", &c.file_base_url)] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ForgeError::InvalidConfig(format!(
                    "{name} must be an HTTP/HTTPS URL, got '{url}'"
                )));
            }
        }
        if c.input_field.trim().is_empty() {
            return Err(ForgeError::InvalidConfig("input_field must not be empty".into()));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_remote_contract() {
        let c = ForgeConfig::default();
        assert_eq!(c.poll_interval, Duration::from_secs(5));
        assert_eq!(c.max_attempts, 60);
        assert_eq!(c.max_file_size, 10 * 1024 * 1024);
        assert_eq!(c.input_field, "CV");
    }

    #[test]
    fn builder_clamps_attempts() {
        let c = ForgeConfig::builder().max_attempts(0).build().unwrap();
        assert_eq!(c.max_attempts, 1);
    }

    #[test]
    fn builder_rejects_non_http_base() {
        let err = ForgeConfig::builder()
            .api_base_url("ftp://example.com")
            .build()
            .unwrap_err();
        assert!(matches!(err, ForgeError::InvalidConfig(_)));
    }

    #[test]
    fn from_lookup_reads_overrides() {
        let vars: HashMap<&str, &str> = [
            ("NOXUS_WORKFLOW_ID", "wf-1"),
            ("NOXUS_API_TOKEN", "tok"),
            ("CVFORGE_POLL_INTERVAL_SECS", "2"),
            ("CVFORGE_MAX_ATTEMPTS", "10"),
            ("CVFORGE_TEMPLATE", "/tmp/t.docx"),
        ]
        .into_iter()
        .collect();
        let c = ForgeConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(c.workflow_id.as_deref(), Some("wf-1"));
        assert_eq!(c.api_token.as_deref(), Some("tok"));
        assert_eq!(c.poll_interval, Duration::from_secs(2));
        assert_eq!(c.max_attempts, 10);
        assert_eq!(c.template_path, PathBuf::from("/tmp/t.docx"));
    }

    #[test]
    fn from_lookup_rejects_garbage_numbers() {
        let err = ForgeConfig::from_lookup(|k| {
            (k == "CVFORGE_MAX_ATTEMPTS").then(|| "sixty".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("CVFORGE_MAX_ATTEMPTS"));
    }

    #[test]
    fn debug_redacts_token() {
        let c = ForgeConfig::builder().api_token("super-secret").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("super-secret"));
        assert!(dbg.contains("<redacted>"));
    }
}
