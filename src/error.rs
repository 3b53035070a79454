//! Error types for the cv-forge library.
//!
//! Two error types reflect two layers of the pipeline:
//!
//! * [`ForgeError`]: every failure a caller can see from the top-level
//!   `convert*` / `render_curriculum*` functions. Each variant maps to a stable
//!   machine-readable [`ErrorKind`] and a human-readable message so a delivery
//!   layer (HTTP handler, CLI) can surface it without inspecting the variant.
//!
//! * [`RenderError`]: failures inside the Document Synthesizer (template asset
//!   missing, archive corrupt, template engine rejected the merge). Wrapped in
//!   [`ForgeError::Render`] with the engine error kept as the `source`.
//!
//! Nothing here is retried. The only loop in the pipeline is the bounded
//! status poll, which repeats on "not done yet", never on failure.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the cv-forge library.
#[derive(Debug, Error)]
pub enum ForgeError {
    // ── Configuration ─────────────────────────────────────────────────────
    /// A required setting (workflow id, API token) is missing or blank.
    #[error("Missing configuration: {setting}\nSet it in the environment (e.g. {env_var}) or on the builder.")]
    Config {
        setting: &'static str,
        env_var: &'static str,
    },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Upload gate ───────────────────────────────────────────────────────
    /// The upload (or a direct-render field) was rejected before any work.
    #[error("Invalid input '{name}': {reason}")]
    InvalidInput { name: String, reason: String },

    // ── Remote workflow ───────────────────────────────────────────────────
    /// The workflow run could not be started.
    ///
    /// `status` is `None` when the request never got an HTTP response.
    #[error("Failed to start workflow run{}: {detail}", fmt_status(.status))]
    Submission { status: Option<u16>, detail: String },

    /// A status query failed. Not retried: the whole operation stops here.
    #[error("Status check for run '{run_id}' failed on attempt {attempt}: {detail}")]
    Poll {
        run_id: String,
        attempt: u32,
        detail: String,
    },

    /// The remote workflow reported `failed`.
    #[error("Workflow run '{run_id}' failed: {detail}")]
    ProcessingFailed { run_id: String, detail: String },

    /// No terminal status after the full polling budget.
    #[error("Workflow run '{run_id}' timed out: processing exceeded {elapsed_secs} seconds ({attempts} attempts)")]
    Timeout {
        run_id: String,
        attempts: u32,
        elapsed_secs: u64,
    },

    // ── Result dispatch ───────────────────────────────────────────────────
    /// The completed run carried an empty output mapping.
    #[error("Workflow run '{run_id}' completed without any node output")]
    NoOutput { run_id: String },

    /// The structured record could not be decoded as JSON.
    #[error("Failed to parse structured record: {detail}")]
    Parse { detail: String },

    /// The selected node output matched none of the known shapes.
    #[error("Unrecognized node output format (available fields: [{}])", .fields.join(", "))]
    UnrecognizedFormat { fields: Vec<String> },

    // ── Synthesis ─────────────────────────────────────────────────────────
    /// The Document Synthesizer failed.
    #[error(transparent)]
    Render(#[from] RenderError),

    // ── I/O ───────────────────────────────────────────────────────────────
    /// Could not create or write the output document.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

/// Errors raised while merging data into a template asset.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The template file does not exist.
    #[error("Template file not found: '{path}'")]
    TemplateNotFound { path: PathBuf },

    /// The template file exists but could not be read.
    #[error("Failed to read template '{path}': {source}")]
    TemplateRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The template is not a usable document archive.
    #[error("Malformed template: {detail}")]
    MalformedTemplate { detail: String },

    /// The document archive could not be read or written.
    #[error("Template archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// The template engine rejected the merge.
    #[error("Template engine failed on '{part}': {source}")]
    Engine {
        part: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The render task panicked or was cancelled.
    #[error("Render task aborted: {0}")]
    Aborted(String),
}

/// Stable machine-readable classification of a [`ForgeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    ConfigError,
    InvalidInput,
    SubmissionError,
    PollError,
    ProcessingFailed,
    Timeout,
    NoOutput,
    ParseError,
    UnrecognizedFormat,
    RenderError,
    UnknownError,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::ConfigError => "CONFIG_ERROR",
            ErrorKind::InvalidInput => "INVALID_INPUT",
            ErrorKind::SubmissionError => "SUBMISSION_ERROR",
            ErrorKind::PollError => "POLL_ERROR",
            ErrorKind::ProcessingFailed => "PROCESSING_FAILED",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::NoOutput => "NO_OUTPUT",
            ErrorKind::ParseError => "PARSE_ERROR",
            ErrorKind::UnrecognizedFormat => "UNRECOGNIZED_FORMAT",
            ErrorKind::RenderError => "RENDER_ERROR",
            ErrorKind::UnknownError => "UNKNOWN_ERROR",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-facing failure payload.
///
/// Serialises as `{"success": false, "message": ..., "errorType": ..., "details": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub success: bool,
    pub message: String,
    pub error_type: ErrorKind,
    pub details: String,
}

impl ForgeError {
    /// The stable kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ForgeError::Config { .. } | ForgeError::InvalidConfig(_) => ErrorKind::ConfigError,
            ForgeError::InvalidInput { .. } => ErrorKind::InvalidInput,
            ForgeError::Submission { .. } => ErrorKind::SubmissionError,
            ForgeError::Poll { .. } => ErrorKind::PollError,
            ForgeError::ProcessingFailed { .. } => ErrorKind::ProcessingFailed,
            ForgeError::Timeout { .. } => ErrorKind::Timeout,
            ForgeError::NoOutput { .. } => ErrorKind::NoOutput,
            ForgeError::Parse { .. } => ErrorKind::ParseError,
            ForgeError::UnrecognizedFormat { .. } => ErrorKind::UnrecognizedFormat,
            ForgeError::Render(_) => ErrorKind::RenderError,
            ForgeError::OutputWriteFailed { .. } | ForgeError::Internal(_) => {
                ErrorKind::UnknownError
            }
        }
    }

    /// True when the remote service rejected the API token.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, ForgeError::Submission { status: Some(401), .. })
    }

    /// Short message suitable for an end user.
    pub fn user_message(&self) -> &'static str {
        match self.kind() {
            ErrorKind::ConfigError => "Server configuration error. Please contact support.",
            ErrorKind::InvalidInput => {
                "Invalid file. Only PDF, DOC, and DOCX files within the size limit are supported."
            }
            ErrorKind::SubmissionError => {
                "Failed to start CV processing workflow. Please try again."
            }
            ErrorKind::PollError => "Failed to check processing status. Please try again.",
            ErrorKind::ProcessingFailed => {
                "CV processing failed. Please check your file and try again."
            }
            ErrorKind::Timeout => {
                "CV processing timed out. The file might be too large or complex. Please try again."
            }
            ErrorKind::NoOutput => "No processed document was generated. Please try again.",
            ErrorKind::ParseError => "Failed to parse extracted CV data.",
            ErrorKind::UnrecognizedFormat => {
                "Processed document format not recognized. Please contact support."
            }
            ErrorKind::RenderError => "Failed to generate Word document from CV data.",
            ErrorKind::UnknownError => {
                "An unexpected error occurred while processing your CV. Please try again."
            }
        }
    }

    /// Diagnostic detail attached to the report.
    fn details(&self) -> String {
        match self {
            ForgeError::Submission { status: Some(401), .. } => "Authentication failed".into(),
            ForgeError::Submission { .. } => "Service unavailable".into(),
            ForgeError::Timeout { elapsed_secs, .. } => {
                format!("Processing exceeded {elapsed_secs} seconds")
            }
            other => other.to_string(),
        }
    }

    /// Build the caller-facing report for this error.
    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            success: false,
            message: self.user_message().to_string(),
            error_type: self.kind(),
            details: self.details(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submission_auth_failure_is_distinguishable() {
        let auth = ForgeError::Submission {
            status: Some(401),
            detail: "unauthorized".into(),
        };
        let down = ForgeError::Submission {
            status: Some(503),
            detail: "upstream".into(),
        };
        assert!(auth.is_auth_failure());
        assert!(!down.is_auth_failure());
        assert_eq!(auth.report().details, "Authentication failed");
        assert_eq!(down.report().details, "Service unavailable");
        assert!(down.to_string().contains("HTTP 503"), "got: {down}");
    }

    #[test]
    fn submission_without_status_has_no_http_suffix() {
        let e = ForgeError::Submission {
            status: None,
            detail: "connection refused".into(),
        };
        assert!(!e.to_string().contains("HTTP"));
        assert!(!e.is_auth_failure());
    }

    #[test]
    fn timeout_report_carries_elapsed_bound() {
        let e = ForgeError::Timeout {
            run_id: "run-1".into(),
            attempts: 60,
            elapsed_secs: 300,
        };
        let report = e.report();
        assert_eq!(report.error_type, ErrorKind::Timeout);
        assert_eq!(report.details, "Processing exceeded 300 seconds");
        assert!(e.to_string().contains("300 seconds"));
    }

    #[test]
    fn unrecognized_format_lists_fields() {
        let e = ForgeError::UnrecognizedFormat {
            fields: vec!["foo".into(), "bar".into()],
        };
        assert!(e.to_string().contains("[foo, bar]"), "got: {e}");
    }

    #[test]
    fn kinds_are_stable_codes() {
        let e = ForgeError::Config {
            setting: "API token",
            env_var: "NOXUS_API_TOKEN",
        };
        assert_eq!(e.kind().as_str(), "CONFIG_ERROR");
        assert_eq!(ForgeError::Internal("x".into()).kind(), ErrorKind::UnknownError);
        let render = ForgeError::from(RenderError::TemplateNotFound {
            path: PathBuf::from("missing.docx"),
        });
        assert_eq!(render.kind(), ErrorKind::RenderError);
    }

    #[test]
    fn report_serialises_camel_case() {
        let e = ForgeError::NoOutput {
            run_id: "r".into(),
        };
        let json = serde_json::to_value(e.report()).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["errorType"], "NO_OUTPUT");
        assert!(json["message"].as_str().unwrap().contains("No processed document"));
    }

    #[test]
    fn render_error_keeps_engine_source() {
        use std::error::Error as _;
        let inner = std::io::Error::new(std::io::ErrorKind::Other, "bad tag");
        let e = ForgeError::from(RenderError::Engine {
            part: "word/document.xml".into(),
            source: Box::new(inner),
        });
        let source = e.source().expect("engine source kept");
        assert!(source.to_string().contains("bad tag"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ForgeError>();
    }
}
