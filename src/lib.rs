//! # cv-forge
//!
//! Turn an uploaded CV into a branded Word document by way of a remote
//! extraction workflow.
//!
//! ## Why a workflow?
//!
//! Reading a CV well (multi-column layouts, scanned pages, tables of dates)
//! is the remote workflow's job. This crate does everything around it:
//! it submits the upload, waits for the run to finish, and turns whatever
//! the run returned into exactly one deliverable.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Upload
//!  │
//!  ├─ 1. Admit     media type, extension and size checks
//!  ├─ 2. Submit    base64 upload → POST …/workflows/{id}/runs → run id
//!  ├─ 3. Poll      GET …/runs/{run id} every 5 s, at most 60 times
//!  ├─ 4. Dispatch  first output node → file link | encoded document | record
//!  ├─ 5. Render    record → Word template (spawn_blocking)
//!  └─ 6. Deliver   download link or document bytes + stats
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cv_forge::{convert, DocumentSynthesizer, DocxTemplateEngine, ForgeConfig, UploadedInput};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Credentials from NOXUS_WORKFLOW_ID / NOXUS_API_TOKEN
//!     let config = ForgeConfig::from_env()?;
//!     let synthesizer = DocumentSynthesizer::from_config(Arc::new(DocxTemplateEngine::new()), &config);
//!
//!     let upload = UploadedInput::from_path("jane_doe.pdf").await?;
//!     let output = convert(&upload, &config, &synthesizer).await?;
//!     eprintln!("{} after {} polls", output.delivery.file_name(), output.stats.attempts);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `cvforge` binary (clap + anyhow + tracing-subscriber + indicatif + dotenvy) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! cv-forge = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod client;
pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod template;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use client::{RunStatus, WorkflowClient};
pub use config::{ForgeConfig, ForgeConfigBuilder};
pub use convert::{
    convert, convert_sync, convert_to_file, render_curriculum, render_curriculum_base64,
    write_document,
};
pub use error::{ErrorKind, ErrorReport, ForgeError, RenderError};
pub use output::{
    Delivery, DownloadLink, GeneratedDocument, ProcessOutput, ProcessStats, RenderedBase64,
};
pub use pipeline::dispatch::{CandidateIdentity, NodeOutput};
pub use pipeline::input::UploadedInput;
pub use pipeline::poll::{PollSchedule, RunState};
pub use progress::{NoopProgressCallback, ProcessProgressCallback, ProgressCallback};
pub use template::docx::DocxTemplateEngine;
pub use template::{DocumentSynthesizer, TemplateEngine};
