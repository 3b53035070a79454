//! Top-level entry points.
//!
//! ## Processing flow
//!
//! [`convert`] runs one upload through the remote workflow:
//! validate → submit → poll → dispatch → (render) → deliver. The flow is a
//! single sequential task; the only waiting is the poll interval, which
//! suspends just this task.
//!
//! ## Direct rendering
//!
//! [`render_curriculum`] skips the workflow and merges an already-structured
//! curriculum into the template. It is what a caller uses after editing the
//! extracted record by hand.

use crate::client::WorkflowClient;
use crate::config::ForgeConfig;
use crate::error::ForgeError;
use crate::output::{Delivery, GeneratedDocument, ProcessOutput, ProcessStats, RenderedBase64};
use crate::pipeline::dispatch::{self, record_reference, Dispatch, DispatchContext};
use crate::pipeline::input::{UploadedInput, DOCX_MIME};
use crate::pipeline::poll::{poll_run, PollSchedule};
use crate::pipeline::submit::submit_run;
use crate::template::{document_filename, reference_filename, DocumentSynthesizer};
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// Process one upload end to end.
///
/// # Errors
/// * [`ForgeError::InvalidInput`]: the upload is empty, too large, or of an
///   unsupported type
/// * [`ForgeError::Config`]: workflow id or API token missing; no request
///   is sent
/// * [`ForgeError::Submission`] / [`ForgeError::Poll`]: the remote service
///   could not be reached or refused the request
/// * [`ForgeError::ProcessingFailed`] / [`ForgeError::Timeout`]: the run
///   failed or never finished
/// * [`ForgeError::NoOutput`] / [`ForgeError::Parse`] /
///   [`ForgeError::UnrecognizedFormat`]: the run finished with an unusable
///   result
/// * [`ForgeError::Render`]: the template could not be rendered
pub async fn convert(
    input: &UploadedInput,
    config: &ForgeConfig,
    synthesizer: &DocumentSynthesizer,
) -> Result<ProcessOutput, ForgeError> {
    let total_start = Instant::now();
    let progress = config.progress_callback.as_ref();
    info!("Processing upload '{}'", input.original_name());

    // ── Step 1: Admit the upload ─────────────────────────────────────────
    input.validate(config.max_file_size)?;

    // ── Step 2: Check credentials and build the client ───────────────────
    let client = WorkflowClient::new(config)?;

    // ── Step 3: Start the workflow run ───────────────────────────────────
    let run_id = submit_run(&client, input).await?;
    if let Some(cb) = progress {
        cb.on_submitted(&run_id);
    }

    // ── Step 4: Poll until terminal ──────────────────────────────────────
    let schedule = PollSchedule::from_config(config);
    let state = poll_run(&client, &run_id, schedule, progress).await?;
    let attempts = state.attempts();
    let output = state.into_output(&run_id, &schedule)?;

    // ── Step 5: Classify the result ──────────────────────────────────────
    let upload_stem = input.file_stem();
    let routed = dispatch::dispatch(
        &output,
        DispatchContext {
            run_id: &run_id,
            upload_stem: &upload_stem,
            file_base_url: &config.file_base_url,
            now_millis: unix_millis(),
        },
    )?;

    // ── Step 6: Produce the deliverable ──────────────────────────────────
    let delivery = match routed {
        Dispatch::Relay(link) => {
            info!("Relaying download link {}", link.download_url);
            Delivery::Link(link)
        }
        Dispatch::Decoded(document) => {
            info!(
                "Using document decoded from run output ({} bytes)",
                document.content_length()
            );
            Delivery::Document(document)
        }
        Dispatch::Synthesize { identity, record } => {
            if let Some(cb) = progress {
                cb.on_rendering(&document_filename(&identity.full_name, &identity.reference));
            }
            Delivery::Document(synthesizer.synthesize(&identity, &record).await?)
        }
    };

    let size = match &delivery {
        Delivery::Link(_) => 0,
        Delivery::Document(doc) => doc.content_length(),
    };
    if let Some(cb) = progress {
        cb.on_delivered(delivery.file_name(), size);
    }

    let stats = ProcessStats {
        run_id,
        attempts,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };
    info!(
        "Processing complete: '{}' after {} polls, {}ms total",
        delivery.file_name(),
        stats.attempts,
        stats.total_duration_ms
    );

    Ok(ProcessOutput { delivery, stats })
}

/// Process an upload and write any resulting document into `out_dir`.
///
/// Documents are written atomically (see [`write_document`]). Download
/// links are returned untouched and nothing is written for them; the second
/// tuple element is the written path, if any.
pub async fn convert_to_file(
    input: &UploadedInput,
    out_dir: impl AsRef<Path>,
    config: &ForgeConfig,
    synthesizer: &DocumentSynthesizer,
) -> Result<(ProcessOutput, Option<PathBuf>), ForgeError> {
    let output = convert(input, config, synthesizer).await?;
    let written = match &output.delivery {
        Delivery::Document(doc) => Some(write_document(doc, out_dir.as_ref()).await?),
        Delivery::Link(_) => None,
    };
    Ok((output, written))
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    input: &UploadedInput,
    config: &ForgeConfig,
    synthesizer: &DocumentSynthesizer,
) -> Result<ProcessOutput, ForgeError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ForgeError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(input, config, synthesizer))
}

/// Write `doc` into `out_dir` under its own filename.
///
/// The bytes go to a temporary file in `out_dir` that is renamed over the
/// target once complete, so readers never see a partial document. Path
/// separators in the filename are replaced, so a candidate name can never
/// escape `out_dir`.
pub async fn write_document(doc: &GeneratedDocument, out_dir: &Path) -> Result<PathBuf, ForgeError> {
    let path = out_dir.join(safe_file_name(&doc.filename));
    let write_err = |source: std::io::Error| ForgeError::OutputWriteFailed {
        path: path.clone(),
        source,
    };

    tokio::fs::create_dir_all(out_dir).await.map_err(write_err)?;

    let dir = out_dir.to_path_buf();
    let target = path.clone();
    let bytes = doc.bytes.clone();
    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let mut tmp = tempfile::Builder::new()
            .prefix(".cvforge-")
            .suffix(".tmp")
            .tempfile_in(&dir)?;
        tmp.write_all(&bytes)?;
        tmp.persist(&target).map_err(|e| e.error)?;
        Ok(())
    })
    .await
    .map_err(|e| ForgeError::Internal(format!("Write task aborted: {e}")))?
    .map_err(write_err)?;

    debug!("Wrote {} ({} bytes)", path.display(), doc.content_length());
    Ok(path)
}

fn safe_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    match cleaned.trim() {
        "" | "." | ".." => "document.docx".to_string(),
        trimmed => trimmed.to_string(),
    }
}

fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

// ── Direct rendering ─────────────────────────────────────────────────────

/// Render an already-structured curriculum into the template.
///
/// `curriculum` is either a JSON object or a string holding one (parsed
/// once). The document is named `"AW CV <reference>.docx"`, where reference
/// is the record's own `cvReference`, falling back to
/// `candidate_identification`.
pub async fn render_curriculum(
    candidate_identification: &str,
    curriculum: &Value,
    synthesizer: &DocumentSynthesizer,
) -> Result<GeneratedDocument, ForgeError> {
    let candidate_identification = candidate_identification.trim();
    if candidate_identification.is_empty() {
        return Err(missing_field("candidateIdentification"));
    }

    let record = match curriculum {
        Value::Null => return Err(missing_field("curriculum")),
        Value::String(text) if text.trim().is_empty() => return Err(missing_field("curriculum")),
        Value::String(text) => serde_json::from_str(text).map_err(|e| {
            debug!("Curriculum string is not JSON: {}", e);
            ForgeError::Parse {
                detail: "Invalid curriculum JSON format".into(),
            }
        })?,
        other => other.clone(),
    };

    let reference =
        record_reference(&record).unwrap_or_else(|| candidate_identification.to_string());
    info!("Rendering curriculum for '{}'", candidate_identification);

    let bytes = synthesizer.render(candidate_identification, &record).await?;
    Ok(GeneratedDocument::new(
        bytes,
        reference_filename(&reference),
        DOCX_MIME,
    ))
}

/// [`render_curriculum`], returning the document as base64.
pub async fn render_curriculum_base64(
    candidate_identification: &str,
    curriculum: &Value,
    synthesizer: &DocumentSynthesizer,
) -> Result<RenderedBase64, ForgeError> {
    let doc = render_curriculum(candidate_identification, curriculum, synthesizer).await?;
    Ok(RenderedBase64 {
        base64: doc.to_base64(),
        candidate_identification: candidate_identification.trim().to_string(),
    })
}

fn missing_field(name: &str) -> ForgeError {
    ForgeError::InvalidInput {
        name: name.to_string(),
        reason: "is required".into(),
    }
}
