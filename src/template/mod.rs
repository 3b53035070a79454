//! Document synthesis: merge a structured CV record into a template asset.
//!
//! ## Why an injected engine?
//!
//! The flow only needs `render(template bytes, data) -> document bytes`.
//! [`TemplateEngine`] is that seam; [`docx::DocxTemplateEngine`] is the
//! concrete implementation for Word templates. The host builds one engine at
//! startup and shares it through an `Arc`, so nothing is initialised lazily
//! behind a global and tests can substitute a fake.
//!
//! ## Why spawn_blocking?
//!
//! Unzipping, rendering and re-zipping a template is CPU-bound. Running it
//! on a Tokio worker would stall every other flow sharing that worker.

pub mod docx;
pub mod helpers;

use crate::config::ForgeConfig;
use crate::error::RenderError;
use crate::output::GeneratedDocument;
use crate::pipeline::dispatch::CandidateIdentity;
use crate::pipeline::input::DOCX_MIME;
use serde_json::{Map, Value};
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Key under which the reference is exposed to templates.
pub const REFERENCE_KEY: &str = "candidateIdentification";

/// Renders structured data into a binary template.
pub trait TemplateEngine: Send + Sync {
    fn render(&self, template: &[u8], data: &Value) -> Result<Vec<u8>, RenderError>;
}

/// `"AW CV <full name> <reference>.docx"`.
pub fn document_filename(full_name: &str, reference: &str) -> String {
    format!("AW CV {full_name} {reference}.docx")
}

/// `"AW CV <reference>.docx"`, used when no full name is at hand.
pub fn reference_filename(reference: &str) -> String {
    format!("AW CV {reference}.docx")
}

/// Template data: the reference followed by every top-level field of the
/// record. A record field named like [`REFERENCE_KEY`] wins.
///
/// A record that is not a JSON object contributes no fields.
pub fn merge_data(reference: &str, record: &Value) -> Value {
    let mut data = Map::new();
    data.insert(REFERENCE_KEY.to_string(), Value::String(reference.to_string()));
    if let Value::Object(fields) = record {
        for (key, value) in fields {
            data.insert(key.clone(), value.clone());
        }
    }
    Value::Object(data)
}

/// Template asset plus the engine that renders it.
#[derive(Clone)]
pub struct DocumentSynthesizer {
    engine: Arc<dyn TemplateEngine>,
    template_path: PathBuf,
}

impl fmt::Debug for DocumentSynthesizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentSynthesizer")
            .field("template_path", &self.template_path)
            .finish_non_exhaustive()
    }
}

impl DocumentSynthesizer {
    pub fn new(engine: Arc<dyn TemplateEngine>, template_path: impl Into<PathBuf>) -> Self {
        Self {
            engine,
            template_path: template_path.into(),
        }
    }

    /// Use the template configured in [`ForgeConfig::template_path`].
    pub fn from_config(engine: Arc<dyn TemplateEngine>, config: &ForgeConfig) -> Self {
        Self::new(engine, config.template_path.clone())
    }

    pub fn template_path(&self) -> &Path {
        &self.template_path
    }

    async fn load_template(&self) -> Result<Vec<u8>, RenderError> {
        tokio::fs::read(&self.template_path).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                RenderError::TemplateNotFound {
                    path: self.template_path.clone(),
                }
            } else {
                RenderError::TemplateRead {
                    path: self.template_path.clone(),
                    source: e,
                }
            }
        })
    }

    /// Render `record` under `reference` and return the document bytes.
    pub async fn render(&self, reference: &str, record: &Value) -> Result<Vec<u8>, RenderError> {
        let template = self.load_template().await?;
        let data = merge_data(reference, record);
        debug!(
            "Rendering {} with {} top-level fields",
            self.template_path.display(),
            data.as_object().map_or(0, Map::len)
        );

        let engine = Arc::clone(&self.engine);
        let bytes = tokio::task::spawn_blocking(move || engine.render(&template, &data))
            .await
            .map_err(|e| RenderError::Aborted(e.to_string()))??;

        info!("Rendered document for '{}' ({} bytes)", reference, bytes.len());
        Ok(bytes)
    }

    /// Render the record and name the document after the candidate.
    pub async fn synthesize(
        &self,
        identity: &CandidateIdentity,
        record: &Value,
    ) -> Result<GeneratedDocument, RenderError> {
        let bytes = self.render(&identity.reference, record).await?;
        Ok(GeneratedDocument::new(
            bytes,
            document_filename(&identity.full_name, &identity.reference),
            DOCX_MIME,
        ))
    }
}
