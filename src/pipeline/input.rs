//! Upload gate: the uploaded document and its admission checks.
//!
//! The gate only decides whether a file may be sent to the workflow. It never
//! looks inside the document; the remote service does the extraction.

use crate::error::ForgeError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tracing::debug;

/// MIME type of a Word (OOXML) document.
pub const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// MIME type of a legacy Word document.
pub const DOC_MIME: &str = "application/msword";

/// MIME type of a PDF document.
pub const PDF_MIME: &str = "application/pdf";

/// Media types the gate admits.
pub const ACCEPTED_MEDIA_TYPES: [&str; 3] = [PDF_MIME, DOC_MIME, DOCX_MIME];

/// File extensions the gate admits (lower case, with the dot).
pub const ACCEPTED_EXTENSIONS: [&str; 3] = [".pdf", ".doc", ".docx"];

/// One uploaded document. Immutable once built.
#[derive(Clone)]
pub struct UploadedInput {
    bytes: Vec<u8>,
    declared_media_type: String,
    original_name: String,
}

impl std::fmt::Debug for UploadedInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadedInput")
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .field("declared_media_type", &self.declared_media_type)
            .field("original_name", &self.original_name)
            .finish()
    }
}

static RE_FINAL_EXTENSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.[^/.]+$").unwrap());

impl UploadedInput {
    pub fn new(
        bytes: impl Into<Vec<u8>>,
        declared_media_type: impl Into<String>,
        original_name: impl Into<String>,
    ) -> Self {
        Self {
            bytes: bytes.into(),
            declared_media_type: declared_media_type.into(),
            original_name: original_name.into(),
        }
    }

    /// Read a local file, inferring its media type from the extension.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, ForgeError> {
        let path = path.as_ref();
        let original_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let bytes = tokio::fs::read(path).await.map_err(|e| ForgeError::InvalidInput {
            name: path.display().to_string(),
            reason: format!("cannot read file: {e}"),
        })?;

        let media_type = media_type_for(&original_name).unwrap_or("application/octet-stream");
        debug!("Read upload {} ({} bytes, {})", original_name, bytes.len(), media_type);

        Ok(Self::new(bytes, media_type, original_name))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn declared_media_type(&self) -> &str {
        &self.declared_media_type
    }

    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Original name without its final extension (`"cv.final.pdf"` → `"cv.final"`).
    pub fn file_stem(&self) -> String {
        RE_FINAL_EXTENSION
            .replace(&self.original_name, "")
            .into_owned()
    }

    /// Apply the admission rules: non-empty, within `max_file_size`, accepted
    /// media type and accepted extension.
    pub fn validate(&self, max_file_size: u64) -> Result<(), ForgeError> {
        let reject = |reason: String| ForgeError::InvalidInput {
            name: self.original_name.clone(),
            reason,
        };

        if self.bytes.is_empty() {
            return Err(reject("file is empty".into()));
        }
        if self.bytes.len() as u64 > max_file_size {
            return Err(reject(format!(
                "file is {} bytes, limit is {} bytes",
                self.bytes.len(),
                max_file_size
            )));
        }
        if !ACCEPTED_MEDIA_TYPES.contains(&self.declared_media_type.as_str()) {
            return Err(reject(format!(
                "media type '{}' is not supported; only PDF, DOC, and DOCX files are",
                self.declared_media_type
            )));
        }
        match extension_of(&self.original_name) {
            Some(ext) if ACCEPTED_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
            _ => Err(reject(
                "extension must be one of .pdf, .doc, .docx".into(),
            )),
        }
    }
}

/// Lower-cased final extension including the dot.
fn extension_of(name: &str) -> Option<String> {
    RE_FINAL_EXTENSION
        .find(name)
        .map(|m| m.as_str().to_ascii_lowercase())
}

/// Media type implied by a file name, for the accepted extensions.
pub fn media_type_for(name: &str) -> Option<&'static str> {
    match extension_of(name)?.as_str() {
        ".pdf" => Some(PDF_MIME),
        ".doc" => Some(DOC_MIME),
        ".docx" => Some(DOCX_MIME),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn pdf(name: &str, size: usize) -> UploadedInput {
        UploadedInput::new(vec![b'x'; size], PDF_MIME, name)
    }

    #[test]
    fn stem_strips_only_final_extension() {
        assert_eq!(pdf("cv.final.pdf", 1).file_stem(), "cv.final");
        assert_eq!(pdf("Jane Doe.PDF", 1).file_stem(), "Jane Doe");
        assert_eq!(pdf("noext", 1).file_stem(), "noext");
    }

    #[test]
    fn validate_accepts_supported_upload() {
        assert_ok!(pdf("resume.pdf", 10).validate(100));
        assert_ok!(pdf("RESUME.PDF", 10).validate(100));
    }

    #[test]
    fn validate_rejects_empty_and_oversized() {
        assert!(matches!(
            pdf("a.pdf", 0).validate(100),
            Err(ForgeError::InvalidInput { .. })
        ));
        let err = pdf("a.pdf", 101).validate(100).unwrap_err();
        assert!(err.to_string().contains("limit is 100"), "got: {err}");
    }

    #[test]
    fn validate_rejects_wrong_type_or_extension() {
        let txt = UploadedInput::new(b"hi".to_vec(), "text/plain", "notes.txt");
        assert_err!(txt.validate(100));

        let mismatched = UploadedInput::new(b"hi".to_vec(), PDF_MIME, "notes.txt");
        assert_err!(mismatched.validate(100));
    }

    #[test]
    fn media_type_from_extension() {
        assert_eq!(media_type_for("x.docx"), Some(DOCX_MIME));
        assert_eq!(media_type_for("x.DOC"), Some(DOC_MIME));
        assert_eq!(media_type_for("x.png"), None);
        assert_eq!(media_type_for("x"), None);
    }

    #[tokio::test]
    async fn from_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("candidate.docx");
        std::fs::write(&path, b"PK\x03\x04rest").unwrap();

        let input = UploadedInput::from_path(&path).await.unwrap();
        assert_eq!(input.original_name(), "candidate.docx");
        assert_eq!(input.declared_media_type(), DOCX_MIME);
        assert_eq!(input.len(), 8);
    }

    #[tokio::test]
    async fn from_path_missing_file_is_invalid_input() {
        let err = UploadedInput::from_path("/definitely/not/here.pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::InvalidInput { .. }));
    }
}
