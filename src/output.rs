//! Output types returned to the caller.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

/// A finished document. Created once and never mutated.
#[derive(Clone, PartialEq, Eq)]
pub struct GeneratedDocument {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub content_type: String,
}

impl GeneratedDocument {
    pub fn new(bytes: Vec<u8>, filename: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            bytes,
            filename: filename.into(),
            content_type: content_type.into(),
        }
    }

    /// `Content-Disposition` value for serving the document as a download.
    ///
    /// Double quotes and backslashes in the filename are escaped.
    pub fn content_disposition(&self) -> String {
        let escaped = self.filename.replace('\\', "\\\\").replace('"', "\\\"");
        format!("attachment; filename=\"{escaped}\"")
    }

    /// Exact byte length of the document.
    pub fn content_length(&self) -> usize {
        self.bytes.len()
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }
}

impl std::fmt::Debug for GeneratedDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratedDocument")
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Link to a document the remote service already stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadLink {
    pub success: bool,
    pub download_url: String,
    pub file_name: String,
}

impl DownloadLink {
    pub fn new(download_url: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            success: true,
            download_url: download_url.into(),
            file_name: file_name.into(),
        }
    }
}

/// What the caller receives at the end of a processing flow.
#[derive(Debug, Clone)]
pub enum Delivery {
    Link(DownloadLink),
    Document(GeneratedDocument),
}

impl Delivery {
    /// Name shown to the user: the document filename or the link's file name.
    pub fn file_name(&self) -> &str {
        match self {
            Delivery::Link(link) => &link.file_name,
            Delivery::Document(doc) => &doc.filename,
        }
    }
}

/// Statistics for one processing flow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessStats {
    pub run_id: String,
    /// Status queries issued before the run became terminal.
    pub attempts: u32,
    pub total_duration_ms: u64,
}

/// Result of [`crate::convert::convert`].
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub delivery: Delivery,
    pub stats: ProcessStats,
}

/// Rendered document as base64, for callers that embed it in JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedBase64 {
    pub base64: String,
    pub candidate_identification: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn link_serializes_for_callers() {
        let link = DownloadLink::new("https://files/abc", "Jane CV");
        assert_eq!(
            serde_json::to_value(&link).unwrap(),
            json!({ "success": true, "downloadUrl": "https://files/abc", "fileName": "Jane CV" })
        );
    }

    #[test]
    fn document_headers() {
        let doc = GeneratedDocument::new(vec![1, 2, 3], "AW CV \"J\" R.docx", "application/x");
        assert_eq!(doc.content_length(), 3);
        assert_eq!(
            doc.content_disposition(),
            "attachment; filename=\"AW CV \\\"J\\\" R.docx\""
        );
        assert_eq!(doc.to_base64(), "AQID");
    }

    #[test]
    fn debug_omits_bytes() {
        let doc = GeneratedDocument::new(vec![0; 4096], "a.docx", "x");
        let shown = format!("{doc:?}");
        assert!(shown.contains("len: 4096"));
        assert!(shown.len() < 200);
    }

    #[test]
    fn rendered_base64_field_names() {
        let r = RenderedBase64 {
            base64: "AA==".into(),
            candidate_identification: "AW-1".into(),
        };
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["candidateIdentification"], "AW-1");
    }
}
