//! Base64 in both directions.
//!
//! Outbound, the uploaded document travels to the workflow as a standard,
//! padded base64 string inside a JSON body. Inbound, a node's `text` field may
//! carry a finished document in the same encoding; [`decode_binary_document`]
//! recognises it by the file signature of the decoded bytes so that a JSON
//! record never gets mistaken for one.

use crate::pipeline::input::{DOCX_MIME, DOC_MIME, PDF_MIME};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::debug;

/// Binary document formats recognised in a node's `text` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryKind {
    /// ZIP container; OOXML Word documents.
    Docx,
    /// PDF document.
    Pdf,
    /// OLE2 compound file; legacy Word documents.
    LegacyDoc,
}

impl BinaryKind {
    pub fn content_type(self) -> &'static str {
        match self {
            BinaryKind::Docx => DOCX_MIME,
            BinaryKind::Pdf => PDF_MIME,
            BinaryKind::LegacyDoc => DOC_MIME,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            BinaryKind::Docx => "docx",
            BinaryKind::Pdf => "pdf",
            BinaryKind::LegacyDoc => "doc",
        }
    }

    /// Identify a document by its leading signature bytes.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"PK\x03\x04") {
            Some(BinaryKind::Docx)
        } else if bytes.starts_with(b"%PDF") {
            Some(BinaryKind::Pdf)
        } else if bytes.starts_with(&[0xD0, 0xCF, 0x11, 0xE0]) {
            Some(BinaryKind::LegacyDoc)
        } else {
            None
        }
    }
}

/// Encode an upload for the workflow request body.
pub fn encode_document(bytes: &[u8]) -> String {
    let b64 = STANDARD.encode(bytes);
    debug!("Encoded document → {} bytes base64", b64.len());
    b64
}

/// Decode `text` as a base64 binary document.
///
/// Returns `None` unless the text is valid standard base64 (surrounding
/// whitespace and embedded line breaks allowed) **and** the decoded bytes
/// start with a known document signature.
pub fn decode_binary_document(text: &str) -> Option<(Vec<u8>, BinaryKind)> {
    let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    // Shortest input that can hold a 4-byte signature.
    if compact.len() < 8 {
        return None;
    }
    let bytes = STANDARD.decode(compact.as_bytes()).ok()?;
    let kind = BinaryKind::sniff(&bytes)?;
    debug!("Decoded {:?} document from text field ({} bytes)", kind, bytes.len());
    Some((bytes, kind))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_is_standard_padded() {
        assert_eq!(encode_document(b"ab"), "YWI=");
    }

    #[test]
    fn decode_recognises_docx_and_pdf() {
        let docx = STANDARD.encode(b"PK\x03\x04 rest of archive");
        let (bytes, kind) = decode_binary_document(&docx).expect("docx");
        assert_eq!(kind, BinaryKind::Docx);
        assert!(bytes.starts_with(b"PK"));

        let pdf = STANDARD.encode(b"%PDF-1.7 body");
        assert_eq!(decode_binary_document(&pdf).unwrap().1, BinaryKind::Pdf);
    }

    #[test]
    fn decode_tolerates_line_wrapping() {
        let encoded = STANDARD.encode(b"%PDF-1.4 a longer body for wrapping purposes");
        let wrapped = format!("{}\n{}\n", &encoded[..20], &encoded[20..]);
        assert!(decode_binary_document(&wrapped).is_some());
    }

    #[test]
    fn json_text_is_not_binary() {
        assert!(decode_binary_document(r#"{"$metadata": {}}"#).is_none());
        assert!(decode_binary_document(r#""{\"a\":1}""#).is_none());
    }

    #[test]
    fn valid_base64_of_plain_text_is_not_binary() {
        let text = STANDARD.encode(b"just some words, not a document");
        assert!(decode_binary_document(&text).is_none());
    }

    #[test]
    fn kind_metadata() {
        assert_eq!(BinaryKind::Docx.content_type(), DOCX_MIME);
        assert_eq!(BinaryKind::LegacyDoc.extension(), "doc");
        assert_eq!(
            BinaryKind::sniff(&[0xD0, 0xCF, 0x11, 0xE0, 0xA1]),
            Some(BinaryKind::LegacyDoc)
        );
    }
}
