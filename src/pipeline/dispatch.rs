//! Result dispatch: turn a completed run's output into exactly one deliverable.
//!
//! ## Selection
//!
//! A run's output maps node names to node outputs. Only one node is used:
//! **the first key in document order as returned by the service** (the JSON
//! object is decoded with `preserve_order`, so this is stable and
//! reproducible).
//!
//! ## Classification
//!
//! The selected node output is classified once, at this boundary, into
//! [`NodeOutput`]. First match wins:
//!
//! | Shape | Condition | Route |
//! |-------|-----------|-------|
//! | `FileReference`    | `id` and `uri` both present         | relay a download link |
//! | `EncodedBinary`    | `text` is base64 of a known document | decode to bytes |
//! | `StructuredRecord` | `text` is any other string           | parse JSON, render template |
//! | `Unrecognized`     | anything else                        | hard error |
//!
//! ## Double-encoded records
//!
//! Some workflows JSON-encode the record twice. [`parse_record`] unwraps one
//! extra level only. A record wrapped three times stays a JSON string after
//! the second parse; identity extraction then falls back to its defaults and
//! the template receives no record fields. This is the current behaviour, not
//! necessarily the desired one.

use crate::error::ForgeError;
use crate::output::{DownloadLink, GeneratedDocument};
use crate::pipeline::encode::{decode_binary_document, BinaryKind};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

/// Full name used when the record carries none.
pub const DEFAULT_FULL_NAME: &str = "Candidate";

/// Reference used when the record carries none.
pub const DEFAULT_REFERENCE: &str = "Unknown";

/// Prefix of synthesized references.
pub const REFERENCE_PREFIX: &str = "AW";

/// A file object already produced by the remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReference {
    pub id: String,
    pub uri: String,
    pub display_name: Option<String>,
    pub content_type: Option<String>,
}

/// A finished document carried as base64 text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBinary {
    pub bytes: Vec<u8>,
    pub kind: BinaryKind,
}

/// Classified node output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeOutput {
    FileReference(FileReference),
    EncodedBinary(EncodedBinary),
    /// JSON text, possibly encoded twice.
    StructuredRecord(String),
    /// Field names found on the node, for diagnostics.
    Unrecognized { fields: Vec<String> },
}

impl NodeOutput {
    /// Classify one node output value.
    pub fn classify(node: &Value) -> Self {
        let Some(obj) = node.as_object() else {
            return NodeOutput::Unrecognized { fields: Vec::new() };
        };

        let present = |key: &str| obj.get(key).filter(|v| is_truthy(v));

        if let (Some(id), Some(uri)) = (present("id"), present("uri")) {
            return NodeOutput::FileReference(FileReference {
                id: scalar_to_string(id),
                uri: scalar_to_string(uri),
                display_name: obj.get("name").and_then(Value::as_str).map(str::to_string),
                content_type: obj
                    .get("content_type")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            });
        }

        if let Some(text) = present("text").and_then(Value::as_str) {
            if let Some((bytes, kind)) = decode_binary_document(text) {
                return NodeOutput::EncodedBinary(EncodedBinary { bytes, kind });
            }
            return NodeOutput::StructuredRecord(text.to_string());
        }

        NodeOutput::Unrecognized {
            fields: obj.keys().cloned().collect(),
        }
    }
}

/// JavaScript-style truthiness, the presence test the workflow contract uses.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Pick the first node of the output mapping.
pub fn select_node<'a>(
    output: &'a Map<String, Value>,
    run_id: &str,
) -> Result<(&'a str, &'a Value), ForgeError> {
    output
        .iter()
        .next()
        .map(|(name, node)| (name.as_str(), node))
        .ok_or_else(|| ForgeError::NoOutput {
            run_id: run_id.to_string(),
        })
}

/// Parse a structured record, unwrapping at most one extra level of string
/// encoding.
pub fn parse_record(text: &str) -> Result<Value, ForgeError> {
    let first: Value = serde_json::from_str(text).map_err(|e| ForgeError::Parse {
        detail: e.to_string(),
    })?;

    match first {
        Value::String(inner) => {
            debug!("Record is double-encoded, parsing again");
            serde_json::from_str(&inner).map_err(|e| ForgeError::Parse {
                detail: format!("double-encoded record: {e}"),
            })
        }
        record => Ok(record),
    }
}

// ── Candidate identity ───────────────────────────────────────────────────

const FULL_NAME_POINTER: &str = "/$metadata/personalInformation/fullName";
const REFERENCE_POINTER: &str = "/$metadata/personalInformation/cvReference";

/// A string field of the record. Each field is read on its own, so a
/// non-string value drops only that field.
fn personal_field<'a>(record: &'a Value, pointer: &str) -> Option<&'a str> {
    let value = record.pointer(pointer)?;
    let text = value.as_str();
    if text.is_none() && !value.is_null() {
        debug!("Ignoring non-string {}: {}", pointer, value);
    }
    text
}

/// The record's own `cvReference`, when present and not blank.
pub fn record_reference(record: &Value) -> Option<String> {
    personal_field(record, REFERENCE_POINTER)
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
}

/// The `(full name, reference)` pair that labels a generated document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateIdentity {
    pub full_name: String,
    pub reference: String,
}

impl CandidateIdentity {
    /// Extract the identity from `$metadata.personalInformation`.
    ///
    /// * `fullName` absent or blank → [`DEFAULT_FULL_NAME`]
    /// * `cvReference` absent → [`DEFAULT_REFERENCE`]
    /// * `cvReference` present but blank → [`fallback_reference`] at `now_millis`
    pub fn from_record(record: &Value, now_millis: u128) -> Self {
        let full_name = personal_field(record, FULL_NAME_POINTER)
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| DEFAULT_FULL_NAME.to_string());

        let reference = match personal_field(record, REFERENCE_POINTER) {
            None => DEFAULT_REFERENCE.to_string(),
            Some(r) if r.trim().is_empty() => fallback_reference(&full_name, now_millis),
            Some(r) => r.trim().to_string(),
        };

        Self {
            full_name,
            reference,
        }
    }
}

/// Synthesize a reference: `AW` + upper-cased initials of every
/// space-separated token of `full_name` + the last four digits of `now_millis`.
///
/// ```rust
/// use cv_forge::pipeline::dispatch::fallback_reference;
/// assert_eq!(fallback_reference("John Paul Smith", 1_700_000_004_321), "AWJPS4321");
/// ```
pub fn fallback_reference(full_name: &str, now_millis: u128) -> String {
    let initials: String = full_name
        .split(' ')
        .filter_map(|token| token.chars().next())
        .flat_map(char::to_uppercase)
        .collect();
    format!("{REFERENCE_PREFIX}{initials}{:04}", now_millis % 10_000)
}

// ── Routing ──────────────────────────────────────────────────────────────

/// What the flow does with the selected node.
#[derive(Debug, Clone)]
pub enum Dispatch {
    /// Hand the remote file's download link to the caller.
    Relay(DownloadLink),
    /// The node already held the finished document.
    Decoded(GeneratedDocument),
    /// Merge the record into the template.
    Synthesize {
        identity: CandidateIdentity,
        record: Value,
    },
}

/// Everything dispatch needs besides the run output.
#[derive(Debug, Clone, Copy)]
pub struct DispatchContext<'a> {
    pub run_id: &'a str,
    /// Original upload name without its extension.
    pub upload_stem: &'a str,
    pub file_base_url: &'a str,
    pub now_millis: u128,
}

/// Select, classify and route a completed run's output.
pub fn dispatch(output: &Map<String, Value>, ctx: DispatchContext<'_>) -> Result<Dispatch, ForgeError> {
    let (node_name, node) = select_node(output, ctx.run_id)?;
    debug!(
        "Run {}: {} output node(s), using '{}'",
        ctx.run_id,
        output.len(),
        node_name
    );

    match NodeOutput::classify(node) {
        NodeOutput::FileReference(file) => {
            info!(
                "Node '{}' is a remote file ({}, {})",
                node_name,
                file.display_name.as_deref().unwrap_or("unnamed"),
                file.content_type.as_deref().unwrap_or("unknown type")
            );
            Ok(Dispatch::Relay(DownloadLink::new(
                format!("{}/{}", ctx.file_base_url.trim_end_matches('/'), file.id),
                ctx.upload_stem,
            )))
        }
        NodeOutput::EncodedBinary(EncodedBinary { bytes, kind }) => {
            info!("Node '{}' holds an encoded {:?} document", node_name, kind);
            let stem = if ctx.upload_stem.is_empty() {
                "document"
            } else {
                ctx.upload_stem
            };
            Ok(Dispatch::Decoded(GeneratedDocument::new(
                bytes,
                format!("{stem}.{}", kind.extension()),
                kind.content_type(),
            )))
        }
        NodeOutput::StructuredRecord(text) => {
            info!("Node '{}' holds a structured record", node_name);
            let record = parse_record(&text)?;
            if !record.is_object() {
                warn!(
                    "Record for run {} is still not an object after two parses; identity falls back to defaults",
                    ctx.run_id
                );
            }
            let identity = CandidateIdentity::from_record(&record, ctx.now_millis);
            debug!(
                "Candidate identity: '{}' / '{}'",
                identity.full_name, identity.reference
            );
            Ok(Dispatch::Synthesize { identity, record })
        }
        NodeOutput::Unrecognized { fields } => {
            warn!("Node '{}' has an unrecognized shape: {:?}", node_name, fields);
            Err(ForgeError::UnrecognizedFormat { fields })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde_json::json;

    const NOW: u128 = 1_726_000_001_234;

    fn ctx() -> DispatchContext<'static> {
        DispatchContext {
            run_id: "run-1",
            upload_stem: "Jane Doe CV",
            file_base_url: "https://files.example.com/file/",
            now_millis: NOW,
        }
    }

    fn output(node: Value) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("extract".into(), node);
        map
    }

    fn record_text(full_name: &str, reference: Option<&str>) -> String {
        let mut personal = json!({ "fullName": full_name });
        if let Some(r) = reference {
            personal["cvReference"] = json!(r);
        }
        json!({ "$metadata": { "personalInformation": personal } }).to_string()
    }

    #[test]
    fn empty_output_is_no_output() {
        let err = dispatch(&Map::new(), ctx()).unwrap_err();
        assert!(matches!(err, ForgeError::NoOutput { .. }));
    }

    #[test]
    fn first_key_in_document_order_wins() {
        let output: Map<String, Value> =
            serde_json::from_str(r#"{"zeta": {"text": "{}"}, "alpha": {"id": "f", "uri": "u"}}"#)
                .unwrap();
        let (name, _) = select_node(&output, "r").unwrap();
        assert_eq!(name, "zeta");
    }

    #[test]
    fn id_and_uri_win_over_text() {
        let node = json!({
            "id": "file-42",
            "uri": "s3://bucket/file-42",
            "name": "cv.docx",
            "content_type": "application/msword",
            "text": record_text("Jane Doe", Some("AW-1")),
        });
        match dispatch(&output(node), ctx()).unwrap() {
            Dispatch::Relay(link) => {
                assert_eq!(link.download_url, "https://files.example.com/file/file-42");
                assert_eq!(link.file_name, "Jane Doe CV");
            }
            other => panic!("expected Relay, got {other:?}"),
        }
    }

    #[test]
    fn empty_id_is_not_a_file_reference() {
        let node = json!({ "id": "", "uri": "s3://x", "text": record_text("A B", Some("R")) });
        assert!(matches!(
            NodeOutput::classify(&node),
            NodeOutput::StructuredRecord(_)
        ));
    }

    #[test]
    fn base64_document_text_is_decoded() {
        let node = json!({ "text": STANDARD.encode(b"PK\x03\x04docx-bytes") });
        match dispatch(&output(node), ctx()).unwrap() {
            Dispatch::Decoded(doc) => {
                assert!(doc.bytes.starts_with(b"PK\x03\x04"));
                assert_eq!(doc.filename, "Jane Doe CV.docx");
                assert_eq!(doc.content_type, BinaryKind::Docx.content_type());
            }
            other => panic!("expected Decoded, got {other:?}"),
        }
    }

    #[test]
    fn json_text_is_synthesized() {
        let node = json!({ "text": record_text("Jane Doe", Some("AW-1")) });
        match dispatch(&output(node), ctx()).unwrap() {
            Dispatch::Synthesize { identity, record } => {
                assert_eq!(identity.full_name, "Jane Doe");
                assert_eq!(identity.reference, "AW-1");
                assert!(record.get("$metadata").is_some());
            }
            other => panic!("expected Synthesize, got {other:?}"),
        }
    }

    #[test]
    fn double_encoded_record_is_unwrapped_once() {
        let once = record_text("Jane Doe", Some("AW-1"));
        let twice = serde_json::to_string(&once).unwrap();
        let record = parse_record(&twice).unwrap();
        assert!(record.is_object());
        assert_eq!(
            CandidateIdentity::from_record(&record, NOW).reference,
            "AW-1"
        );
    }

    #[test]
    fn triple_encoded_record_stays_a_string() {
        let once = record_text("Jane Doe", Some("AW-1"));
        let twice = serde_json::to_string(&once).unwrap();
        let thrice = serde_json::to_string(&twice).unwrap();

        let record = parse_record(&thrice).unwrap();
        assert!(record.is_string(), "only one extra level is unwrapped");

        let identity = CandidateIdentity::from_record(&record, NOW);
        assert_eq!(identity.full_name, DEFAULT_FULL_NAME);
        assert_eq!(identity.reference, DEFAULT_REFERENCE);
    }

    #[test]
    fn malformed_record_is_parse_error() {
        let node = json!({ "text": "{not json" });
        let err = dispatch(&output(node), ctx()).unwrap_err();
        assert!(matches!(err, ForgeError::Parse { .. }));

        let err = parse_record("\"{still not json\"").unwrap_err();
        assert!(err.to_string().contains("double-encoded"));
    }

    #[test]
    fn unknown_shape_lists_fields() {
        let node = json!({ "blob": 1, "meta": {} });
        match dispatch(&output(node), ctx()).unwrap_err() {
            ForgeError::UnrecognizedFormat { fields } => {
                assert_eq!(fields, vec!["blob".to_string(), "meta".to_string()]);
            }
            other => panic!("expected UnrecognizedFormat, got {other:?}"),
        }
    }

    #[test]
    fn non_object_node_is_unrecognized() {
        assert_eq!(
            NodeOutput::classify(&Value::Null),
            NodeOutput::Unrecognized { fields: vec![] }
        );
        assert!(matches!(
            NodeOutput::classify(&json!({ "text": 12 })),
            NodeOutput::Unrecognized { .. }
        ));
    }

    #[test]
    fn identity_defaults_when_metadata_missing() {
        let identity = CandidateIdentity::from_record(&json!({ "education": [] }), NOW);
        assert_eq!(identity.full_name, "Candidate");
        assert_eq!(identity.reference, "Unknown");
    }

    #[test]
    fn identity_tolerates_wrong_types() {
        let record = json!({ "$metadata": { "personalInformation": { "fullName": 7 } } });
        let identity = CandidateIdentity::from_record(&record, NOW);
        assert_eq!(identity.full_name, "Candidate");
        assert_eq!(identity.reference, "Unknown");

        let record = json!({
            "$metadata": { "personalInformation": { "fullName": 7, "cvReference": "AW-1" } }
        });
        let identity = CandidateIdentity::from_record(&record, NOW);
        assert_eq!(identity.full_name, "Candidate");
        assert_eq!(identity.reference, "AW-1");
        assert_eq!(record_reference(&record).as_deref(), Some("AW-1"));

        let record = json!({
            "$metadata": { "personalInformation": { "fullName": "Ana Lima", "cvReference": 42 } }
        });
        let identity = CandidateIdentity::from_record(&record, NOW);
        assert_eq!(identity.full_name, "Ana Lima");
        assert_eq!(identity.reference, "Unknown");

        let record = json!({ "$metadata": "not an object" });
        assert_eq!(CandidateIdentity::from_record(&record, NOW).reference, "Unknown");
    }

    #[test]
    fn blank_reference_synthesizes_fallback() {
        let record: Value = serde_json::from_str(&record_text("John Paul Smith", Some(""))).unwrap();
        let identity = CandidateIdentity::from_record(&record, NOW);
        assert_eq!(identity.reference, "AWJPS1234");

        let suffix = identity.reference.strip_prefix("AWJPS").unwrap();
        assert_eq!(suffix.len(), 4);
        assert!(suffix.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn record_reference_ignores_blank_values() {
        let record: Value = serde_json::from_str(&record_text("A B", Some(" AW-7 "))).unwrap();
        assert_eq!(record_reference(&record).as_deref(), Some("AW-7"));
        let record: Value = serde_json::from_str(&record_text("A B", Some("  "))).unwrap();
        assert_eq!(record_reference(&record), None);
        assert_eq!(record_reference(&json!({})), None);
    }

    #[test]
    fn fallback_reference_edge_cases() {
        assert_eq!(fallback_reference("ana  maria", 5), "AWAM0005");
        assert_eq!(fallback_reference("élodie durand", 10_000), "AWÉD0000");
    }
}
