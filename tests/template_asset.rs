//! Renders the bundled Word template with a record shaped like the ones the
//! extraction workflow returns.
//!
//! Run with:
//!   cargo test --test template_asset

use cv_forge::{render_curriculum, DocumentSynthesizer, DocxTemplateEngine};
use serde_json::{json, Value};
use std::io::{Cursor, Read};
use std::path::PathBuf;
use std::sync::Arc;
use zip::ZipArchive;

fn bundled_template() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("templates/AW_cv_template.docx")
}

fn part(docx: &[u8], name: &str) -> String {
    let mut archive = ZipArchive::new(Cursor::new(docx)).unwrap();
    let mut out = String::new();
    archive.by_name(name).unwrap().read_to_string(&mut out).unwrap();
    out
}

fn record() -> Value {
    json!({
        "$metadata": {
            "personalInformation": {
                "fullName": "Ana Lima",
                "cvReference": "AW-FS-002",
                "description": "Curious\nClient focused"
            },
            "occupationalInfo": {
                "jobTitleName": "Backend developer",
                "digitalSkills": "Rust | Postgres & Redis",
                "previousJobPositions": [{
                    "employerName": "Initech",
                    "startDate": "2021",
                    "endDate": "Present",
                    "jobTitle": "Backend developer",
                    "responsabilitiesAndProjects": [{
                        "project": "Billing platform",
                        "responsability": "Owned the invoicing service.",
                        "previousJobResponsibilitiesRemarks": [["Cut p99 latency by half"]],
                        "technologies": "Rust | Kafka"
                    }]
                }]
            },
            "education": [
                { "year": "2019", "universityName": "U.P.", "major": "MSc Informatics" },
                { "year": "", "universityName": "", "major": "AWS Fundamentals" }
            ],
            "motherTongue": "Portuguese",
            "languages": [
                { "language": "English", "understanding": "C1", "speaking": "C1", "writing": "C1" },
                { "language": "Spanish", "understanding": "", "speaking": "", "writing": "" }
            ]
        }
    })
}

#[tokio::test]
async fn bundled_template_renders_a_full_record() {
    let synth = DocumentSynthesizer::new(Arc::new(DocxTemplateEngine::new()), bundled_template());

    let doc = render_curriculum("cand-9", &record(), &synth).await.unwrap();
    assert_eq!(doc.filename, "AW CV AW-FS-002.docx");

    let body = part(&doc.bytes, "word/document.xml");
    for expected in [
        "Ana Lima",
        "Backend developer, Initech",
        "2021 to Present",
        "Billing platform",
        "• Cut p99 latency by half",
        "Technologies: Rust | Kafka",
        "Rust | Postgres &amp; Redis",
        "2019: MSc Informatics, U.P.",
        "AWS Fundamentals",
        "Mother tongue: Portuguese",
        "English (understanding C1, speaking C1, writing C1)",
    ] {
        assert!(body.contains(expected), "missing {expected:?}");
    }
    assert!(!body.contains("Spanish ("));
    assert!(!body.contains("{{"));
    assert!(!body.contains("{%"));

    assert!(part(&doc.bytes, "word/header1.xml").contains("CV cand-9"));
    assert!(part(&doc.bytes, "word/styles.xml").contains("heading 1"));
}

#[tokio::test]
async fn sparse_record_still_renders() {
    let synth = DocumentSynthesizer::new(Arc::new(DocxTemplateEngine::new()), bundled_template());

    let doc = render_curriculum("cand-9", &json!({}), &synth).await.unwrap();
    assert_eq!(doc.filename, "AW CV cand-9.docx");

    let body = part(&doc.bytes, "word/document.xml");
    assert!(body.contains("Professional experience"));
    assert!(!body.contains("Digital skills"));
}
