//! Named transforms available to CV templates.
//!
//! Everything here is a pure function over plain data; `docx` wires them
//! into the template environment.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// WordprocessingML that ends the current paragraph and opens a new one with
/// an empty text run.
pub const PARAGRAPH_BREAK: &str =
    r#"</w:t></w:r></w:p><w:p><w:r><w:t xml:space="preserve">"#;

static RE_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z0-9_]\S*").unwrap());

/// Loose equality: numbers compare numerically, strings that look like
/// numbers compare equal to those numbers, booleans compare as 0/1.
///
/// `null` only equals `null`.
pub fn loosely_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(_), _) | (_, Value::Number(_)) | (Value::Bool(_), _) | (_, Value::Bool(_)) => {
            match (as_number(a), as_number(b)) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            }
        }
        _ => a == b,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                Some(0.0)
            } else {
                s.parse().ok()
            }
        }
        _ => None,
    }
}

/// True for missing values and strings made only of whitespace.
pub fn is_empty_or_whitespace(value: Option<&str>) -> bool {
    value.is_none_or(|s| s.chars().all(char::is_whitespace))
}

/// `"senior_java_developer.pdf"` → `"Senior Java Developer"`.
///
/// Only the final extension is removed; a name without any `.` yields an
/// empty string.
pub fn format_filename(filename: &str) -> String {
    let Some((stem, _ext)) = filename.rsplit_once('.') else {
        return String::new();
    };
    let spaced = stem.replace('_', " ");
    RE_WORD.replace_all(&spaced, |caps: &regex::Captures<'_>| {
        let word = &caps[0];
        let mut chars = word.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars.as_str().to_lowercase().chars()).collect(),
            None => String::new(),
        }
    })
    .into_owned()
}

/// Render a date as `"<Month> <Year>"` in English, or `""` when it does not
/// parse.
///
/// Accepted: RFC 3339 timestamps, `YYYY-MM-DD[THH:MM:SS]`, `YYYY/MM/DD`,
/// `MM/DD/YYYY`, `YYYY-MM`, `YYYY`, and `"<Month> <Year>"` (full or short
/// month name).
pub fn format_month_year(date: &str) -> String {
    parse_loose_date(date.trim())
        .map(|d| d.format("%B %Y").to_string())
        .unwrap_or_default()
}

fn parse_loose_date(s: &str) -> Option<NaiveDate> {
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.date());
    }
    for fmt in ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(&format!("{s}-01"), "%Y-%m-%d") {
        return Some(d);
    }
    if s.len() == 4 && s.bytes().all(|b| b.is_ascii_digit()) {
        return s.parse().ok().and_then(|y| NaiveDate::from_ymd_opt(y, 1, 1));
    }
    NaiveDate::parse_from_str(&format!("1 {s}"), "%d %B %Y").ok()
}

/// Escape `text` for a WordprocessingML text run and turn every line break
/// into a paragraph break.
pub fn text_with_breaks(text: &str) -> String {
    text.split('\n')
        .map(|line| escape_xml(line.strip_suffix('\r').unwrap_or(line)))
        .collect::<Vec<_>>()
        .join(PARAGRAPH_BREAK)
}

pub(crate) fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn equality_is_loose() {
        assert!(loosely_equal(&json!("3"), &json!(3)));
        assert!(loosely_equal(&json!(1), &json!(true)));
        assert!(loosely_equal(&json!("en"), &json!("en")));
        assert!(loosely_equal(&json!(null), &json!(null)));
        assert!(!loosely_equal(&json!(null), &json!("")));
        assert!(!loosely_equal(&json!("en"), &json!("fr")));
        assert!(!loosely_equal(&json!("abc"), &json!(0)));
        assert!(loosely_equal(&json!(""), &json!(0)));
    }

    #[test]
    fn blank_detection() {
        assert!(is_empty_or_whitespace(None));
        assert!(is_empty_or_whitespace(Some("")));
        assert!(is_empty_or_whitespace(Some(" \t\n")));
        assert!(!is_empty_or_whitespace(Some(" x ")));
    }

    #[test]
    fn filenames_are_title_cased() {
        assert_eq!(format_filename("senior_java_DEVELOPER.pdf"), "Senior Java Developer");
        assert_eq!(format_filename("report.final.docx"), "Report.final");
        assert_eq!(format_filename("no-extension"), "");
        assert_eq!(format_filename(""), "");
    }

    #[test]
    fn month_year_formats() {
        assert_eq!(format_month_year("2021-03-15"), "March 2021");
        assert_eq!(format_month_year("2021-03-15T10:00:00Z"), "March 2021");
        assert_eq!(format_month_year("2019-11"), "November 2019");
        assert_eq!(format_month_year("2018"), "January 2018");
        assert_eq!(format_month_year("Sep 2020"), "September 2020");
        assert_eq!(format_month_year("present"), "");
        assert_eq!(format_month_year(""), "");
    }

    #[test]
    fn breaks_become_paragraphs() {
        assert_eq!(text_with_breaks("a & b"), "a &amp; b");
        assert_eq!(
            text_with_breaks("one\r\ntwo"),
            format!("one{PARAGRAPH_BREAK}two")
        );
        assert_eq!(text_with_breaks(""), "");
    }
}
