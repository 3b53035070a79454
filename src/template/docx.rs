//! Word (`.docx`) template engine.
//!
//! A `.docx` file is a zip archive of XML parts. The engine renders the main
//! document part and every header and footer with minijinja, and copies all
//! other parts (styles, images, relationships) byte for byte.
//!
//! ## Template syntax
//!
//! ```text
//! {{ candidateIdentification }}
//! {% if is_eq(language, "en") %} … {% endif %}
//! {% for job in experience %} … {% endfor %}
//! {{ job.startDate | month_year }}
//! {{ summary | text_with_breaks }}
//! {% if profile is empty_or_whitespace %} … {% endif %}
//! ```
//!
//! ## Preparing Word XML
//!
//! Word freely splits text into runs, so `{{ name }}` typed by an author can
//! arrive as `{{</w:t></w:r><w:r><w:t>name }}`. Before rendering, every tag
//! is **healed**: markup inside the tag is dropped and entities and smart
//! quotes are turned back into plain characters. Then a paragraph whose only
//! text is one `{% … %}` block tag is replaced by the bare tag, so a loop
//! written on its own line repeats whole paragraphs instead of leaving empty
//! ones behind.
//!
//! Top-level fields whose names start with `$` (the extraction workflow
//! nests everything under `$metadata`) are also exposed without the `$`,
//! and `$name` inside a tag is read as `name`:
//!
//! ```text
//! {{ $metadata.personalInformation.fullName }}
//! ```
//!
//! Values are HTML-escaped on output, which is also valid XML escaping.
//! Missing fields, including lookups through missing parents, render empty.

use crate::error::RenderError;
use crate::template::helpers::{
    format_filename, format_month_year, is_empty_or_whitespace, loosely_equal, text_with_breaks,
};
use crate::template::TemplateEngine;
use minijinja::{AutoEscape, Environment, UndefinedBehavior, Value as TemplateValue};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::io::{Cursor, Read, Write};
use tracing::debug;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Main body part; a template without it is not a Word document.
pub const DOCUMENT_PART: &str = "word/document.xml";

static RE_TEMPLATE_PART: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^word/(document|header\d*|footer\d*)\.xml$").unwrap());

// Opening tag must not be self-closing: Word writes `<w:p w:rsidR=".."/>` for
// blank lines.
static RE_PARAGRAPH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<w:p(?:\s(?:[^>]*[^/>])?)?>.*?</w:p>").unwrap());

static RE_MARKUP: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());

static RE_BLOCK_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)^\{%.*%\}$").unwrap());

static RE_STRUCTURE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)\{\{.*?\}\}|\{%[-+]?\s*(\w+).*?%\}|<[^>]*>").unwrap()
});

static RE_SIGIL_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(^|[^\w"'])\$([A-Za-z_]\w*)"#).unwrap());

/// minijinja-backed engine for Word templates.
pub struct DocxTemplateEngine {
    env: Environment<'static>,
}

impl std::fmt::Debug for DocxTemplateEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocxTemplateEngine").finish_non_exhaustive()
    }
}

impl Default for DocxTemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DocxTemplateEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_auto_escape_callback(|_| AutoEscape::Html);
        env.set_undefined_behavior(UndefinedBehavior::Chainable);
        register_helpers(&mut env);
        Self { env }
    }

    fn render_part(&self, part: &str, source: &str, data: &Value) -> Result<String, RenderError> {
        let prepared = collapse_block_paragraphs(&heal_split_tags(source)?);
        check_block_nesting(part, &prepared)?;
        self.env
            .render_str(&prepared, data)
            .map_err(|e| RenderError::Engine {
                part: part.to_string(),
                source: Box::new(e),
            })
    }
}

impl TemplateEngine for DocxTemplateEngine {
    fn render(&self, template: &[u8], data: &Value) -> Result<Vec<u8>, RenderError> {
        let mut archive = ZipArchive::new(Cursor::new(template))?;
        let data = &expose_sigil_keys(data);
        if !archive.file_names().any(|name| name == DOCUMENT_PART) {
            return Err(RenderError::MalformedTemplate {
                detail: format!("archive has no {DOCUMENT_PART}"),
            });
        }

        let mut writer = ZipWriter::new(Cursor::new(Vec::with_capacity(template.len())));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for index in 0..archive.len() {
            let name = archive.by_index_raw(index)?.name().to_string();
            if !RE_TEMPLATE_PART.is_match(&name) {
                writer.raw_copy_file(archive.by_index_raw(index)?)?;
                continue;
            }

            let mut source = String::new();
            archive
                .by_index(index)?
                .read_to_string(&mut source)
                .map_err(ZipError::from)?;
            let rendered = self.render_part(&name, &source, data)?;
            debug!("Rendered {} ({} → {} bytes)", name, source.len(), rendered.len());

            writer.start_file(name.as_str(), options)?;
            writer.write_all(rendered.as_bytes()).map_err(ZipError::from)?;
        }

        Ok(writer.finish()?.into_inner())
    }
}

// ── Helpers exposed to templates ─────────────────────────────────────────

fn register_helpers(env: &mut Environment<'static>) {
    env.add_function("is_eq", |a: TemplateValue, b: TemplateValue| {
        loosely_equal(&to_json(&a), &to_json(&b))
    });
    env.add_function("is_not_eq", |a: TemplateValue, b: TemplateValue| {
        !loosely_equal(&to_json(&a), &to_json(&b))
    });
    env.add_function("is_blank", |v: TemplateValue| is_blank(&v));
    env.add_test("empty_or_whitespace", |v: TemplateValue| is_blank(&v));

    env.add_filter("format_filename", |v: TemplateValue| format_filename(&value_text(&v)));
    env.add_filter("month_year", |v: TemplateValue| format_month_year(&value_text(&v)));
    env.add_filter("text_with_breaks", |v: TemplateValue| {
        TemplateValue::from_safe_string(text_with_breaks(&value_text(&v)))
    });
}

/// Copy every top-level `$name` field to `name` unless `name` is taken.
fn expose_sigil_keys(data: &Value) -> Value {
    let Value::Object(fields) = data else {
        return data.clone();
    };
    let mut exposed = fields.clone();
    for (key, value) in fields {
        if let Some(bare) = key.strip_prefix('$') {
            if !bare.is_empty() && !exposed.contains_key(bare) {
                exposed.insert(bare.to_string(), value.clone());
            }
        }
    }
    Value::Object(exposed)
}

fn to_json(value: &TemplateValue) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn value_text(value: &TemplateValue) -> String {
    if value.is_undefined() || value.is_none() {
        String::new()
    } else if let Some(s) = value.as_str() {
        s.to_string()
    } else {
        value.to_string()
    }
}

/// Missing, falsy, or a whitespace-only string.
fn is_blank(value: &TemplateValue) -> bool {
    if value.is_undefined() || value.is_none() {
        return true;
    }
    match value.as_str() {
        Some(s) => is_empty_or_whitespace(Some(s)),
        None => !value.is_true(),
    }
}

// ── XML preparation ──────────────────────────────────────────────────────

/// Rejoin `{{ … }}` and `{% … %}` tags that Word split across runs.
fn heal_split_tags(xml: &str) -> Result<String, RenderError> {
    // Character data only, with byte offsets into `xml`.
    let mut text: Vec<(usize, char)> = Vec::new();
    let mut in_markup = false;
    for (offset, c) in xml.char_indices() {
        match c {
            '<' => in_markup = true,
            '>' if in_markup => in_markup = false,
            _ if !in_markup => text.push((offset, c)),
            _ => {}
        }
    }

    let mut out = String::with_capacity(xml.len());
    let mut copied = 0;
    let mut k = 0;
    while k + 1 < text.len() {
        let (start, c) = text[k];
        let opener = text[k + 1].1;
        if c != '{' || (opener != '{' && opener != '%') {
            k += 1;
            continue;
        }

        let closer = if opener == '{' { '}' } else { '%' };
        let mut j = k + 2;
        let end = loop {
            if j + 1 >= text.len() {
                return Err(RenderError::MalformedTemplate {
                    detail: format!("unclosed '{{{opener}' tag"),
                });
            }
            if text[j].1 == closer && text[j + 1].1 == '}' {
                break j + 1;
            }
            j += 1;
        };

        let raw: String = text[k..=end].iter().map(|&(_, c)| c).collect();
        let (end_offset, end_char) = text[end];
        out.push_str(&xml[copied..start]);
        out.push_str(&normalize_tag(&raw));
        copied = end_offset + end_char.len_utf8();
        k = end + 1;
    }
    out.push_str(&xml[copied..]);
    Ok(out)
}

fn normalize_tag(tag: &str) -> String {
    let tag = RE_SIGIL_NAME.replace_all(tag, "$1$2");
    tag.replace(['\u{201C}', '\u{201D}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Replace every paragraph whose only text is one block tag by that tag.
fn collapse_block_paragraphs(xml: &str) -> String {
    RE_PARAGRAPH
        .replace_all(xml, |caps: &regex::Captures<'_>| {
            let paragraph = &caps[0];
            // Text boxes nest paragraphs; leave those alone.
            let nested = paragraph[4..].contains("<w:p>") || paragraph[4..].contains("<w:p ");
            let text = RE_MARKUP.replace_all(paragraph, "");
            let text = text.trim();
            if !nested && RE_BLOCK_TAG.is_match(text) && text.matches("{%").count() == 1 {
                text.to_string()
            } else {
                paragraph.to_string()
            }
        })
        .into_owned()
}

/// Every `{% … %}` block must open, branch and close at the same XML nesting
/// level. Otherwise rendering repeats or drops half of an element.
fn check_block_nesting(part: &str, xml: &str) -> Result<(), RenderError> {
    let mut elements: Vec<&str> = Vec::new();
    let mut blocks: Vec<(&str, Vec<&str>)> = Vec::new();

    for caps in RE_STRUCTURE.captures_iter(xml) {
        let token = caps.get(0).map_or("", |m| m.as_str());

        if let Some(keyword) = caps.get(1).map(|m| m.as_str()) {
            let opened_at = match keyword {
                "if" | "for" | "with" | "filter" | "macro" | "call" | "block" | "autoescape"
                | "raw" => {
                    blocks.push((token, elements.clone()));
                    continue;
                }
                "set" if !token.contains('=') => {
                    blocks.push((token, elements.clone()));
                    continue;
                }
                "elif" | "else" => blocks.last(),
                k if k.starts_with("end") => {
                    let opener = blocks.pop();
                    if let Some((opener, level)) = &opener {
                        if *level != elements {
                            return Err(misplaced_block(part, token, opener));
                        }
                    }
                    continue;
                }
                _ => None,
            };
            if let Some((opener, level)) = opened_at {
                if *level != elements {
                    return Err(misplaced_block(part, token, opener));
                }
            }
        } else if token.starts_with("{{")
            || token.starts_with("<?")
            || token.starts_with("<!")
            || token.ends_with("/>")
        {
            continue;
        } else if let Some(closing) = token.strip_prefix("</") {
            let name = closing.trim_end_matches('>').trim();
            if elements.pop() != Some(name) {
                return Err(RenderError::MalformedTemplate {
                    detail: format!("{part}: unbalanced closing tag '{token}'"),
                });
            }
        } else {
            let inner = token.trim_start_matches('<').trim_end_matches('>');
            elements.push(inner.split_whitespace().next().unwrap_or(""));
        }
    }
    Ok(())
}

fn misplaced_block(part: &str, token: &str, opener: &str) -> RenderError {
    RenderError::MalformedTemplate {
        detail: format!(
            "{part}: '{token}' sits at a different paragraph level than '{opener}'; \
             put both on lines of their own or both inside the same paragraph"
        ),
    }
}
