//! CLI binary for cv-forge.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ForgeConfig` and prints results.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cv_forge::config::{ENV_API_TOKEN, ENV_WORKFLOW_ID};
use cv_forge::{
    convert_to_file, render_curriculum, render_curriculum_base64, write_document, Delivery,
    DocumentSynthesizer, DocxTemplateEngine, ForgeConfig, ForgeError, ProcessProgressCallback,
    ProgressCallback, RunState, TemplateEngine, UploadedInput,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::{json, Value};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal spinner that follows the run through submission, polling and
/// rendering.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(style);
        bar.set_prefix("Submitting");
        bar.set_message("Uploading CV…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self { bar })
    }

    fn clear(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProcessProgressCallback for CliProgressCallback {
    fn on_submitted(&self, run_id: &str) {
        self.bar.println(format!("{} Workflow run {}", cyan("◆"), bold(run_id)));
        self.bar.set_prefix("Processing");
        self.bar.set_message("waiting for first status…");
    }

    fn on_poll(&self, attempt: u32, max_attempts: u32, status: &str) {
        self.bar
            .set_message(format!("{status}  {}", dim(&format!("poll {attempt}/{max_attempts}"))));
    }

    fn on_run_finished(&self, state: &RunState) {
        let summary = format!("Run {} after {} polls", state.label(), state.attempts());
        let line = match state {
            RunState::Completed { .. } => format!("  {} {summary}", green("✓")),
            RunState::Failed { detail, .. } => format!("  {} {summary}: {}", red("✗"), red(detail)),
            RunState::TimedOut { .. } => format!("  {} {summary}", red("✗")),
        };
        self.bar.println(line);
    }

    fn on_rendering(&self, file_name: &str) {
        self.bar.set_prefix("Rendering");
        self.bar.set_message(file_name.to_string());
    }

    fn on_delivered(&self, _file_name: &str, _size: usize) {
        self.clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Process a CV, write the Word document into ./out
  cvforge process jane_doe.pdf -o out

  # Machine-readable result (errors too)
  cvforge --json process jane_doe.pdf

  # Re-render an edited record without calling the workflow
  cvforge render curriculum.json --id AW-1024 -o out

  # Same, as base64 JSON on stdout
  cvforge render curriculum.json --id AW-1024 --base64

ENVIRONMENT VARIABLES:
  NOXUS_WORKFLOW_ID            Workflow to run (required for `process`)
  NOXUS_API_TOKEN              API token sent as X-API-KEY (required for `process`)
  CVFORGE_API_BASE_URL         Workflow API base URL
  CVFORGE_FILE_BASE_URL        Base URL of download links
  CVFORGE_INPUT_FIELD          Workflow input field name (default: CV)
  CVFORGE_POLL_INTERVAL_SECS   Seconds between status checks (default: 5)
  CVFORGE_MAX_ATTEMPTS         Status checks before giving up (default: 60)
  CVFORGE_MAX_FILE_SIZE        Upload limit in bytes (default: 10 MiB)
  CVFORGE_TEMPLATE             Word template (default: templates/AW_cv_template.docx)
  RUST_LOG                     Log filter, overrides --verbose/--quiet

  A .env file in the working directory is loaded first.
"#;

#[derive(Parser, Debug)]
#[command(
    name = "cvforge",
    version,
    about = "Turn CVs into branded Word documents through a remote extraction workflow",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Word template to render records into.
    #[arg(long, global = true, env = "CVFORGE_TEMPLATE")]
    template: Option<PathBuf>,

    /// Print results and errors as JSON on stdout.
    #[arg(long, global = true, env = "CVFORGE_JSON")]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, global = true, env = "CVFORGE_NO_PROGRESS")]
    no_progress: bool,

    /// Debug-level logs.
    #[arg(short, long, global = true, env = "CVFORGE_VERBOSE")]
    verbose: bool,

    /// Errors only.
    #[arg(short, long, global = true, env = "CVFORGE_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send a CV through the extraction workflow and deliver the result.
    Process {
        /// CV to process (.pdf, .doc or .docx).
        input: PathBuf,

        /// Directory for the generated document.
        #[arg(short, long, env = "CVFORGE_OUTPUT_DIR", default_value = ".")]
        output: PathBuf,

        #[arg(long, env = ENV_WORKFLOW_ID, hide_env_values = true)]
        workflow_id: Option<String>,

        #[arg(long, env = ENV_API_TOKEN, hide_env_values = true)]
        api_token: Option<String>,

        /// Seconds between status checks.
        #[arg(long)]
        poll_interval: Option<u64>,

        /// Status checks before giving up.
        #[arg(long)]
        max_attempts: Option<u32>,
    },

    /// Render a curriculum record (JSON file) straight into the template.
    Render {
        /// JSON file holding the curriculum record.
        curriculum: PathBuf,

        /// Candidate identification exposed to the template.
        #[arg(long = "id")]
        candidate_id: String,

        /// Directory for the generated document.
        #[arg(short, long, env = "CVFORGE_OUTPUT_DIR", default_value = ".")]
        output: PathBuf,

        /// Print `{base64, candidateIdentification}` instead of writing a file.
        #[arg(long)]
        base64: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Missing .env is fine; real environment variables win anyway.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs while the spinner is active.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let result = run(&cli, show_progress).await;

    if let Err(err) = &result {
        if cli.json {
            let report = match err.downcast_ref::<ForgeError>() {
                Some(forge) => serde_json::to_value(forge.report()),
                None => Ok(json!({
                    "success": false,
                    "message": "An unexpected error occurred",
                    "errorType": "UNKNOWN_ERROR",
                    "details": format!("{err:#}"),
                })),
            }
            .context("Failed to serialise error report")?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            std::process::exit(1);
        }
    }
    result
}

async fn run(cli: &Cli, show_progress: bool) -> Result<()> {
    let mut config = ForgeConfig::from_env().context("Invalid configuration")?;
    if let Some(template) = &cli.template {
        config.template_path = template.clone();
    }

    // The engine is built once and shared by every render.
    let engine: Arc<dyn TemplateEngine> = Arc::new(DocxTemplateEngine::new());
    let synthesizer = DocumentSynthesizer::from_config(engine, &config);

    match &cli.command {
        Command::Process {
            input,
            output,
            workflow_id,
            api_token,
            poll_interval,
            max_attempts,
        } => {
            if let Some(id) = workflow_id {
                config.workflow_id = Some(id.clone());
            }
            if let Some(token) = api_token {
                config.api_token = Some(token.clone());
            }
            if let Some(secs) = poll_interval {
                config.poll_interval = Duration::from_secs(*secs);
            }
            if let Some(n) = max_attempts {
                config.max_attempts = (*n).max(1);
            }

            let spinner = show_progress.then(CliProgressCallback::new);
            config.progress_callback = spinner.clone().map(|cb| cb as ProgressCallback);

            let upload = UploadedInput::from_path(input)
                .await
                .with_context(|| format!("Failed to read {}", input.display()))?;

            let result = convert_to_file(&upload, output, &config, &synthesizer).await;
            if let Some(cb) = &spinner {
                cb.clear();
            }
            let (processed, written) = result.context("Processing failed")?;

            match (&processed.delivery, written) {
                (Delivery::Link(link), _) => {
                    if cli.json {
                        println!("{}", serde_json::to_string_pretty(link)?);
                    } else {
                        println!("{}", link.download_url);
                        if !cli.quiet {
                            eprintln!("{} Stored remotely as {}", green("✔"), bold(&link.file_name));
                        }
                    }
                }
                (Delivery::Document(doc), path) => {
                    let path = path.context("Document was not written")?;
                    if cli.json {
                        let summary = json!({
                            "success": true,
                            "fileName": doc.filename,
                            "path": path,
                            "contentType": doc.content_type,
                            "size": doc.content_length(),
                            "stats": processed.stats,
                        });
                        println!("{}", serde_json::to_string_pretty(&summary)?);
                    } else if !cli.quiet {
                        eprintln!(
                            "{}  {} polls  {}ms  →  {}",
                            green("✔"),
                            processed.stats.attempts,
                            processed.stats.total_duration_ms,
                            bold(&path.display().to_string()),
                        );
                    }
                }
            }
        }

        Command::Render {
            curriculum,
            candidate_id,
            output,
            base64,
        } => {
            let raw = tokio::fs::read_to_string(curriculum)
                .await
                .with_context(|| format!("Failed to read {}", curriculum.display()))?;
            // Let the library report malformed JSON in its own terms.
            let record = serde_json::from_str::<Value>(&raw).unwrap_or(Value::String(raw));

            if *base64 {
                let rendered = render_curriculum_base64(candidate_id, &record, &synthesizer)
                    .await
                    .context("Rendering failed")?;
                println!("{}", serde_json::to_string(&rendered)?);
            } else {
                let doc = render_curriculum(candidate_id, &record, &synthesizer)
                    .await
                    .context("Rendering failed")?;
                let path = write_document(&doc, output)
                    .await
                    .context("Failed to write document")?;
                if cli.json {
                    let summary = json!({
                        "success": true,
                        "fileName": doc.filename,
                        "path": path,
                        "size": doc.content_length(),
                    });
                    println!("{}", serde_json::to_string_pretty(&summary)?);
                } else if !cli.quiet {
                    eprintln!(
                        "{}  {}  →  {}",
                        green("✔"),
                        dim(&format!("{} bytes", doc.content_length())),
                        bold(&path.display().to_string()),
                    );
                }
            }
        }
    }

    Ok(())
}
