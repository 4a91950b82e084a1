//! CLI binary for edgequake-acord.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig`, writes the run's artifacts and prints a summary.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_acord::pipeline::render;
use edgequake_acord::{
    extract_to_dir, load_ground_truth, DocumentInput, ExtractionConfig, ExtractionProgressCallback,
    JsonBlocksProvider, PassKind, ProgressCallback, SchemaRegistry,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
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

/// Spinner plus one log line per finished request.
///
/// The number of requests is only known as passes run, so the bar counts
/// requests without a fixed length.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  ⏱ {elapsed}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Indexing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }
}

fn shorten(msg: &str, max: usize) -> String {
    if msg.chars().count() > max {
        let head: String = msg.chars().take(max - 1).collect();
        format!("{head}\u{2026}")
    } else {
        msg.to_string()
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_document_start(&self, document: &str, form_type: &str, schema_fields: usize) {
        self.bar.set_prefix("Extracting");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("{document}: ACORD {form_type}, {schema_fields} schema fields"))
        ));
    }

    fn on_pass_start(&self, pass: PassKind, label: &str, requested: usize) {
        self.bar.set_message(format!("{pass} {label} ({requested} fields)"));
    }

    fn on_pass_complete(&self, pass: PassKind, label: &str, accepted: usize) {
        self.bar.println(format!(
            "  {} {:<10} {:<24} {}",
            green("✓"),
            pass.as_str(),
            label,
            dim(&format!("+{accepted}")),
        ));
        self.bar.inc(1);
    }

    fn on_pass_error(&self, pass: PassKind, label: &str, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        self.bar.println(format!(
            "  {} {:<10} {:<24} {}",
            red("✗"),
            pass.as_str(),
            label,
            red(&shorten(error, 80)),
        ));
        self.bar.inc(1);
    }

    fn on_document_complete(&self, document: &str, extracted: usize, schema_fields: usize) {
        self.bar.finish_and_clear();
        let errors = self.errors.load(Ordering::SeqCst);
        let mark = if errors == 0 { green("✔") } else { cyan("⚠") };
        eprintln!(
            "{} {}: {}/{} fields{}",
            mark,
            document,
            bold(&extracted.to_string()),
            schema_fields,
            if errors > 0 {
                format!("  ({} failed requests)", red(&errors.to_string()))
            } else {
                String::new()
            }
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Spatial-only run (no API key needed)
  acord-extract --spatial-only acord125_blocks.json

  # Full run, auto-detected provider, artifacts under ./out/acord125
  acord-extract acord125_blocks.json --out out/acord125

  # Score against ground truth
  acord-extract acord125_blocks.json --ground-truth acord125_gt.json

  # Add the vision pass (renders the PDF pages)
  acord-extract acord125_blocks.json --vision --pdf acord125.pdf

  # Only the later passes, a specific model
  acord-extract blocks.json --passes spatial,gap-fill --provider openai --model gpt-4.1

INPUT:
  The OCR dump is JSON: either one array of blocks per page, or
  {"pages": [[...]], "markdown": ["..."]}. A block is
  {text, x_min, y_min, x_max, y_max, confidence?} or {text, bbox: [x0,y0,x1,y1]}.
  --markdown takes a text file with pages separated by form feeds (\f).

ARTIFACTS (written to --out):
  label_value_pairs.json  spatial_preextract.json  sections.json
  fields.json  passes.json  comparison.json (with --ground-truth)

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID

PDF RENDERING:
  --pdf needs libpdfium on the system library path or in the working directory.
"#;

/// Extract ACORD form fields from OCR blocks.
#[derive(Parser, Debug)]
#[command(
    name = "acord-extract",
    version,
    about = "Extract ACORD insurance-form fields from OCR text blocks",
    long_about = "Build a spatial index over positioned OCR blocks, read what the layout gives \
deterministically, then fill the remaining schema fields with a fixed sequence of language-model \
passes. Earlier passes always win; every value is checked against the OCR text.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// OCR block dump (JSON).
    ocr: PathBuf,

    /// Structural text of the pages; pages separated by form feeds.
    #[arg(long)]
    markdown: Option<PathBuf>,

    /// Directory of `<form>.json` schema files.
    #[arg(long, env = "ACORD_SCHEMAS", default_value = "schemas")]
    schemas: PathBuf,

    /// Form number (e.g. 125); detected from the text when omitted.
    #[arg(long)]
    form: Option<String>,

    /// Source PDF, rendered for the vision pass.
    #[arg(long)]
    pdf: Option<PathBuf>,

    /// Ground-truth JSON to score the extraction against.
    #[arg(long)]
    ground_truth: Option<PathBuf>,

    /// Artifact directory. Default: ./output/<ocr file stem>.
    #[arg(short, long, env = "ACORD_OUT")]
    out: Option<PathBuf>,

    /// Skip every model pass; no provider needed.
    #[arg(long)]
    spatial_only: bool,

    /// Run the vision pass (needs --pdf).
    #[arg(long)]
    vision: bool,

    /// Passes to run, in trust order.
    #[arg(long, value_enum, value_delimiter = ',')]
    passes: Vec<PassArg>,

    /// LLM model ID for the text passes.
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Model for the vision pass; defaults to --model.
    #[arg(long)]
    vision_model: Option<String>,

    /// Provider for the vision pass; defaults to --provider.
    #[arg(long)]
    vision_provider: Option<String>,

    /// Max fields per category request.
    #[arg(long, default_value_t = 30)]
    batch_size: usize,

    /// Characters of document context per request.
    #[arg(long, default_value_t = 8000)]
    max_context_chars: usize,

    /// Retries per request on model failure.
    #[arg(long, default_value_t = 2)]
    max_retries: u32,

    /// Per-request model timeout in seconds.
    #[arg(long, default_value_t = 120)]
    api_timeout: u64,

    /// Path to a text file containing a custom system prompt.
    #[arg(long)]
    system_prompt: Option<PathBuf>,

    /// Print the field map as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Disable the progress display.
    #[arg(long)]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum PassArg {
    Spatial,
    Vision,
    Category,
    RowTable,
    GapFill,
}

impl From<PassArg> for PassKind {
    fn from(v: PassArg) -> Self {
        match v {
            PassArg::Spatial => PassKind::Spatial,
            PassArg::Vision => PassKind::Vision,
            PassArg::Category => PassKind::Category,
            PassArg::RowTable => PassKind::RowTable,
            PassArg::GapFill => PassKind::GapFill,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    // The progress display covers per-pass feedback; library logs stay at warn.
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    // ── Load inputs ──────────────────────────────────────────────────────
    let registry = SchemaRegistry::from_dir(&cli.schemas)
        .with_context(|| format!("Failed to load schemas from {}", cli.schemas.display()))?;

    let ocr = JsonBlocksProvider::from_file(&cli.ocr).context("Failed to read OCR dump")?;
    let id = cli
        .ocr
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "document".to_string());

    let mut document = DocumentInput::new(id.clone(), ocr.output().clone());
    if let Some(ref path) = cli.markdown {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read markdown from {}", path.display()))?;
        document.markdown = text.split('\u{c}').map(str::to_string).collect();
    }
    if let Some(ref form) = cli.form {
        document = document.with_form_type(form.clone());
    }
    let file_hint = cli.pdf.as_ref().unwrap_or(&cli.ocr);
    if let Some(name) = file_hint.file_name() {
        document = document.with_file_name(name.to_string_lossy().to_string());
    }

    let ground_truth = match cli.ground_truth {
        Some(ref path) => Some(load_ground_truth(path).context("Failed to read ground truth")?),
        None => None,
    };

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;

    if config.vision {
        match cli.pdf {
            Some(ref pdf) => {
                let pages = render::render_pdf(pdf, config.dpi, config.max_rendered_pixels)
                    .await
                    .context("Failed to render PDF for the vision pass")?;
                document.images = render::encode_pages(&pages)?;
            }
            None => anyhow::bail!("--vision needs --pdf to render page images"),
        }
    }

    // ── Run extraction ───────────────────────────────────────────────────
    let out_dir = cli
        .out
        .clone()
        .unwrap_or_else(|| PathBuf::from("output").join(&id));
    let (output, comparison) = extract_to_dir(&document, &registry, &config, &out_dir, ground_truth.as_ref())
        .await
        .context("Extraction failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&output.values()).context("Failed to serialise fields")?;
        println!("{json}");
    }

    if !cli.quiet {
        let stats = &output.stats;
        eprintln!(
            "{}  {}/{} fields  {} verified  {}ms  →  {}",
            if stats.failed_requests == 0 { green("✔") } else { cyan("⚠") },
            stats.extracted_fields,
            stats.schema_fields,
            stats.verified_fields,
            stats.total_duration_ms,
            bold(&out_dir.display().to_string()),
        );
        let by_source: Vec<String> = stats.by_source.iter().map(|(s, n)| format!("{s}={n}")).collect();
        eprintln!("   {}", dim(&by_source.join("  ")));
        eprintln!(
            "   {} tokens in  /  {} tokens out",
            dim(&stats.total_input_tokens.to_string()),
            dim(&stats.total_output_tokens.to_string()),
        );
        if let Some(report) = comparison {
            eprintln!(
                "   accuracy {}%  exact {}%  coverage {}%  ({} matched, {} partial, {} wrong, {} missing)",
                bold(&format!("{:.2}", report.accuracy)),
                report.exact_match_rate,
                report.coverage,
                report.matched,
                report.partial,
                report.wrong,
                report.missing,
            );
        }
    }

    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .spatial_only(cli.spatial_only)
        .vision(cli.vision)
        .category_batch_size(cli.batch_size)
        .max_context_chars(cli.max_context_chars)
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout);

    if !cli.passes.is_empty() {
        builder = builder.pass_order(cli.passes.iter().map(|&p| p.into()).collect());
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref model) = cli.vision_model {
        builder = builder.vision_model(model.clone());
    }
    if let Some(ref provider) = cli.vision_provider {
        builder = builder.vision_provider_name(provider.clone());
    }
    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
