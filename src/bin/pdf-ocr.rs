//! CLI binary for pdf-ocr-pipeline.
//!
//! A thin shim over the library crate: it layers flags, environment variables
//! and the settings file into `OcrConfig` / `LlmConfig`, resolves the external
//! tools from `PATH`, and prints JSON records on stdout.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use pdf_ocr_pipeline::output::{
    AnalysisOutput, FileOutcome, ProcessedOutput, SegmentationOutput,
};
use pdf_ocr_pipeline::pipeline::input::parse_ocr_input;
use pdf_ocr_pipeline::{
    in_input_order, ocr_stream_indexed, prompts, LlmClient, LlmConfig, OcrConfig,
    OcrProgressCallback, Pipeline, PipelineConfig, ProgressCallback, ProviderBackend, Settings,
    ToolSet,
};
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// One bar over the files of a batch, with a log line per finished file.
/// Files finish out of order when several run concurrently.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("OCR");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }
}

impl OcrProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_files: usize) {
        self.bar.set_length(total_files as u64);
        self.bar.reset_eta();
    }

    fn on_page_recognized(&self, file: &str, page: usize, total_pages: usize, _text_len: usize) {
        self.bar.set_message(format!("{file} page {page}/{total_pages}"));
    }

    fn on_document_complete(&self, file: &str, text_len: usize) {
        self.bar.println(format!(
            "  {} {}  {}",
            green("✓"),
            file,
            dim(&format!("{text_len} chars")),
        ));
        self.bar.inc(1);
    }

    fn on_document_error(&self, file: &str, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        // Keep the log line to one row; the JSON output has the full message.
        let msg = match error.lines().next() {
            Some(line) if line.chars().count() > 100 => {
                format!("{}…", line.chars().take(99).collect::<String>())
            }
            Some(line) => line.to_string(),
            None => String::new(),
        };
        self.bar
            .println(format!("  {} {}  {}", red("✗"), file, red(&msg)));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_files: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = self.errors.load(Ordering::SeqCst);
        if failed == 0 {
            eprintln!(
                "{} {} file(s) processed",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} file(s) processed  ({} failed)",
                red("✘"),
                bold(&success_count.to_string()),
                total_files,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # OCR two scans
  pdf-ocr ocr deed.pdf mortgage.pdf > ocr.json

  # Segment the OCR output into recorded instruments
  pdf-ocr ocr bundle.pdf | pdf-ocr segment --pretty

  # Free-form analysis with a custom instruction
  pdf-ocr ocr deed.pdf | pdf-ocr summarize --prompt "List grantors and grantees"

  # OCR and segment in one step, Spanish + English text
  pdf-ocr process -l eng+spa --segment bundle.pdf

  # Use another provider through edgequake-llm
  pdf-ocr --provider anthropic --model claude-sonnet-4-20250514 segment < ocr.json

SETTINGS FILE (first one found wins; flags and env vars override it):
  $XDG_CONFIG_HOME/pdf_ocr_pipeline/config.json
  ~/.config/pdf_ocr_pipeline/config.json
  ~/.pdf_ocr_pipeline/config.json
  ./pdf_ocr_pipeline_config.json

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY      API key for the OpenAI-compatible endpoint
  OPENAI_BASE_URL     Endpoint root (default https://api.openai.com/v1)
  PDF_OCR_MODEL       Model ID (default gpt-4o)
  PDF_OCR_CONFIG      Explicit settings file
  RUST_LOG            Log filter, overrides -v / -q

REQUIREMENTS:
  pdftoppm (poppler-utils) and tesseract (tesseract-ocr) on PATH.
"#;

/// OCR scanned PDFs and segment the text into documents with an LLM.
#[derive(Parser, Debug)]
#[command(
    name = "pdf-ocr",
    version,
    about = "OCR scanned PDFs with pdftoppm + tesseract and segment them with an LLM",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PDF_OCR_VERBOSE", conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress everything on stderr except errors.
    #[arg(short, long, global = true, env = "PDF_OCR_QUIET")]
    quiet: bool,

    /// Settings file to use instead of the standard locations.
    #[arg(long, global = true, env = "PDF_OCR_CONFIG")]
    config: Option<PathBuf>,

    /// API key for the OpenAI-compatible endpoint.
    #[arg(long, global = true, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// OpenAI-compatible API root.
    #[arg(long, global = true, env = "OPENAI_BASE_URL")]
    base_url: Option<String>,

    /// Model ID.
    #[arg(long, global = true, env = "PDF_OCR_MODEL")]
    model: Option<String>,

    /// Use an edgequake-llm provider (anthropic, gemini, ollama, …) instead
    /// of the OpenAI-compatible endpoint.
    #[arg(long, global = true, env = "PDF_OCR_PROVIDER")]
    provider: Option<String>,

    /// LLM call timeout in seconds.
    #[arg(long, global = true, env = "PDF_OCR_LLM_TIMEOUT")]
    llm_timeout: Option<u64>,

    /// Indent JSON output.
    #[arg(long, global = true)]
    pretty: bool,

    /// Disable the progress bar.
    #[arg(long, global = true, env = "PDF_OCR_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// OCR PDFs and print `[{file, ocr_text}]`.
    Ocr {
        #[arg(required = true)]
        pdfs: Vec<PathBuf>,

        #[command(flatten)]
        ocr: OcrArgs,

        /// Stop at the first failing PDF and exit 1.
        #[arg(long)]
        fail_fast: bool,
    },

    /// Analyze OCR text read from stdin; print `[{file, analysis}]`.
    Summarize {
        /// Analysis instruction (overrides the settings file).
        #[arg(long)]
        prompt: Option<String>,
    },

    /// Segment OCR text read from stdin; print `[{file, segmentation}]`.
    Segment,

    /// OCR PDFs and optionally segment them in one step.
    Process {
        #[arg(required = true)]
        pdfs: Vec<PathBuf>,

        #[command(flatten)]
        ocr: OcrArgs,

        /// Also segment each PDF's text.
        #[arg(long)]
        segment: bool,
    },

    /// Print the segmentation prompt in effect.
    Prompt,
}

#[derive(Args, Debug, Clone)]
struct OcrArgs {
    /// Rendering DPI (36–1200). Default: 300.
    #[arg(long, env = "PDF_OCR_DPI", value_parser = clap::value_parser!(u32).range(36..=1200))]
    dpi: Option<u32>,

    /// Tesseract language, e.g. eng or eng+deu. Default: eng.
    #[arg(short, long, env = "PDF_OCR_LANG")]
    lang: Option<String>,

    /// Number of PDFs processed at once. Default: 4.
    #[arg(short, long, env = "PDF_OCR_CONCURRENCY")]
    concurrency: Option<usize>,

    /// Per-command timeout for pdftoppm / tesseract in seconds. Default: 300.
    #[arg(long, env = "PDF_OCR_TOOL_TIMEOUT")]
    tool_timeout: Option<u64>,

    /// Keep tesseract's raw output (form feeds, trailing spaces).
    #[arg(long)]
    raw_text: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Dropping `run` on Ctrl-C kills any running pdftoppm/tesseract
    // (kill_on_drop) and removes scratch directories.
    tokio::select! {
        result = run(cli) => match result {
            Ok(code) => code,
            Err(e) => {
                eprintln!("{} {e:#}", red("error:"));
                ExitCode::from(1)
            }
        },
        Ok(()) = tokio::signal::ctrl_c() => {
            eprintln!("{}", red("interrupted"));
            ExitCode::from(130)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    // Settings are read before logging is set up because they may turn on
    // verbose output; a load error is reported after.
    let settings = load_settings(&cli);
    let verbose = cli.verbose
        || settings
            .as_ref()
            .ok()
            .and_then(|s| s.verbose)
            .unwrap_or(false);

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let settings = settings?;
    let pretty = cli.pretty || settings.pretty.unwrap_or(false);
    let runs_ocr = matches!(cli.command, Command::Ocr { .. } | Command::Process { .. });
    let progress = (runs_ocr && !cli.quiet && !cli.no_progress).then(CliProgressCallback::new);

    match &cli.command {
        Command::Ocr {
            pdfs,
            ocr,
            fail_fast,
        } => {
            let pipeline = build_pipeline(&cli, &settings, Some(ocr), false, progress.clone())?;
            if *fail_fast {
                // The stream API does not report batch events itself.
                if let Some(ref p) = progress {
                    p.on_batch_start(pdfs.len());
                }
                let mut indexed = Vec::with_capacity(pdfs.len());
                let mut s = ocr_stream_indexed(&pipeline, pdfs.clone());
                while let Some((index, outcome)) = s.next().await {
                    if let FileOutcome::Err { file, error } = &outcome {
                        if let Some(ref p) = progress {
                            p.on_batch_complete(pdfs.len(), indexed.len());
                        }
                        anyhow::bail!("{file}: {error}");
                    }
                    indexed.push((index, outcome));
                }
                if let Some(ref p) = progress {
                    p.on_batch_complete(pdfs.len(), indexed.len());
                }
                emit(&in_input_order(indexed), pretty)?;
            } else {
                let outcomes = pipeline.ocr_many(pdfs).await;
                emit(&outcomes, pretty)?;
            }
        }

        Command::Summarize { prompt } => {
            let pipeline = build_pipeline(&cli, &settings, None, true, None)?;
            let records = read_records(tokio::io::stdin()).await?;
            let concurrency = pipeline.config().ocr.concurrency;
            let outcomes: Vec<FileOutcome<AnalysisOutput>> = stream::iter(records)
                .map(|record| {
                    let pipeline = &pipeline;
                    let prompt = prompt.as_deref();
                    async move {
                        match pipeline.analyze(&record.ocr_text, prompt).await {
                            Ok(analysis) => FileOutcome::Ok {
                                file: record.file,
                                value: AnalysisOutput { analysis },
                            },
                            Err(e) => FileOutcome::Err {
                                file: record.file,
                                error: e.to_string(),
                            },
                        }
                    }
                })
                .buffered(concurrency)
                .collect()
                .await;
            emit(&outcomes, pretty)?;
        }

        Command::Segment => {
            let pipeline = build_pipeline(&cli, &settings, None, true, None)?;
            let records = read_records(tokio::io::stdin()).await?;
            let concurrency = pipeline.config().ocr.concurrency;
            let outcomes: Vec<FileOutcome<SegmentationOutput>> = stream::iter(records)
                .map(|record| {
                    let pipeline = &pipeline;
                    async move {
                        match pipeline.segment(&record.ocr_text).await {
                            Ok(segmentation) => FileOutcome::Ok {
                                file: record.file,
                                value: SegmentationOutput { segmentation },
                            },
                            Err(e) => FileOutcome::Err {
                                file: record.file,
                                error: e.to_string(),
                            },
                        }
                    }
                })
                .buffered(concurrency)
                .collect()
                .await;
            emit(&outcomes, pretty)?;
        }

        Command::Process { pdfs, ocr, segment } => {
            let pipeline =
                build_pipeline(&cli, &settings, Some(ocr), *segment, progress.clone())?;
            let concurrency = pipeline.config().ocr.concurrency;
            if let Some(ref p) = progress {
                p.on_batch_start(pdfs.len());
            }
            let outcomes: Vec<FileOutcome<ProcessedOutput>> = stream::iter(pdfs)
                .map(|pdf| {
                    let pipeline = &pipeline;
                    async move {
                        match pipeline.process_pdf(pdf, *segment).await {
                            Ok(processed) => processed.into(),
                            Err(e) => FileOutcome::Err {
                                file: pdf_ocr_pipeline::output::file_identifier(pdf),
                                error: e.to_string(),
                            },
                        }
                    }
                })
                .buffered(concurrency)
                .collect()
                .await;
            if let Some(ref p) = progress {
                let ok = outcomes.iter().filter(|o| !o.is_err()).count();
                p.on_batch_complete(pdfs.len(), ok);
            }
            emit(&outcomes, pretty)?;
        }

        Command::Prompt => {
            let prompt = settings
                .segment_prompt
                .as_deref()
                .unwrap_or(prompts::DEFAULT_SEGMENT_PROMPT);
            println!("{prompt}");
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Settings from `--config` / `PDF_OCR_CONFIG`, else the first standard
/// location that exists, else defaults.
fn load_settings(cli: &Cli) -> Result<Settings> {
    if let Some(ref path) = cli.config {
        return Settings::load(path).context("Invalid settings file");
    }
    let cwd = std::env::current_dir().context("Cannot determine current directory")?;
    let xdg = std::env::var_os("XDG_CONFIG_HOME").map(PathBuf::from);
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let candidates = Settings::candidate_paths(xdg.as_deref(), home.as_deref(), &cwd);
    Ok(Settings::discover(&candidates)
        .context("Invalid settings file")?
        .map(|(_, settings)| settings)
        .unwrap_or_default())
}

/// Map settings and CLI args to a ready pipeline.
///
/// `ocr` is `Some` for commands that run the OCR tools; `with_llm` for
/// commands that talk to the model.
fn build_pipeline(
    cli: &Cli,
    settings: &Settings,
    ocr: Option<&OcrArgs>,
    with_llm: bool,
    progress: Option<Arc<CliProgressCallback>>,
) -> Result<Pipeline> {
    // ── OCR config: settings first, then flags/env ───────────────────────
    let mut ocr_builder = settings.apply_ocr(OcrConfig::builder());
    if let Some(args) = ocr {
        if let Some(dpi) = args.dpi {
            ocr_builder = ocr_builder.dpi(dpi);
        }
        if let Some(ref lang) = args.lang {
            ocr_builder = ocr_builder.language(lang.clone());
        }
        if let Some(n) = args.concurrency {
            ocr_builder = ocr_builder.concurrency(n);
        }
        if let Some(secs) = args.tool_timeout {
            ocr_builder = ocr_builder.tool_timeout_secs(secs);
        }
        if args.raw_text {
            ocr_builder = ocr_builder.normalize_text(false);
        }
    }
    let ocr_config = ocr_builder.build().context("Invalid OCR configuration")?;

    // ── LLM config ───────────────────────────────────────────────────────
    let mut llm_builder = settings.apply_llm(LlmConfig::builder());
    if let Some(ref key) = cli.api_key {
        llm_builder = llm_builder.api_key(key.clone());
    }
    if let Some(ref url) = cli.base_url {
        llm_builder = llm_builder.base_url(url.clone());
    }
    if let Some(ref model) = cli.model {
        llm_builder = llm_builder.model(model.clone());
    }
    if let Some(secs) = cli.llm_timeout {
        llm_builder = llm_builder.timeout_secs(secs);
    }
    let llm_config = llm_builder.build().context("Invalid LLM configuration")?;

    let client = if with_llm {
        Some(build_llm_client(cli, &llm_config)?)
    } else {
        None
    };

    let mut pipeline = Pipeline::new(PipelineConfig::new(ocr_config, llm_config));

    if ocr.is_some() {
        let search_path = std::env::var_os("PATH");
        let tools = ToolSet::resolve(&pipeline.config().ocr, search_path.as_deref())?;
        pipeline = pipeline.with_tools(tools);
    }
    if let Some(client) = client {
        pipeline = pipeline.with_llm(client);
    }
    if let Some(cb) = progress {
        let cb: ProgressCallback = cb;
        pipeline = pipeline.with_progress(cb);
    }
    Ok(pipeline)
}

fn build_llm_client(cli: &Cli, config: &LlmConfig) -> Result<LlmClient> {
    if let Some(ref name) = cli.provider {
        let backend = ProviderBackend::from_name(name, &config.model)?;
        return Ok(LlmClient::new(Arc::new(backend))
            .with_sampling(config.temperature, config.max_tokens));
    }
    if config.api_key.is_none() && config.base_url == pdf_ocr_pipeline::config::DEFAULT_BASE_URL {
        anyhow::bail!(
            "No API key configured.\n\
             Set OPENAI_API_KEY, pass --api-key, or add \"api_key\" to the settings file."
        );
    }
    Ok(LlmClient::from_config(config)?)
}

/// Read piped OCR records without blocking the runtime, so Ctrl-C still
/// wins while waiting on a terminal.
async fn read_records<R: AsyncRead + Unpin>(
    mut input: R,
) -> Result<Vec<pdf_ocr_pipeline::OcrResult>> {
    let mut raw = String::new();
    input
        .read_to_string(&mut raw)
        .await
        .context("Failed to read stdin")?;
    Ok(parse_ocr_input(&raw)?)
}

fn emit<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .context("Failed to serialise output")?;
    println!("{json}");
    Ok(())
}
