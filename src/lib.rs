//! # pdf-ocr-pipeline
//!
//! OCR scanned PDFs with `pdftoppm` + `tesseract`, then let an LLM split the
//! text into the individual documents it contains.
//!
//! ## Why this crate?
//!
//! County-recorder scans bundle several instruments (deeds, mortgages,
//! releases, plats) into one PDF with no text layer. This crate turns such a
//! PDF into page-tagged text and asks a model where each instrument starts
//! and ends, checking that the answer covers every page exactly once before
//! handing it back.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input     check path and %PDF magic
//!  ├─ 2. Probe     does pdftoppm stream to stdout? (once per process)
//!  ├─ 3. Raster    pdftoppm → PNM frames on stdout, or page-N.ppm files
//!  ├─ 4. Recognise tesseract, page by page, in order
//!  ├─ 5. Tag       <page number N> … </page number N>
//!  ├─ 6. LLM       one chat-completions round trip
//!  └─ 7. Validate  one <json> block, pages partition 1..=total_pages
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf_ocr_pipeline::{LlmClient, LlmConfig, OcrConfig, Pipeline, PipelineConfig, ToolSet};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let ocr = OcrConfig::builder().dpi(300).language("eng").build()?;
//!     let llm = LlmConfig::builder().api_key("sk-live-…").model("gpt-4o").build()?;
//!     let tools = ToolSet::resolve(&ocr, std::env::var_os("PATH").as_deref())?;
//!     let client = LlmClient::from_config(&llm)?;
//!
//!     let pipeline = Pipeline::new(PipelineConfig::new(ocr, llm))
//!         .with_tools(tools)
//!         .with_llm(client);
//!
//!     let processed = pipeline.process_pdf(Path::new("scan.pdf"), true).await?;
//!     for doc in processed.segmentation.iter().flat_map(|s| &s.documents) {
//!         println!("{:?}: pages {}-{}", doc.title, doc.pages.start(), doc.pages.end());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf-ocr` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pdf-ocr-pipeline = { version = "0.2", default-features = false }
//! ```
//!
//! The library never reads environment variables or configuration files on
//! its own; everything arrives through [`OcrConfig`], [`LlmConfig`] and the
//! search path handed to [`ToolSet::resolve`].

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod prompts;
pub mod settings;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{LlmConfig, LlmConfigBuilder, OcrConfig, OcrConfigBuilder, PipelineConfig};
pub use error::{FailureReason, OcrStage, PipelineError};
pub use output::{
    FileOutcome, OcrResult, PageRange, ProcessedPdf, SegmentationDocument, SegmentationResult,
};
pub use pipeline::capability::{CapabilityResolver, StreamingCapability};
pub use pipeline::llm::{LlmBackend, LlmClient, LlmRequest, OpenAiCompatibleBackend, ProviderBackend};
pub use pipeline::ocr::OcrEngine;
pub use pipeline::runner::{ProcessRunner, Tool, ToolSet};
pub use pipeline::validate::{parse_analysis, validate_segmentation};
pub use process::{process_pdf_sync, Pipeline};
pub use progress::{NoopProgressCallback, OcrProgressCallback, ProgressCallback};
pub use settings::Settings;
pub use stream::{
    in_input_order, ocr_stream, ocr_stream_indexed, IndexedOcrOutcomeStream, OcrOutcomeStream,
};
