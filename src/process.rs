//! Pipeline orchestration: OCR, segmentation and analysis entry points.
//!
//! A [`Pipeline`] bundles the OCR engine, the LLM client and the
//! configuration they share. Each PDF runs through its own sequential chain
//!
//! ```text
//! OCR engine ──▶ LLM client ──▶ response validator
//! ```
//!
//! and several PDFs run concurrently up to `OcrConfig::concurrency`. The only
//! state shared between those chains is the streaming-capability cache,
//! which resolves once and is read-only afterwards.
//!
//! Either half may be left out: a pipeline built without tools can still
//! segment text read from stdin, and one built without an LLM client can
//! still OCR.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::output::{
    file_identifier, FileOutcome, OcrResult, OcrTextOutput, ProcessedPdf, SegmentationResult,
};
use crate::pipeline::llm::LlmClient;
use crate::pipeline::ocr::{count_pages, OcrEngine};
use crate::pipeline::runner::ToolSet;
use crate::pipeline::validate::{parse_analysis, validate_segmentation};
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::prompts;
use crate::stream::in_input_order;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// OCR + LLM pipeline. Cheap to clone; clones share the capability cache.
#[derive(Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    engine: Option<OcrEngine>,
    llm: Option<LlmClient>,
    progress: ProgressCallback,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("engine", &self.engine.is_some())
            .field("llm", &self.llm)
            .finish()
    }
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            engine: None,
            llm: None,
            progress: Arc::new(NoopProgressCallback),
        }
    }

    /// Build the OCR engine from already-resolved tools.
    pub fn with_tools(mut self, tools: ToolSet) -> Self {
        self.engine = Some(OcrEngine::new(self.config.ocr.clone(), tools));
        self
    }

    /// Use a pre-built engine (e.g. one sharing a capability resolver).
    pub fn with_ocr_engine(mut self, engine: OcrEngine) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn with_llm(mut self, client: LlmClient) -> Self {
        self.llm = Some(client);
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn ocr_engine(&self) -> Option<&OcrEngine> {
        self.engine.as_ref()
    }

    fn engine(&self) -> Result<&OcrEngine, PipelineError> {
        self.engine.as_ref().ok_or_else(|| {
            PipelineError::InvalidConfig("OCR tools were not configured for this pipeline".into())
        })
    }

    fn llm(&self) -> Result<&LlmClient, PipelineError> {
        self.llm.as_ref().ok_or_else(|| {
            PipelineError::InvalidConfig("no LLM client was configured for this pipeline".into())
        })
    }

    // ── OCR ──────────────────────────────────────────────────────────────

    /// OCR one PDF.
    pub async fn ocr(&self, pdf: &Path) -> Result<OcrResult, PipelineError> {
        let file = file_identifier(pdf);
        match self
            .engine()?
            .ocr_file_with_progress(pdf, self.progress.as_ref())
            .await
        {
            Ok(result) => {
                self.progress
                    .on_document_complete(&file, result.ocr_text.len());
                Ok(result)
            }
            Err(e) => {
                self.progress.on_document_error(&file, &e.to_string());
                Err(e)
            }
        }
    }

    /// OCR several PDFs concurrently.
    ///
    /// Outcomes are returned in input order. A failing file becomes a
    /// `{file, error}` record and does not stop the others.
    pub async fn ocr_many(&self, pdfs: &[PathBuf]) -> Vec<FileOutcome<OcrTextOutput>> {
        let start = Instant::now();
        let total = pdfs.len();
        self.progress.on_batch_start(total);

        let indexed: Vec<(usize, FileOutcome<OcrTextOutput>)> =
            stream::iter(pdfs.iter().enumerate().map(|(i, pdf)| async move {
                (i, self.ocr_outcome(pdf).await)
            }))
            .buffer_unordered(self.config.ocr.concurrency)
            .collect()
            .await;
        let outcomes = in_input_order(indexed);

        let success = outcomes.iter().filter(|o| !o.is_err()).count();
        self.progress.on_batch_complete(total, success);
        info!(
            "OCR batch complete: {}/{} file(s) in {:.1}s",
            success,
            total,
            start.elapsed().as_secs_f64()
        );
        outcomes
    }

    pub(crate) async fn ocr_outcome(&self, pdf: &Path) -> FileOutcome<OcrTextOutput> {
        match self.ocr(pdf).await {
            Ok(result) => result.into(),
            Err(e) => {
                warn!("OCR failed for {}: {}", pdf.display(), e);
                FileOutcome::Err {
                    file: file_identifier(pdf),
                    error: e.to_string(),
                }
            }
        }
    }

    // ── LLM ──────────────────────────────────────────────────────────────

    /// Split OCR text into documents.
    ///
    /// Blank text yields an empty result without contacting the model. When
    /// the text carries page tags their count must match the model's
    /// `total_pages`.
    pub async fn segment(&self, text: &str) -> Result<SegmentationResult, PipelineError> {
        if text.trim().is_empty() {
            debug!("Segmentation skipped: empty text");
            return Ok(SegmentationResult::empty());
        }
        let llm_config = &self.config.llm;
        let template = llm_config
            .segment_prompt
            .as_deref()
            .unwrap_or(prompts::DEFAULT_SEGMENT_PROMPT);
        let expected = match count_pages(text) {
            0 => None,
            n => Some(u32::try_from(n).map_err(|_| {
                PipelineError::InvalidInput(format!("{n} pages is more than supported"))
            })?),
        };

        let raw = self
            .llm()?
            .send(
                prompts::SEGMENT_SYSTEM_PROMPT,
                &prompts::segment_user_content(template, text),
                &llm_config.model,
                llm_config.timeout(),
            )
            .await?;
        validate_segmentation(&raw, expected)
    }

    /// Free-form analysis returning the model's JSON object.
    ///
    /// `prompt` overrides the configured analysis instruction.
    pub async fn analyze(
        &self,
        text: &str,
        prompt: Option<&str>,
    ) -> Result<serde_json::Value, PipelineError> {
        if text.trim().is_empty() {
            return Err(PipelineError::InvalidInput("no text to analyze".into()));
        }
        let llm_config = &self.config.llm;
        let instruction = prompt
            .or(llm_config.analysis_prompt.as_deref())
            .unwrap_or(prompts::DEFAULT_ANALYSIS_PROMPT);
        let system = llm_config
            .system_prompt
            .as_deref()
            .unwrap_or(prompts::ANALYSIS_SYSTEM_PROMPT);

        let raw = self
            .llm()?
            .send_json(
                system,
                &prompts::analysis_user_content(instruction, text),
                &llm_config.model,
                llm_config.timeout(),
            )
            .await?;
        parse_analysis(&raw)
    }

    /// OCR one PDF and, when `segment` is set, segment its text.
    pub async fn process_pdf(
        &self,
        pdf: &Path,
        segment: bool,
    ) -> Result<ProcessedPdf, PipelineError> {
        let ocr = self.ocr(pdf).await?;
        let segmentation = if segment {
            Some(self.segment(&ocr.ocr_text).await?)
        } else {
            None
        };
        Ok(ProcessedPdf {
            file: ocr.file,
            ocr_text: ocr.ocr_text,
            segmentation,
        })
    }
}

/// Synchronous wrapper around [`Pipeline::process_pdf`].
///
/// Creates a temporary tokio runtime internally; do not call from inside an
/// async context.
pub fn process_pdf_sync(
    pipeline: &Pipeline,
    pdf: &Path,
    segment: bool,
) -> Result<ProcessedPdf, PipelineError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| PipelineError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(pipeline.process_pdf(pdf, segment))
}
