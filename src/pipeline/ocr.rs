//! OCR engine: PDF → page images → text.
//!
//! ## Data Flow
//!
//! ```text
//!            ┌── streaming ──▶ pdftoppm -r N in.pdf -  ──▶ split PNM frames ─┐
//! extract() ─┤                                                               ├─▶ tesseract (page by page)
//!            └── file ───────▶ pdftoppm -r N in.pdf tmp/page ─▶ page-*.ppm ──┘        │
//!                                                                                    ▼
//!                                                  <page number 1>…</page number 1>\n<page number 2>…
//! ```
//!
//! The branch is picked by the process-wide [`CapabilityResolver`]. Pages are
//! recognised strictly in page order and one at a time; the first failing
//! page aborts the whole PDF so the caller never sees text with a page
//! silently missing.
//!
//! Page images in file mode live in a [`tempfile::TempDir`] created before
//! the raster call. It is removed when the engine returns, whether that is a
//! success, a recognition failure, or the future being dropped mid-run.

use crate::config::OcrConfig;
use crate::error::{OcrStage, PipelineError};
use crate::output::{file_identifier, OcrResult};
use crate::pipeline::capability::{CapabilityResolver, RasterProbe, StreamingCapability};
use crate::pipeline::input::resolve_pdf;
use crate::pipeline::postprocess::clean_page_text;
use crate::pipeline::pnm::split_frames;
use crate::pipeline::runner::{Invocation, ProcessRunner, ToolSet};
use crate::progress::{NoopProgressCallback, OcrProgressCallback};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;
use tracing::{debug, info};

/// Filename prefix handed to the raster tool in file mode.
const PAGE_PREFIX: &str = "page";

/// Where one page image lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageSource<'a> {
    /// A frame cut out of the raster tool's stdout.
    Bytes(&'a [u8]),
    /// A file in the scratch directory.
    File(PathBuf),
}

/// One rasterised page, alive only until its text has been recognised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage<'a> {
    /// 1-indexed page number.
    pub index: usize,
    pub source: PageSource<'a>,
}

/// Converts PDFs to text with the configured raster and recognition tools.
#[derive(Debug, Clone)]
pub struct OcrEngine {
    runner: ProcessRunner,
    tools: ToolSet,
    capability: Arc<CapabilityResolver>,
    config: OcrConfig,
}

impl OcrEngine {
    /// Engine that probes the raster tool on first use.
    pub fn new(config: OcrConfig, tools: ToolSet) -> Self {
        let probe = RasterProbe::new(tools.raster.clone(), config.probe_timeout());
        Self {
            runner: ProcessRunner::new(config.tool_timeout()),
            tools,
            capability: Arc::new(CapabilityResolver::new(Arc::new(probe))),
            config,
        }
    }

    /// Share an existing resolver (or a fixed one) instead of probing.
    pub fn with_capability(mut self, capability: Arc<CapabilityResolver>) -> Self {
        self.capability = capability;
        self
    }

    pub fn capability(&self) -> &Arc<CapabilityResolver> {
        &self.capability
    }

    pub fn config(&self) -> &OcrConfig {
        &self.config
    }

    /// OCR `pdf` with the configured DPI and language.
    pub async fn ocr_file(&self, pdf: &Path) -> Result<OcrResult, PipelineError> {
        self.ocr_file_with_progress(pdf, &NoopProgressCallback).await
    }

    /// As [`ocr_file`](Self::ocr_file), reporting page events to `progress`.
    pub async fn ocr_file_with_progress(
        &self,
        pdf: &Path,
        progress: &dyn OcrProgressCallback,
    ) -> Result<OcrResult, PipelineError> {
        let text = self
            .extract_with_progress(pdf, self.config.dpi, &self.config.language, progress)
            .await?;
        Ok(OcrResult::for_path(pdf, text))
    }

    /// Recognise every page of `pdf`, returning page-tagged text.
    ///
    /// A PDF with zero pages yields an empty string and the recognition tool
    /// is never started.
    ///
    /// # Errors
    /// - input errors from [`resolve_pdf`]
    /// - [`PipelineError::MissingBinary`] if a tool disappeared from disk
    /// - [`PipelineError::OcrFailure`] naming the stage (and page) that failed
    pub async fn extract(&self, pdf: &Path, dpi: u32, language: &str) -> Result<String, PipelineError> {
        self.extract_with_progress(pdf, dpi, language, &NoopProgressCallback)
            .await
    }

    pub async fn extract_with_progress(
        &self,
        pdf: &Path,
        dpi: u32,
        language: &str,
        progress: &dyn OcrProgressCallback,
    ) -> Result<String, PipelineError> {
        let pdf = resolve_pdf(pdf)?;
        let start = Instant::now();
        let mode = self.capability.detect().await;
        debug!("OCR {} at {} DPI ({}), lang={}", pdf.display(), dpi, mode, language);

        let pages = match mode {
            StreamingCapability::StreamingSupported => {
                self.extract_streaming(&pdf, dpi, language, progress).await?
            }
            _ => self.extract_via_files(&pdf, dpi, language, progress).await?,
        };

        info!(
            "OCR {}: {} page(s) in {:.1}s",
            pdf.display(),
            pages.len(),
            start.elapsed().as_secs_f64()
        );
        Ok(join_pages(&pages))
    }

    // ── Streaming path ───────────────────────────────────────────────────

    async fn extract_streaming(
        &self,
        pdf: &Path,
        dpi: u32,
        language: &str,
        progress: &dyn OcrProgressCallback,
    ) -> Result<Vec<String>, PipelineError> {
        // Run inside a scratch directory so an unexpected file write does
        // not land in the caller's working directory.
        let scratch = scratch_dir(pdf)?;
        let dpi_arg = dpi.to_string();
        let output = self
            .runner
            .run(
                Invocation::new(&self.tools.raster)
                    .args(["-r", dpi_arg.as_str()])
                    .arg(pdf)
                    .arg("-")
                    .current_dir(scratch.path()),
            )
            .await
            .map_err(|e| ocr_failure(pdf, OcrStage::Raster, e))?;

        if output.stdout.is_empty() {
            debug!(
                "Raster tool streamed nothing for {}; retrying via files",
                pdf.display()
            );
            drop(scratch);
            return self.extract_via_files(pdf, dpi, language, progress).await;
        }

        let frames = split_frames(&output.stdout)
            .map_err(|e| ocr_failure(pdf, OcrStage::Raster, e))?;
        let images = frames
            .into_iter()
            .enumerate()
            .map(|(i, frame)| PageImage {
                index: i + 1,
                source: PageSource::Bytes(frame),
            })
            .collect::<Vec<_>>();
        self.recognize_all(pdf, &images, language, dpi, progress).await
    }

    // ── File path ────────────────────────────────────────────────────────

    async fn extract_via_files(
        &self,
        pdf: &Path,
        dpi: u32,
        language: &str,
        progress: &dyn OcrProgressCallback,
    ) -> Result<Vec<String>, PipelineError> {
        let scratch = scratch_dir(pdf)?;
        let prefix = scratch.path().join(PAGE_PREFIX);
        let dpi_arg = dpi.to_string();
        self.runner
            .run(
                Invocation::new(&self.tools.raster)
                    .args(["-r", dpi_arg.as_str()])
                    .arg(pdf)
                    .arg(&prefix),
            )
            .await
            .map_err(|e| ocr_failure(pdf, OcrStage::Raster, e))?;

        let files = list_page_files(scratch.path()).map_err(|e| {
            ocr_failure(
                pdf,
                OcrStage::Scratch,
                PipelineError::Internal(format!("cannot list page images: {e}")),
            )
        })?;
        let images = files
            .into_iter()
            .enumerate()
            .map(|(i, path)| PageImage {
                index: i + 1,
                source: PageSource::File(path),
            })
            .collect::<Vec<_>>();

        // `scratch` outlives every recognition call below.
        let pages = self.recognize_all(pdf, &images, language, dpi, progress).await;
        drop(scratch);
        pages
    }

    // ── Recognition ──────────────────────────────────────────────────────

    async fn recognize_all(
        &self,
        pdf: &Path,
        images: &[PageImage<'_>],
        language: &str,
        dpi: u32,
        progress: &dyn OcrProgressCallback,
    ) -> Result<Vec<String>, PipelineError> {
        let file = file_identifier(pdf);
        let total = images.len();
        progress.on_document_start(&file, total);

        let mut pages = Vec::with_capacity(total);
        for image in images {
            let text = self
                .recognize(image, language, dpi)
                .await
                .map_err(|e| ocr_failure(pdf, OcrStage::Recognition { page: image.index }, e))?;
            progress.on_page_recognized(&file, image.index, total, text.len());
            pages.push(text);
        }
        Ok(pages)
    }

    async fn recognize(
        &self,
        image: &PageImage<'_>,
        language: &str,
        dpi: u32,
    ) -> Result<String, PipelineError> {
        let dpi_arg = dpi.to_string();
        let base = Invocation::new(&self.tools.recognition);
        let invocation = match image.source {
            PageSource::Bytes(bytes) => base.arg("-").stdin(bytes),
            PageSource::File(ref path) => base.arg(path),
        }
        .args(["stdout", "-l", language, "--dpi", dpi_arg.as_str()]);

        let output = self.runner.run(invocation).await?;
        let text = String::from_utf8_lossy(&output.stdout);
        debug!("Page {}: {} bytes of text", image.index, text.len());
        Ok(if self.config.normalize_text {
            clean_page_text(&text)
        } else {
            text.into_owned()
        })
    }
}

/// Wrap each page in `<page number N>` tags and join with newlines.
pub fn join_pages(pages: &[String]) -> String {
    pages
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let n = i + 1;
            format!("<page number {n}>\n{text}\n</page number {n}>")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

static RE_PAGE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<page number \d+>").unwrap());

/// Number of `<page number N>` opening tags in OCR text.
pub fn count_pages(text: &str) -> usize {
    RE_PAGE_TAG.find_iter(text).count()
}

fn scratch_dir(pdf: &Path) -> Result<TempDir, PipelineError> {
    tempfile::Builder::new()
        .prefix("pdf-ocr")
        .tempdir()
        .map_err(|e| {
            ocr_failure(
                pdf,
                OcrStage::Scratch,
                PipelineError::Internal(format!("cannot create scratch directory: {e}")),
            )
        })
}

/// Page images written by the raster tool, ordered by page number.
///
/// The tool names them `page-1.ppm` or `page-01.ppm` depending on page
/// count, so ordering is numeric rather than lexicographic.
fn list_page_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut pages = std::fs::read_dir(dir)?
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let name = entry.file_name();
            let number = page_number(&name.to_string_lossy())?;
            Some((number, entry.path()))
        })
        .collect::<Vec<_>>();
    pages.sort_by_key(|(n, _)| *n);
    Ok(pages.into_iter().map(|(_, path)| path).collect())
}

fn page_number(file_name: &str) -> Option<u32> {
    let rest = file_name.strip_prefix(PAGE_PREFIX)?.strip_prefix('-')?;
    let (digits, ext) = rest.split_once('.')?;
    if !matches!(ext, "ppm" | "pgm" | "pbm" | "png" | "tif") {
        return None;
    }
    digits.parse().ok()
}

fn ocr_failure(pdf: &Path, stage: OcrStage, source: PipelineError) -> PipelineError {
    match source {
        e @ PipelineError::MissingBinary { .. } => e,
        source => PipelineError::OcrFailure {
            pdf: pdf.to_path_buf(),
            stage,
            source: Box::new(source),
        },
    }
}
