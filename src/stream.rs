//! Streaming OCR API: emit per-file outcomes as they complete.
//!
//! [`crate::Pipeline::ocr_many`] waits for the whole batch and returns
//! outcomes in input order. [`ocr_stream`] yields each outcome as soon as its
//! PDF finishes, so callers can print or store results incrementally. Items
//! arrive in completion order; use [`FileOutcome::file`] to tell them apart.

use crate::output::{FileOutcome, OcrTextOutput};
use crate::process::Pipeline;
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of per-file OCR outcomes.
pub type OcrOutcomeStream = Pin<Box<dyn Stream<Item = FileOutcome<OcrTextOutput>> + Send>>;

/// Outcomes tagged with the position of their PDF in the input list.
pub type IndexedOcrOutcomeStream =
    Pin<Box<dyn Stream<Item = (usize, FileOutcome<OcrTextOutput>)> + Send>>;

/// OCR `pdfs` concurrently, yielding each outcome as it completes.
///
/// At most `OcrConfig::concurrency` PDFs are in flight at once. Dropping the
/// stream cancels the PDFs still running; their subprocesses are killed and
/// their scratch files removed.
///
/// # Example
/// ```rust,no_run
/// use pdf_ocr_pipeline::{ocr_stream, Pipeline, PipelineConfig, ToolSet};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = PipelineConfig::default();
/// let tools = ToolSet::resolve(&config.ocr, std::env::var_os("PATH").as_deref())?;
/// let pipeline = Pipeline::new(config).with_tools(tools);
///
/// let mut outcomes = ocr_stream(&pipeline, vec!["deed.pdf".into(), "plat.pdf".into()]);
/// while let Some(outcome) = outcomes.next().await {
///     println!("{}: {}", outcome.file(), if outcome.is_err() { "failed" } else { "ok" });
/// }
/// # Ok(())
/// # }
/// ```
pub fn ocr_stream(pipeline: &Pipeline, pdfs: Vec<PathBuf>) -> OcrOutcomeStream {
    Box::pin(ocr_stream_indexed(pipeline, pdfs).map(|(_, outcome)| outcome))
}

/// As [`ocr_stream`], pairing each outcome with its input index.
///
/// File names are not unique across directories (`a/deed.pdf`,
/// `b/deed.pdf`), so the index is the only reliable way back to input order.
pub fn ocr_stream_indexed(pipeline: &Pipeline, pdfs: Vec<PathBuf>) -> IndexedOcrOutcomeStream {
    let pipeline = Arc::new(pipeline.clone());
    let concurrency = pipeline.config().ocr.concurrency;
    info!("Starting streaming OCR of {} file(s)", pdfs.len());

    let s = stream::iter(pdfs.into_iter().enumerate().map(move |(index, pdf)| {
        let pipeline = Arc::clone(&pipeline);
        async move { (index, pipeline.ocr_outcome(&pdf).await) }
    }))
    .buffer_unordered(concurrency);

    Box::pin(s)
}

/// Sort indexed items back into input order and drop the indices.
pub fn in_input_order<T>(mut items: Vec<(usize, T)>) -> Vec<T> {
    items.sort_by_key(|(index, _)| *index);
    items.into_iter().map(|(_, item)| item).collect()
}
