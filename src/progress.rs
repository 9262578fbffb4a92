//! Progress-callback trait for per-document and per-page OCR events.
//!
//! Inject an [`Arc<dyn OcrProgressCallback>`] via
//! [`crate::Pipeline::with_progress`] to receive events as the pipeline works
//! through a batch of PDFs.
//!
//! Callers can forward events to a channel, a log, or a terminal progress bar
//! (the `pdf-ocr` binary drives an `indicatif` bar from them) without the
//! library knowing how the host application communicates.
//!
//! # Example
//!
//! ```rust
//! use pdf_ocr_pipeline::OcrProgressCallback;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct PageCounter(AtomicUsize);
//!
//! impl OcrProgressCallback for PageCounter {
//!     fn on_page_recognized(&self, file: &str, page: usize, total_pages: usize, text_len: usize) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{file}: page {page}/{total_pages} ({text_len} bytes)");
//!     }
//! }
//! ```

use std::sync::Arc;

/// Called by the pipeline as it processes PDFs.
///
/// Implementations must be `Send + Sync`: several PDFs are processed
/// concurrently, so document-level events for different files can arrive from
/// different tasks at the same time. Page events for one file are always
/// delivered in page order. All methods have default no-op implementations.
pub trait OcrProgressCallback: Send + Sync {
    /// Called once before the first PDF of a batch starts.
    fn on_batch_start(&self, total_files: usize) {
        let _ = total_files;
    }

    /// Called when a PDF has been rasterised and its page count is known.
    ///
    /// # Arguments
    /// * `file`        — file identifier (name without directories)
    /// * `total_pages` — number of page images produced
    fn on_document_start(&self, file: &str, total_pages: usize) {
        let _ = (file, total_pages);
    }

    /// Called after each page's text has been recognised.
    ///
    /// # Arguments
    /// * `page`     — 1-indexed page number
    /// * `text_len` — byte length of the recognised text
    fn on_page_recognized(&self, file: &str, page: usize, total_pages: usize, text_len: usize) {
        let _ = (file, page, total_pages, text_len);
    }

    /// Called when a PDF's OCR text is complete.
    fn on_document_complete(&self, file: &str, text_len: usize) {
        let _ = (file, text_len);
    }

    /// Called when a PDF fails. No partial text is produced for it.
    fn on_document_error(&self, file: &str, error: &str) {
        let _ = (file, error);
    }

    /// Called once after every PDF of a batch has been attempted.
    fn on_batch_complete(&self, total_files: usize, success_count: usize) {
        let _ = (total_files, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl OcrProgressCallback for NoopProgressCallback {}

/// Shared callback handle stored by [`crate::Pipeline`].
pub type ProgressCallback = Arc<dyn OcrProgressCallback>;
