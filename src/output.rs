//! Output types: the JSON shapes the pipeline hands back to its callers.
//!
//! Field names match the wire contract exactly (`file`, `ocr_text`,
//! `documents`, `pages`, `total_pages`, …) so these structs can be serialised
//! straight to stdout by the CLI.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Text recognised from one PDF.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrResult {
    /// File name of the source PDF (no directory part).
    pub file: String,
    /// Recognised text with one `<page number N>` block per page.
    pub ocr_text: String,
}

impl OcrResult {
    pub(crate) fn for_path(path: &Path, text: String) -> Self {
        Self {
            file: file_identifier(path),
            ocr_text: text,
        }
    }
}

/// An inclusive, 1-indexed page range. Serialises as `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PageRange(pub u32, pub u32);

impl PageRange {
    pub fn start(&self) -> u32 {
        self.0
    }

    pub fn end(&self) -> u32 {
        self.1
    }

    /// Number of pages covered.
    pub fn len(&self) -> u32 {
        self.1 + 1 - self.0
    }

    pub fn is_empty(&self) -> bool {
        self.1 < self.0
    }

    pub fn contains(&self, page: u32) -> bool {
        (self.0..=self.1).contains(&page)
    }
}

/// One instrument found inside a multi-document PDF.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentationDocument {
    pub title: Option<String>,
    pub pages: PageRange,
    pub summary: String,
    pub recording_reference: Option<String>,
}

/// Validated segmentation of one PDF.
///
/// Invariant: the `pages` ranges of `documents` partition `1..=total_pages`
/// and appear in ascending page order. Only
/// [`crate::pipeline::validate::validate_segmentation`] constructs values
/// with a non-empty document list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentationResult {
    pub documents: Vec<SegmentationDocument>,
    pub total_pages: u32,
}

impl SegmentationResult {
    /// Result for a document with no pages.
    pub fn empty() -> Self {
        Self {
            documents: Vec::new(),
            total_pages: 0,
        }
    }

    /// Which document covers `page`, if any.
    pub fn document_for_page(&self, page: u32) -> Option<&SegmentationDocument> {
        self.documents.iter().find(|d| d.pages.contains(page))
    }
}

/// Per-file outcome for batch commands: either a success payload or the
/// error message, never both.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FileOutcome<T> {
    Ok {
        file: String,
        #[serde(flatten)]
        value: T,
    },
    Err {
        file: String,
        error: String,
    },
}

impl<T> FileOutcome<T> {
    pub fn file(&self) -> &str {
        match self {
            FileOutcome::Ok { file, .. } | FileOutcome::Err { file, .. } => file,
        }
    }

    pub fn is_err(&self) -> bool {
        matches!(self, FileOutcome::Err { .. })
    }
}

/// `{"ocr_text": …}` payload for `ocr`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OcrTextOutput {
    pub ocr_text: String,
}

impl From<OcrResult> for FileOutcome<OcrTextOutput> {
    fn from(result: OcrResult) -> Self {
        FileOutcome::Ok {
            file: result.file,
            value: OcrTextOutput {
                ocr_text: result.ocr_text,
            },
        }
    }
}

/// `{"analysis": …}` payload for `summarize`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisOutput {
    pub analysis: serde_json::Value,
}

/// `{"segmentation": …}` payload for `segment`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentationOutput {
    pub segmentation: SegmentationResult,
}

/// OCR text of one PDF, plus its segmentation when requested.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedPdf {
    pub file: String,
    pub ocr_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segmentation: Option<SegmentationResult>,
}

/// `{"ocr_text": …, "segmentation": …}` payload for `process`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedOutput {
    pub ocr_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segmentation: Option<SegmentationResult>,
}

impl From<ProcessedPdf> for FileOutcome<ProcessedOutput> {
    fn from(processed: ProcessedPdf) -> Self {
        FileOutcome::Ok {
            file: processed.file,
            value: ProcessedOutput {
                ocr_text: processed.ocr_text,
                segmentation: processed.segmentation,
            },
        }
    }
}

/// File name used in output records; falls back to the full path when the
/// path has no final component.
pub fn file_identifier(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
