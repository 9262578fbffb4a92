//! Error types for the pdf-ocr-pipeline library.
//!
//! A single enum, [`PipelineError`], covers every failure the pipeline can
//! surface. The variants fall into four families:
//!
//! * **Setup** — [`PipelineError::MissingBinary`], configuration and input
//!   validation. Raised before any work starts; never retryable.
//! * **Execution** — [`PipelineError::ProcessFailure`] from the process runner
//!   and [`PipelineError::OcrFailure`], which wraps it with the PDF and the
//!   stage (rasterisation or recognition of page N) that failed.
//! * **Transport** — [`PipelineError::LlmTransportFailure`]: network errors,
//!   timeouts, authentication and HTTP status failures. The only family a
//!   caller may sensibly retry (see [`PipelineError::is_retryable`]).
//! * **Schema** — [`PipelineError::LlmSchemaFailure`]: the model answered,
//!   but the answer breaks the structured-output contract. Re-sending the
//!   same request reproduces the same output, so it is not retryable.
//!
//! No component downgrades a failure into an empty result: an incomplete OCR
//! run or an unusable model response is always one of these variants.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Upper bound on the stderr text embedded in a [`PipelineError::ProcessFailure`].
pub const STDERR_LIMIT: usize = 2048;

/// All errors returned by the pdf-ocr-pipeline library.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Setup errors ──────────────────────────────────────────────────────
    /// A required external tool is not installed or not on the search path.
    #[error("Required tool '{tool}' was not found on PATH.\n{hint}")]
    MissingBinary { tool: String, hint: String },

    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}' (first bytes: {magic:?})")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// The file opened but its header could not be read.
    #[error("Failed to read '{path}': {source}")]
    InputReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Text piped into the pipeline could not be interpreted.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A settings file exists but could not be read or parsed.
    #[error("Failed to load settings from '{path}': {detail}")]
    SettingsLoad { path: PathBuf, detail: String },

    // ── Execution errors ──────────────────────────────────────────────────
    /// An external command ran but did not finish with an allowed exit code.
    #[error("Command `{command}` failed ({reason}){}", format_stderr(.stderr))]
    ProcessFailure {
        command: String,
        reason: FailureReason,
        stderr: String,
    },

    /// OCR of a PDF failed at the given stage; the underlying error is kept
    /// as the source.
    #[error("OCR failed for '{pdf}' during {stage}: {source}")]
    OcrFailure {
        pdf: PathBuf,
        stage: OcrStage,
        #[source]
        source: Box<PipelineError>,
    },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// Network, timeout, authentication or HTTP-status failure. Retryable by
    /// the caller with backoff.
    #[error("LLM transport failure{}: {detail}", format_status(.status))]
    LlmTransportFailure { detail: String, status: Option<u16> },

    /// The call succeeded but the response violates the expected contract.
    #[error("LLM response rejected: {detail}")]
    LlmSchemaFailure { detail: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (scratch directory, task join, …).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// `true` when re-sending the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::LlmTransportFailure { .. })
    }

    pub(crate) fn schema(detail: impl Into<String>) -> Self {
        PipelineError::LlmSchemaFailure {
            detail: detail.into(),
        }
    }

    pub(crate) fn transport(detail: impl Into<String>, status: Option<u16>) -> Self {
        PipelineError::LlmTransportFailure {
            detail: detail.into(),
            status,
        }
    }
}

/// Why a subprocess was considered failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// Exited with a code outside the allowed set.
    ExitCode(i32),
    /// Killed by a signal before reporting an exit code.
    Terminated,
    /// Exceeded the runner timeout and was killed.
    TimedOut { secs: u64 },
    /// The OS refused to start the process.
    Spawn(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::ExitCode(code) => write!(f, "exit code {code}"),
            FailureReason::Terminated => f.write_str("terminated by signal"),
            FailureReason::TimedOut { secs } => write!(f, "timed out after {secs}s"),
            FailureReason::Spawn(detail) => write!(f, "could not start: {detail}"),
        }
    }
}

/// The OCR stage at which a PDF failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrStage {
    /// Converting the PDF into page images.
    Raster,
    /// Recognising text on a single page (1-indexed).
    Recognition { page: usize },
    /// Preparing or reading the scratch directory for page images.
    Scratch,
}

impl fmt::Display for OcrStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OcrStage::Raster => f.write_str("rasterisation"),
            OcrStage::Recognition { page } => write!(f, "text recognition of page {page}"),
            OcrStage::Scratch => f.write_str("scratch-file handling"),
        }
    }
}

fn format_stderr(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {trimmed}")
    }
}

fn format_status(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" (HTTP {code})"),
        None => String::new(),
    }
}

/// Decode captured stderr lossily and cap it at [`STDERR_LIMIT`] bytes,
/// cutting on a char boundary.
pub(crate) fn truncate_stderr(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    if text.len() <= STDERR_LIMIT {
        return text.into_owned();
    }
    let mut cut = STDERR_LIMIT;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…", &text[..cut])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_failure_display_includes_stderr() {
        let e = PipelineError::ProcessFailure {
            command: "tesseract - stdout".into(),
            reason: FailureReason::ExitCode(1),
            stderr: "Error during processing.\n".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("exit code 1"), "got: {msg}");
        assert!(msg.contains("Error during processing."), "got: {msg}");
    }

    #[test]
    fn process_failure_display_without_stderr() {
        let e = PipelineError::ProcessFailure {
            command: "pdftoppm".into(),
            reason: FailureReason::TimedOut { secs: 5 },
            stderr: "  ".into(),
        };
        assert!(e.to_string().ends_with("(timed out after 5s)"));
    }

    #[test]
    fn ocr_failure_names_page_and_source() {
        let inner = PipelineError::ProcessFailure {
            command: "tesseract".into(),
            reason: FailureReason::ExitCode(1),
            stderr: "bad image".into(),
        };
        let e = PipelineError::OcrFailure {
            pdf: PathBuf::from("deed.pdf"),
            stage: OcrStage::Recognition { page: 2 },
            source: Box::new(inner),
        };
        let msg = e.to_string();
        assert!(msg.contains("page 2"), "got: {msg}");
        assert!(msg.contains("bad image"), "got: {msg}");
        assert!(std::error::Error::source(&e).is_some());
    }

    #[test]
    fn only_transport_failures_are_retryable() {
        assert!(PipelineError::transport("connection reset", None).is_retryable());
        assert!(!PipelineError::schema("no <json> block").is_retryable());
        assert!(!PipelineError::MissingBinary {
            tool: "tesseract".into(),
            hint: String::new(),
        }
        .is_retryable());
    }

    #[test]
    fn transport_display_with_status() {
        let e = PipelineError::transport("unauthorized", Some(401));
        assert!(e.to_string().contains("HTTP 401"));
    }

    #[test]
    fn stderr_is_truncated_on_char_boundary() {
        let raw = "é".repeat(STDERR_LIMIT);
        let out = truncate_stderr(raw.as_bytes());
        assert!(out.ends_with('…'));
        assert!(out.len() <= STDERR_LIMIT + '…'.len_utf8());
    }

    #[test]
    fn short_stderr_is_kept_verbatim() {
        assert_eq!(truncate_stderr(b"oops\n"), "oops\n");
    }
}
