//! Input resolution: validate PDF paths and interpret piped OCR records.
//!
//! PDFs are checked up front (existence, read permission, `%PDF` magic) so a
//! typo or a stray image file produces a clear error instead of a raster-tool
//! stderr dump.
//!
//! The `summarize` and `segment` commands read the output of `ocr` from stdin,
//! but also accept hand-written input. [`parse_ocr_input`] accepts:
//!
//! ```text
//! [{"file": "a.pdf", "ocr_text": "…"}, …]   records as produced by `ocr`
//! {"anything": "else"}                      one record, file = "unknown"
//! plain text                                one record, file = "unknown"
//! ```

use crate::error::PipelineError;
use crate::output::OcrResult;
use serde::Deserialize;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File identifier used when input does not name its source.
pub const UNKNOWN_FILE: &str = "unknown";

/// Validate that `path` is a readable PDF and return it.
pub fn resolve_pdf(path: &Path) -> Result<PathBuf, PipelineError> {
    let path = path.to_path_buf();

    if !path.exists() {
        return Err(PipelineError::FileNotFound { path });
    }

    let mut file = match std::fs::File::open(&path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            return Err(PipelineError::PermissionDenied { path });
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(PipelineError::FileNotFound { path });
        }
        Err(source) => return Err(PipelineError::InputReadFailed { path, source }),
    };

    let mut magic = [0u8; 4];
    match file.read_exact(&mut magic) {
        Ok(()) if &magic == b"%PDF" => {}
        Ok(()) => return Err(PipelineError::NotAPdf { path, magic }),
        // Shorter than the magic itself.
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
            return Err(PipelineError::NotAPdf { path, magic });
        }
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            return Err(PipelineError::PermissionDenied { path });
        }
        Err(source) => return Err(PipelineError::InputReadFailed { path, source }),
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(path)
}

#[derive(Deserialize)]
struct RawRecord {
    #[serde(default)]
    file: Option<String>,
    #[serde(default)]
    ocr_text: Option<String>,
}

/// Interpret piped input as OCR records.
///
/// Records whose text is empty or whitespace are dropped with a warning.
///
/// # Errors
/// [`PipelineError::InvalidInput`] when the input is blank or a JSON array
/// element is not a `{file, ocr_text}` object.
pub fn parse_ocr_input(raw: &str) -> Result<Vec<OcrResult>, PipelineError> {
    if raw.trim().is_empty() {
        return Err(PipelineError::InvalidInput("no input received on stdin".into()));
    }

    let records = match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Array(items)) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| {
                let rec: RawRecord = serde_json::from_value(item).map_err(|e| {
                    PipelineError::InvalidInput(format!("record {i} is not an OCR record: {e}"))
                })?;
                Ok(OcrResult {
                    file: rec.file.unwrap_or_else(|| UNKNOWN_FILE.to_string()),
                    ocr_text: rec.ocr_text.unwrap_or_default(),
                })
            })
            .collect::<Result<Vec<_>, PipelineError>>()?,
        Ok(other) => vec![OcrResult {
            file: UNKNOWN_FILE.to_string(),
            ocr_text: other.to_string(),
        }],
        Err(_) => vec![OcrResult {
            file: UNKNOWN_FILE.to_string(),
            ocr_text: raw.to_string(),
        }],
    };

    Ok(records
        .into_iter()
        .filter(|r| {
            let keep = !r.ocr_text.trim().is_empty();
            if !keep {
                warn!("Skipping {}: no OCR text", r.file);
            }
            keep
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file() {
        let err = resolve_pdf(Path::new("/definitely/not/here.pdf")).unwrap_err();
        assert!(matches!(err, PipelineError::FileNotFound { .. }));
    }

    #[test]
    fn non_pdf_is_rejected_with_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.pdf");
        std::fs::write(&path, b"\x89PNG\r\n").unwrap();
        match resolve_pdf(&path).unwrap_err() {
            PipelineError::NotAPdf { magic, .. } => assert_eq!(&magic, b"\x89PNG"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn short_file_is_not_a_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.pdf");
        std::fs::write(&path, b"%P").unwrap();
        assert!(matches!(
            resolve_pdf(&path).unwrap_err(),
            PipelineError::NotAPdf { .. }
        ));
    }

    #[cfg(unix)]
    #[test]
    fn directory_is_a_read_failure_not_a_bad_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bundle.pdf");
        std::fs::create_dir(&path).unwrap();
        match resolve_pdf(&path).unwrap_err() {
            PipelineError::InputReadFailed { path: p, source } => {
                assert_eq!(p, path);
                assert_ne!(source.kind(), ErrorKind::UnexpectedEof);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn valid_pdf_resolves() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deed.pdf");
        std::fs::write(&path, b"%PDF-1.7\n").unwrap();
        assert_eq!(resolve_pdf(&path).unwrap(), path);
    }

    #[test]
    fn record_array() {
        let raw = r#"[{"file": "a.pdf", "ocr_text": "one"}, {"file": "b.pdf", "ocr_text": "two"}]"#;
        let records = parse_ocr_input(raw).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].file, "b.pdf");
        assert_eq!(records[1].ocr_text, "two");
    }

    #[test]
    fn other_json_is_one_record() {
        let records = parse_ocr_input(r#"{"grantor": "Smith"}"#).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].file, UNKNOWN_FILE);
        assert!(records[0].ocr_text.contains("grantor"));
    }

    #[test]
    fn plain_text_is_one_record() {
        let records = parse_ocr_input("WARRANTY DEED\nGrantor: Smith").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].ocr_text, "WARRANTY DEED\nGrantor: Smith");
    }

    #[test]
    fn empty_records_are_skipped() {
        let raw = r#"[{"file": "a.pdf", "ocr_text": "  "}, {"file": "b.pdf", "ocr_text": "x"}]"#;
        let records = parse_ocr_input(raw).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].file, "b.pdf");
    }

    #[test]
    fn blank_input_is_invalid() {
        assert!(matches!(
            parse_ocr_input(" \n").unwrap_err(),
            PipelineError::InvalidInput(_)
        ));
    }

    #[test]
    fn non_object_array_element_is_invalid() {
        assert!(parse_ocr_input("[1, 2]").is_err());
    }
}
