//! Page-image scratch directories are removed when OCR fails part-way.
//!
//! Points `TMPDIR` at a private directory, so it lives in its own test binary
//! with a single test: the variable is process-wide.

#![cfg(unix)]

mod common;

use common::{engine, fake_pdf, install_tools};
use pdf_ocr_pipeline::{OcrStage, PipelineError, StreamingCapability};
use std::path::Path;

fn entries(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect()
}

#[tokio::test]
async fn failed_pages_leave_no_scratch_behind() {
    let root = tempfile::tempdir().unwrap();
    let (bin, docs, tmp) = (root.path().join("bin"), root.path().join("docs"), root.path().join("tmp"));
    for dir in [&bin, &docs, &tmp] {
        std::fs::create_dir(dir).unwrap();
    }
    install_tools(&bin, true);
    let pdf = fake_pdf(&docs, "torn.pdf", "PAGES 3\nFAIL 2\n");
    std::env::set_var("TMPDIR", &tmp);

    for cap in [
        StreamingCapability::FileFallbackRequired,
        StreamingCapability::StreamingSupported,
    ] {
        let err = engine(&bin, Some(cap)).ocr_file(&pdf).await.unwrap_err();
        assert!(
            matches!(
                err,
                PipelineError::OcrFailure {
                    stage: OcrStage::Recognition { page: 2 },
                    ..
                }
            ),
            "mode {cap}: {err:?}"
        );
        assert_eq!(entries(&tmp), Vec::<String>::new(), "mode {cap} left scratch files");
    }

    // Sanity check that scratch really goes through TMPDIR.
    let scratch = tempfile::tempdir().unwrap();
    assert!(scratch.path().starts_with(&tmp));
}
