//! Streaming capability detection for the raster tool.
//!
//! Newer poppler builds write page images to stdout when the output root is
//! `-`; older ones either reject it or quietly create a file named `-…` in the
//! working directory. Which one is installed decides how the OCR engine
//! collects page images, so it is detected once per process:
//!
//! ```text
//!   detect() ──▶ probe (first caller only) ──▶ StreamingSupported
//!      │                                      └▶ FileFallbackRequired
//!      └── later callers: cached value, no subprocess
//! ```
//!
//! The probe renders a tiny synthetic one-page PDF at 10 DPI and only counts
//! stdout as streaming output if it decodes as a PNM image. Any failure
//! (timeout, non-zero exit, empty or garbage stdout) resolves to the file
//! fallback, which works with every version.

use crate::pipeline::runner::{Invocation, ProcessRunner, Tool};
use futures::future::BoxFuture;
use image::ImageFormat;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// How the raster tool can hand page images back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamingCapability {
    /// Page images arrive on stdout as concatenated PNM frames.
    StreamingSupported,
    /// Page images must be written to a scratch directory and read back.
    FileFallbackRequired,
    /// Not probed yet.
    Unknown,
}

impl fmt::Display for StreamingCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StreamingCapability::StreamingSupported => "streaming",
            StreamingCapability::FileFallbackRequired => "file fallback",
            StreamingCapability::Unknown => "unknown",
        })
    }
}

/// Something that can find out whether the raster tool streams.
///
/// Implementations never fail: an inconclusive probe answers
/// [`StreamingCapability::FileFallbackRequired`].
pub trait StreamingProbe: Send + Sync {
    fn probe(&self) -> BoxFuture<'_, StreamingCapability>;
}

// ── Real probe ───────────────────────────────────────────────────────────────

/// Probes an actual `pdftoppm` binary.
pub struct RasterProbe {
    tool: Tool,
    runner: ProcessRunner,
}

impl RasterProbe {
    pub fn new(tool: Tool, timeout: Duration) -> Self {
        Self {
            tool,
            runner: ProcessRunner::new(timeout),
        }
    }

    async fn run_probe(&self) -> StreamingCapability {
        let scratch = match tempfile::Builder::new().prefix("ocr-probe").tempdir() {
            Ok(dir) => dir,
            Err(e) => {
                warn!("Cannot create probe directory ({}), using file fallback", e);
                return StreamingCapability::FileFallbackRequired;
            }
        };
        let pdf_path = scratch.path().join("probe.pdf");
        if let Err(e) = std::fs::write(&pdf_path, synthetic_probe_pdf()) {
            warn!("Cannot write probe PDF ({}), using file fallback", e);
            return StreamingCapability::FileFallbackRequired;
        }

        let invocation = Invocation::new(&self.tool)
            .args(["-r", "10"])
            .arg(&pdf_path)
            .arg("-")
            .current_dir(scratch.path());

        let output = match self.runner.run(invocation).await {
            Ok(out) => out,
            Err(e) => {
                debug!("Streaming probe failed: {}", e);
                return StreamingCapability::FileFallbackRequired;
            }
        };

        if !output.stdout.is_empty()
            && image::load_from_memory_with_format(&output.stdout, ImageFormat::Pnm).is_ok()
        {
            return StreamingCapability::StreamingSupported;
        }

        let stray = std::fs::read_dir(scratch.path())
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .filter(|e| e.file_name() != "probe.pdf")
                    .count()
            })
            .unwrap_or(0);
        if stray > 0 {
            debug!(
                "Raster tool wrote {} file(s) instead of streaming to stdout",
                stray
            );
        }
        StreamingCapability::FileFallbackRequired
    }
}

impl StreamingProbe for RasterProbe {
    fn probe(&self) -> BoxFuture<'_, StreamingCapability> {
        Box::pin(self.run_probe())
    }
}

/// A probe that always answers the same value. Useful for tests and for
/// callers that already know what their poppler does.
#[derive(Debug, Clone, Copy)]
pub struct FixedProbe(pub StreamingCapability);

impl StreamingProbe for FixedProbe {
    fn probe(&self) -> BoxFuture<'_, StreamingCapability> {
        let cap = self.0;
        Box::pin(async move { cap })
    }
}

// ── Resolver ─────────────────────────────────────────────────────────────────

/// Process-wide, probe-once cache of the streaming capability.
///
/// Concurrent first callers share one probe: `OnceCell::get_or_init` runs the
/// initialiser once and parks the others until it finishes.
pub struct CapabilityResolver {
    cell: OnceCell<StreamingCapability>,
    probe: Arc<dyn StreamingProbe>,
    probes_run: AtomicUsize,
}

impl CapabilityResolver {
    pub fn new(probe: Arc<dyn StreamingProbe>) -> Self {
        Self {
            cell: OnceCell::new(),
            probe,
            probes_run: AtomicUsize::new(0),
        }
    }

    /// Resolver whose answer is fixed; never probes.
    pub fn fixed(capability: StreamingCapability) -> Self {
        Self::new(Arc::new(FixedProbe(capability)))
    }

    /// Resolve the capability, probing on first use.
    pub async fn detect(&self) -> StreamingCapability {
        *self
            .cell
            .get_or_init(|| async {
                self.probes_run.fetch_add(1, Ordering::SeqCst);
                let cap = match self.probe.probe().await {
                    StreamingCapability::Unknown => StreamingCapability::FileFallbackRequired,
                    other => other,
                };
                debug!("Raster output mode: {}", cap);
                cap
            })
            .await
    }

    /// The cached value, or [`StreamingCapability::Unknown`] before the first
    /// [`detect`](Self::detect) completes.
    pub fn current(&self) -> StreamingCapability {
        self.cell
            .get()
            .copied()
            .unwrap_or(StreamingCapability::Unknown)
    }

    /// How many times the underlying probe actually ran.
    pub fn probe_count(&self) -> usize {
        self.probes_run.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for CapabilityResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityResolver")
            .field("current", &self.current())
            .field("probe_count", &self.probe_count())
            .finish()
    }
}

/// A minimal, valid one-page PDF (72×72 pt, empty content stream) with a
/// correct cross-reference table.
pub fn synthetic_probe_pdf() -> Vec<u8> {
    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>",
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>",
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 72 72] /Contents 4 0 R /Resources << >> >>",
        "<< /Length 0 >>\nstream\n\nendstream",
    ];

    let mut out = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.push_str(&format!("{} 0 obj\n{}\nendobj\n", i + 1, body));
    }
    let xref_at = out.len();
    out.push_str(&format!("xref\n0 {}\n", objects.len() + 1));
    out.push_str("0000000000 65535 f \n");
    for off in offsets {
        out.push_str(&format!("{off:010} 00000 n \n"));
    }
    out.push_str(&format!(
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
        objects.len() + 1,
        xref_at
    ));
    out.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingProbe {
        answer: StreamingCapability,
        delay: Duration,
    }

    impl StreamingProbe for CountingProbe {
        fn probe(&self) -> BoxFuture<'_, StreamingCapability> {
            Box::pin(async move {
                tokio::time::sleep(self.delay).await;
                self.answer
            })
        }
    }

    #[tokio::test]
    async fn unknown_until_detected() {
        let r = CapabilityResolver::fixed(StreamingCapability::StreamingSupported);
        assert_eq!(r.current(), StreamingCapability::Unknown);
        assert_eq!(r.detect().await, StreamingCapability::StreamingSupported);
        assert_eq!(r.current(), StreamingCapability::StreamingSupported);
    }

    #[tokio::test]
    async fn concurrent_detection_probes_once() {
        let r = Arc::new(CapabilityResolver::new(Arc::new(CountingProbe {
            answer: StreamingCapability::FileFallbackRequired,
            delay: Duration::from_millis(50),
        })));
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let r = Arc::clone(&r);
                tokio::spawn(async move { r.detect().await })
            })
            .collect();
        for t in tasks {
            assert_eq!(t.await.unwrap(), StreamingCapability::FileFallbackRequired);
        }
        assert_eq!(r.probe_count(), 1);
    }

    #[tokio::test]
    async fn unknown_probe_answer_means_fallback() {
        let r = CapabilityResolver::fixed(StreamingCapability::Unknown);
        assert_eq!(r.detect().await, StreamingCapability::FileFallbackRequired);
    }

    #[test]
    fn probe_pdf_has_valid_xref_offsets() {
        let pdf = synthetic_probe_pdf();
        let text = String::from_utf8(pdf).unwrap();
        assert!(text.starts_with("%PDF-1.4"));
        let xref_at: usize = text
            .rsplit("startxref\n")
            .next()
            .and_then(|tail| tail.lines().next())
            .and_then(|n| n.parse().ok())
            .unwrap();
        assert!(text[xref_at..].starts_with("xref"));
        let obj3 = text.find("3 0 obj").unwrap();
        assert!(text.contains(&format!("{obj3:010} 00000 n")));
    }
}
