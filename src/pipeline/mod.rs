//! Pipeline stages for PDF OCR and segmentation.
//!
//! Each submodule implements exactly one step, so each can be tested on its
//! own and swapped without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ ocr ─────────────────────────▶ llm ──▶ validate
//! (path)    │ capability: stream or file?  (HTTP)   (<json>, partition)
//!           │ runner: pdftoppm, tesseract
//!           │ pnm: split streamed frames
//!           └ postprocess: page-text cleanup
//! ```
//!
//! 1. [`input`]      — check the PDF path; parse piped OCR records
//! 2. [`runner`]     — run one external tool with timeout and exit-code policy
//! 3. [`capability`] — probe once whether the raster tool streams to stdout
//! 4. [`pnm`]        — cut a streamed image sequence into pages
//! 5. [`ocr`]        — rasterise, recognise page by page, tag pages
//! 6. [`postprocess`] — deterministic cleanup of recognised text
//! 7. [`llm`]        — one model round trip; the only stage with network I/O
//! 8. [`validate`]   — extract and check the model's structured answer

pub mod capability;
pub mod input;
pub mod llm;
pub mod ocr;
pub mod pnm;
pub mod postprocess;
pub mod runner;
pub mod validate;
