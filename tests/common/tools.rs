//! Stand-in `pdftoppm` / `tesseract` scripts.
//!
//! The scripts understand a tiny fake "PDF" format: a `%PDF` header followed
//! by `PAGES n` and optionally `FAIL k`, which makes recognition of page `k`
//! exit non-zero. Two raster variants exist: one that streams PNM frames to
//! stdout when the output argument is `-`, and an older-style one that
//! always writes `<prefix>-N.ppm` files.
//!
//! A streamed frame for the failing page is 1000 pixels wide; every other
//! frame is `i` pixels wide for page `i`.

use pdf_ocr_pipeline::{
    CapabilityResolver, OcrConfig, OcrEngine, StreamingCapability, ToolSet,
};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const TESSERACT: &str = r#"#!/bin/sh
# tesseract INPUT stdout -l LANG --dpi N
if [ "$1" = "-" ]; then
  n=$(wc -c | tr -d ' ')
  if [ "$n" -gt 1000 ]; then
    echo "Error during processing." >&2
    exit 1
  fi
  printf 'stream bytes=%s\n' "$n"
  exit 0
fi
if grep -q FAIL "$1"; then
  echo "Error during processing." >&2
  exit 1
fi
cat "$1"
"#;

pub fn pdftoppm(streams: bool) -> String {
    format!(
        r#"#!/bin/sh
# pdftoppm -r DPI PDF OUT
STREAMS={}
pdf="$3"
out="$4"
pages=$(sed -n 's/^PAGES //p' "$pdf")
[ -z "$pages" ] && pages=1
fail=$(sed -n 's/^FAIL //p' "$pdf")
i=1
while [ "$i" -le "$pages" ]; do
  if [ "$out" = "-" ] && [ "$STREAMS" = 1 ]; then
    w=$i
    [ "$i" = "$fail" ] && w=1000
    printf 'P5\n%d 1\n255\n' "$w"
    head -c "$w" /dev/zero
  elif [ "$i" = "$fail" ]; then
    printf 'FAIL page %d\n' "$i" > "$out-$i.ppm"
  else
    printf 'text of page %d  \n\f' "$i" > "$out-$i.ppm"
  fi
  i=$((i + 1))
done
"#,
        if streams { 1 } else { 0 }
    )
}

pub fn write_script(path: &Path, body: &str) {
    std::fs::write(path, body).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

/// Write both stand-in tools into `dir`.
pub fn install_tools(dir: &Path, streams: bool) {
    write_script(&dir.join("pdftoppm"), &pdftoppm(streams));
    write_script(&dir.join("tesseract"), TESSERACT);
}

pub fn tools(bin: &Path) -> ToolSet {
    ToolSet::resolve(&OcrConfig::default(), Some(bin.as_os_str())).unwrap()
}

pub fn engine(bin: &Path, capability: Option<StreamingCapability>) -> OcrEngine {
    super::init_logging();
    let engine = OcrEngine::new(OcrConfig::default(), tools(bin));
    match capability {
        Some(cap) => engine.with_capability(Arc::new(CapabilityResolver::fixed(cap))),
        None => engine,
    }
}

pub fn fake_pdf(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("%PDF-1.4\n{body}")).unwrap();
    path
}

pub fn tagged(pages: &[&str]) -> String {
    pages
        .iter()
        .enumerate()
        .map(|(i, text)| format!("<page number {n}>\n{text}\n</page number {n}>", n = i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}
