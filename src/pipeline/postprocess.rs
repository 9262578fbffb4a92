//! Post-processing: deterministic cleanup of recognised page text.
//!
//! Tesseract output carries a few artefacts that have nothing to do with the
//! scanned content and only add noise to the text sent to the model:
//!
//! - a trailing form feed (`\x0c`) after every page
//! - `\r\n` line endings on some builds
//! - trailing spaces on most lines
//! - long runs of blank lines where the page had whitespace
//! - zero-width characters and BOMs picked up from embedded text layers
//!
//! The rules below fix those without touching words. They never add or
//! remove page tags, so page structure survives cleanup.
//!
//! ## Rule Order
//!
//! Line endings are normalised first so the later line-based rules see `\n`
//! only; blank-line collapsing runs after trailing-whitespace trimming so
//! whitespace-only lines count as blank.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to the text of one page.
///
/// Rules (applied in order):
/// 1. Remove form feeds
/// 2. Normalise line endings (CRLF / CR → LF)
/// 3. Trim trailing whitespace per line
/// 4. Collapse 3+ consecutive blank lines down to 1 blank line
/// 5. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 6. Trim leading and trailing blank lines
pub fn clean_page_text(input: &str) -> String {
    let s = remove_form_feeds(input);
    let s = normalise_line_endings(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    let s = remove_invisible_chars(&s);
    trim_blank_edges(&s).to_string()
}

// ── Rule 1: Remove form feeds ────────────────────────────────────────────────

fn remove_form_feeds(input: &str) -> String {
    input.replace('\x0c', "")
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 4: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").to_string()
}

// ── Rule 5: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 6: Trim blank edges ─────────────────────────────────────────────────

fn trim_blank_edges(input: &str) -> &str {
    input.trim_matches('\n')
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_form_feed() {
        assert_eq!(remove_form_feeds("GRANTOR\n\x0c"), "GRANTOR\n");
    }

    #[test]
    fn test_normalise_line_endings() {
        assert_eq!(normalise_line_endings("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn test_trim_trailing_whitespace() {
        assert_eq!(
            trim_trailing_whitespace("  Lot 4   \nBlock 2  "),
            "  Lot 4\nBlock 2"
        );
    }

    #[test]
    fn test_collapse_blank_lines() {
        assert_eq!(collapse_blank_lines("a\n\n\n\n\nb"), "a\n\nb");
        assert_eq!(collapse_blank_lines("a\n\nb"), "a\n\nb");
    }

    #[test]
    fn test_remove_invisible() {
        let input = "Book\u{200B}1234\u{FEFF}Page\u{00AD}56";
        assert_eq!(remove_invisible_chars(input), "Book1234Page56");
    }

    #[test]
    fn test_clean_page_text_full_pipeline() {
        let raw = "\n\nWARRANTY DEED   \r\n\r\n\r\n\r\nGrantor: John Smith \r\n\x0c";
        assert_eq!(
            clean_page_text(raw),
            "WARRANTY DEED\n\nGrantor: John Smith"
        );
    }

    #[test]
    fn test_clean_keeps_indentation() {
        assert_eq!(clean_page_text("    Exhibit A\n"), "    Exhibit A");
    }

    #[test]
    fn test_blank_page_becomes_empty() {
        assert_eq!(clean_page_text(" \n\x0c\n  \n"), "");
    }
}
