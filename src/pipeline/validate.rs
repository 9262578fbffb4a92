//! Response validation: turn raw model text into a trustworthy result.
//!
//! ## Segmentation contract
//!
//! 1. The reply contains exactly one `<json>…</json>` block. Zero blocks or
//!    several blocks are a schema failure; the validator never guesses which
//!    one was meant.
//! 2. The block parses into `{documents: [...], total_pages: N}` where every
//!    `pages` entry is `[start, end]` with `1 <= start <= end`.
//! 3. After ordering by start page, the ranges partition `1..=N`.
//!
//! When step 3 finds exactly one violation and it spans a single page, one
//! deterministic repair is attempted, then the partition is checked again:
//!
//! | Violation | Repair |
//! |-----------|--------|
//! | page `p` uncovered between two documents | earlier document extends to `p` |
//! | page 1 uncovered | first document starts at 1 |
//! | last page uncovered | last document extends to `N` |
//! | page `p` claimed by two documents | later document starts at `p + 1` |
//!
//! Everything else (wider gaps, several violations, ranges past `N`) fails.
//!
//! Validation is pure: the same input always gives the same result.

use crate::error::PipelineError;
use crate::output::{PageRange, SegmentationDocument, SegmentationResult};
use crate::prompts::{JSON_CLOSE_TAG, JSON_OPEN_TAG};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer};
use std::fmt;
use tracing::{debug, warn};

static RE_JSON_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<json>(.*?)</json>").unwrap());

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:json)?\s*\n(.*)\n```\s*$").unwrap());

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSegmentation {
    documents: Vec<RawDocument>,
    total_pages: i64,
}

/// Every key is required; `title` and `recording_reference` may be `null`.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDocument {
    #[serde(deserialize_with = "required_nullable")]
    title: Option<String>,
    pages: Vec<i64>,
    summary: String,
    #[serde(deserialize_with = "required_nullable")]
    recording_reference: Option<String>,
}

/// Serde treats an absent `Option` field as `None`; going through
/// `deserialize_with` makes the key mandatory while still accepting `null`.
fn required_nullable<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)
}

/// Validate a segmentation reply.
///
/// `expected_total_pages`, when known (from the page tags of the OCR text),
/// must equal the reply's `total_pages`.
///
/// # Errors
/// [`PipelineError::LlmSchemaFailure`] describing the first contract breach.
pub fn validate_segmentation(
    raw: &str,
    expected_total_pages: Option<u32>,
) -> Result<SegmentationResult, PipelineError> {
    let payload = extract_json_block(raw)?;
    let parsed: RawSegmentation = serde_json::from_str(payload)
        .map_err(|e| PipelineError::schema(format!("segmentation JSON does not match the schema: {e}")))?;

    let total_pages = u32::try_from(parsed.total_pages).map_err(|_| {
        PipelineError::schema(format!("total_pages must be ≥ 0, got {}", parsed.total_pages))
    })?;
    if let Some(expected) = expected_total_pages {
        if expected != total_pages {
            return Err(PipelineError::schema(format!(
                "total_pages is {total_pages} but the text has {expected} page(s)"
            )));
        }
    }

    let mut documents = parsed
        .documents
        .into_iter()
        .enumerate()
        .map(|(i, d)| convert_document(i, d))
        .collect::<Result<Vec<_>, _>>()?;
    documents.sort_by_key(|d| d.pages.start());

    let violations = find_violations(&documents, total_pages);
    match violations.as_slice() {
        [] => {}
        [single] if single.is_single_page() => {
            repair(&mut documents, single, total_pages)?;
            let remaining = find_violations(&documents, total_pages);
            if let Some(v) = remaining.first() {
                return Err(PipelineError::schema(format!(
                    "page ranges still invalid after repair: {v}"
                )));
            }
        }
        many => {
            let listed = many.iter().map(ToString::to_string).collect::<Vec<_>>();
            return Err(PipelineError::schema(format!(
                "page ranges do not partition 1..={total_pages}: {}",
                listed.join("; ")
            )));
        }
    }

    debug!(
        "Segmentation accepted: {} document(s) over {} page(s)",
        documents.len(),
        total_pages
    );
    Ok(SegmentationResult {
        documents,
        total_pages,
    })
}

/// Parse a free-form analysis reply, which must be a JSON object.
///
/// Accepts the object bare, wrapped in Markdown code fences, or inside a
/// single `<json>` block.
pub fn parse_analysis(raw: &str) -> Result<serde_json::Value, PipelineError> {
    let trimmed = raw.trim();
    let payload = if trimmed.contains(JSON_OPEN_TAG) {
        extract_json_block(trimmed)?
    } else if let Some(caps) = RE_OUTER_FENCES.captures(trimmed) {
        caps.get(1).map_or(trimmed, |m| m.as_str())
    } else {
        trimmed
    };

    match serde_json::from_str::<serde_json::Value>(payload) {
        Ok(value @ serde_json::Value::Object(_)) => Ok(value),
        Ok(other) => Err(PipelineError::schema(format!(
            "analysis must be a JSON object, got {}",
            json_kind(&other)
        ))),
        Err(e) => Err(PipelineError::schema(format!("analysis is not valid JSON: {e}"))),
    }
}

/// The text between the only `<json>` and `</json>` pair in `raw`.
pub fn extract_json_block(raw: &str) -> Result<&str, PipelineError> {
    let opens = raw.matches(JSON_OPEN_TAG).count();
    let blocks: Vec<_> = RE_JSON_BLOCK.captures_iter(raw).collect();
    match (opens, blocks.as_slice()) {
        (1, [caps]) => Ok(caps.get(1).map_or("", |m| m.as_str()).trim()),
        (0, _) => Err(PipelineError::schema(format!(
            "no {JSON_OPEN_TAG}…{JSON_CLOSE_TAG} block in response"
        ))),
        (1, []) => Err(PipelineError::schema(format!(
            "{JSON_OPEN_TAG} block is not closed with {JSON_CLOSE_TAG}"
        ))),
        (n, _) => Err(PipelineError::schema(format!(
            "expected exactly one {JSON_OPEN_TAG} block, found {n}"
        ))),
    }
}

fn convert_document(index: usize, raw: RawDocument) -> Result<SegmentationDocument, PipelineError> {
    let (start, end) = match raw.pages.as_slice() {
        [start, end] => (*start, *end),
        other => {
            return Err(PipelineError::schema(format!(
                "document {index}: pages must be [start, end], got {} value(s)",
                other.len()
            )))
        }
    };
    if start < 1 || start > end {
        return Err(PipelineError::schema(format!(
            "document {index}: invalid page range [{start}, {end}]"
        )));
    }
    let to_u32 = |n: i64| {
        u32::try_from(n).map_err(|_| {
            PipelineError::schema(format!("document {index}: page {n} out of range"))
        })
    };
    Ok(SegmentationDocument {
        title: raw.title,
        pages: PageRange(to_u32(start)?, to_u32(end)?),
        summary: raw.summary,
        recording_reference: raw.recording_reference,
    })
}

// ── Partition check ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
enum Violation {
    /// Pages `from..=to` are uncovered; the next document has index `before`
    /// (`documents.len()` for a trailing gap).
    Gap { from: u32, to: u32, before: usize },
    /// Pages `from..=to` of document `later` are already covered.
    Overlap { from: u32, to: u32, later: usize },
    /// Document `doc` ends past the last page.
    Overflow { doc: usize, end: u32 },
}

impl Violation {
    fn is_single_page(&self) -> bool {
        match self {
            Violation::Gap { from, to, .. } | Violation::Overlap { from, to, .. } => from == to,
            Violation::Overflow { .. } => false,
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::Gap { from, to, .. } if from == to => {
                write!(f, "page {from} is not covered")
            }
            Violation::Gap { from, to, .. } => write!(f, "pages {from}-{to} are not covered"),
            Violation::Overlap { from, to, later } if from == to => {
                write!(f, "page {from} is claimed again by document {later}")
            }
            Violation::Overlap { from, to, later } => {
                write!(f, "pages {from}-{to} are claimed again by document {later}")
            }
            Violation::Overflow { doc, end } => {
                write!(f, "document {doc} ends at page {end}, past the last page")
            }
        }
    }
}

/// Documents must already be sorted by start page.
fn find_violations(documents: &[SegmentationDocument], total_pages: u32) -> Vec<Violation> {
    let mut violations = Vec::new();
    let mut next = 1u32;
    for (i, doc) in documents.iter().enumerate() {
        let PageRange(start, end) = doc.pages;
        if start > next {
            violations.push(Violation::Gap {
                from: next,
                to: start - 1,
                before: i,
            });
        } else if start < next {
            violations.push(Violation::Overlap {
                from: start,
                to: (next - 1).min(end),
                later: i,
            });
        }
        if end > total_pages {
            violations.push(Violation::Overflow { doc: i, end });
        }
        next = next.max(end.saturating_add(1));
    }
    if next <= total_pages {
        violations.push(Violation::Gap {
            from: next,
            to: total_pages,
            before: documents.len(),
        });
    }
    violations
}

fn repair(
    documents: &mut [SegmentationDocument],
    violation: &Violation,
    total_pages: u32,
) -> Result<(), PipelineError> {
    let unrepairable = || PipelineError::schema(format!("cannot repair: {violation}"));
    match *violation {
        Violation::Gap { from, before, .. } => {
            if documents.is_empty() {
                return Err(unrepairable());
            }
            if before == 0 {
                documents[0].pages.0 = 1;
                warn!("Repaired segmentation: page {} added to document 0", from);
            } else {
                let earlier = before - 1;
                documents[earlier].pages.1 = from;
                warn!(
                    "Repaired segmentation: page {} added to document {}{}",
                    from,
                    earlier,
                    if before == documents.len() && from == total_pages {
                        " (last page)"
                    } else {
                        ""
                    }
                );
            }
            Ok(())
        }
        Violation::Overlap { from, later, .. } => {
            let doc = &mut documents[later];
            if doc.pages.1 <= from {
                return Err(unrepairable());
            }
            doc.pages.0 = from + 1;
            warn!(
                "Repaired segmentation: page {} kept in the earlier document, document {} now starts at {}",
                from,
                later,
                from + 1
            );
            Ok(())
        }
        Violation::Overflow { .. } => Err(unrepairable()),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(docs: &[(u32, u32)], total: u32) -> String {
        let documents: Vec<_> = docs
            .iter()
            .map(|(s, e)| {
                serde_json::json!({
                    "title": null,
                    "pages": [s, e],
                    "summary": format!("pages {s}-{e}"),
                    "recording_reference": null
                })
            })
            .collect();
        let body = serde_json::json!({"documents": documents, "total_pages": total});
        format!("Here you go:\n<json>\n{body}\n</json>\n")
    }

    fn ranges(result: &SegmentationResult) -> Vec<(u32, u32)> {
        result.documents.iter().map(|d| (d.pages.0, d.pages.1)).collect()
    }

    #[test]
    fn exact_partition_is_accepted() {
        let r = validate_segmentation(&reply(&[(1, 2), (3, 5)], 5), Some(5)).unwrap();
        assert_eq!(ranges(&r), [(1, 2), (3, 5)]);
    }

    #[test]
    fn documents_are_sorted_by_start() {
        let r = validate_segmentation(&reply(&[(3, 4), (1, 2)], 4), None).unwrap();
        assert_eq!(ranges(&r), [(1, 2), (3, 4)]);
        assert_eq!(r.documents[0].summary, "pages 1-2");
    }

    #[test]
    fn interior_gap_extends_earlier_document() {
        let r = validate_segmentation(&reply(&[(1, 2), (4, 4)], 4), None).unwrap();
        assert_eq!(ranges(&r), [(1, 3), (4, 4)]);
    }

    #[test]
    fn leading_gap_extends_first_document() {
        let r = validate_segmentation(&reply(&[(2, 3)], 3), None).unwrap();
        assert_eq!(ranges(&r), [(1, 3)]);
    }

    #[test]
    fn trailing_gap_extends_last_document() {
        let r = validate_segmentation(&reply(&[(1, 2), (3, 4)], 5), None).unwrap();
        assert_eq!(ranges(&r), [(1, 2), (3, 5)]);
    }

    #[test]
    fn single_page_overlap_keeps_page_in_earlier_document() {
        let r = validate_segmentation(&reply(&[(1, 3), (3, 5)], 5), None).unwrap();
        assert_eq!(ranges(&r), [(1, 3), (4, 5)]);
    }

    #[test]
    fn overlap_that_empties_later_document_fails() {
        assert!(validate_segmentation(&reply(&[(1, 3), (3, 3)], 3), None).is_err());
    }

    #[test]
    fn two_page_gap_fails() {
        let err = validate_segmentation(&reply(&[(1, 1), (4, 4)], 4), None).unwrap_err();
        assert!(err.to_string().contains("pages 2-3"), "got: {err}");
    }

    #[test]
    fn two_violations_fail() {
        assert!(validate_segmentation(&reply(&[(1, 1), (3, 3)], 4), None).is_err());
    }

    #[test]
    fn overflow_fails() {
        assert!(validate_segmentation(&reply(&[(1, 4)], 3), None).is_err());
    }

    #[test]
    fn empty_segmentation_is_valid() {
        let r = validate_segmentation(&reply(&[], 0), Some(0)).unwrap();
        assert!(r.documents.is_empty());
        assert_eq!(r.total_pages, 0);
    }

    #[test]
    fn no_documents_for_pages_fails() {
        assert!(validate_segmentation(&reply(&[], 1), None).is_err());
    }

    #[test]
    fn expected_total_mismatch_fails() {
        let err = validate_segmentation(&reply(&[(1, 2)], 2), Some(3)).unwrap_err();
        assert!(err.to_string().contains("3 page"), "got: {err}");
    }

    #[test]
    fn malformed_pages_fail() {
        for pages in ["[1]", "[1, 2, 3]", "[0, 1]", "[3, 2]", "[\"1\", 2]"] {
            let raw = format!(
                r#"<json>{{"documents":[{{"title":null,"pages":{pages},"summary":"s","recording_reference":null}}],"total_pages":3}}</json>"#
            );
            let err = validate_segmentation(&raw, None).unwrap_err();
            assert!(matches!(err, PipelineError::LlmSchemaFailure { .. }), "{pages}");
        }
    }

    #[test]
    fn missing_fields_fail() {
        assert!(validate_segmentation(r#"<json>{"total_pages": 1}</json>"#, None).is_err());
        assert!(validate_segmentation(r#"<json>{"documents": []}</json>"#, None).is_err());
    }

    #[test]
    fn unknown_document_field_fails() {
        let raw = r#"<json>{"documents":[{"title":null,"pages":[1,1],"summary":"s","recording_reference":null,"confidence":0.2}],"total_pages":1}</json>"#;
        let err = validate_segmentation(raw, None).unwrap_err();
        assert!(matches!(err, PipelineError::LlmSchemaFailure { .. }));
        assert!(err.to_string().contains("confidence"), "got: {err}");
    }

    #[test]
    fn omitted_nullable_keys_fail() {
        let raw = r#"<json>{"documents":[{"pages":[1,1],"summary":"s"}],"total_pages":1}</json>"#;
        let err = validate_segmentation(raw, None).unwrap_err();
        assert!(err.to_string().contains("missing field `title`"), "got: {err}");

        let raw = r#"<json>{"documents":[{"title":"Deed","pages":[1,1],"summary":"s"}],"total_pages":1}</json>"#;
        let err = validate_segmentation(raw, None).unwrap_err();
        assert!(
            err.to_string().contains("missing field `recording_reference`"),
            "got: {err}"
        );
    }

    #[test]
    fn explicit_nulls_are_accepted() {
        let raw = r#"<json>{"documents":[{"title":null,"pages":[1,1],"summary":"s","recording_reference":null}],"total_pages":1}</json>"#;
        let r = validate_segmentation(raw, None).unwrap();
        assert_eq!(r.documents[0].title, None);
        assert_eq!(r.documents[0].recording_reference, None);
    }

    #[test]
    fn delimiter_count_is_enforced() {
        assert!(extract_json_block("{}").is_err());
        assert!(extract_json_block("<json>{}</json><json>{}</json>").is_err());
        assert!(extract_json_block("<json>{}").is_err());
        assert_eq!(extract_json_block("x <json> {} </json> y").unwrap(), "{}");
    }

    #[test]
    fn analysis_accepts_bare_fenced_and_tagged_objects() {
        assert_eq!(parse_analysis(r#"{"a": 1}"#).unwrap()["a"], 1);
        assert_eq!(parse_analysis("```json\n{\"a\": 2}\n```").unwrap()["a"], 2);
        assert_eq!(parse_analysis("<json>{\"a\": 3}</json>").unwrap()["a"], 3);
    }

    #[test]
    fn analysis_rejects_non_objects() {
        let err = parse_analysis("[1, 2]").unwrap_err();
        assert!(err.to_string().contains("an array"));
        assert!(parse_analysis("Sure! Here is a summary.").is_err());
    }
}
