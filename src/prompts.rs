//! Built-in prompts and the response delimiter convention.
//!
//! Segmentation responses must wrap their JSON in exactly one
//! [`JSON_OPEN_TAG`] … [`JSON_CLOSE_TAG`] block. The validator in
//! [`crate::pipeline::validate`] relies on that convention, so the template
//! below states it explicitly and any custom segmentation prompt should too.
//!
//! Callers override these through [`crate::config::LlmConfig`]; the constants
//! are used only when no override is set.

/// Opening delimiter of the JSON payload in a segmentation response.
pub const JSON_OPEN_TAG: &str = "<json>";
/// Closing delimiter of the JSON payload in a segmentation response.
pub const JSON_CLOSE_TAG: &str = "</json>";

/// System message for free-form analysis (`summarize`).
pub const ANALYSIS_SYSTEM_PROMPT: &str = "You analyze OCR text and return structured JSON data.";

/// Default analysis instruction.
pub const DEFAULT_ANALYSIS_PROMPT: &str = "Extract and summarize the key information from this OCR text. \
Include names, dates, locations, and main topics. \
If there are tables, extract their data in a structured format.";

/// System message for segmentation.
pub const SEGMENT_SYSTEM_PROMPT: &str =
    "You segment multi-page OCR text into separate real-estate documents and return JSON.";

/// Default segmentation instruction. The OCR text is appended after a blank line.
pub const DEFAULT_SEGMENT_PROMPT: &str = r#"The text below is the OCR output of one scanned PDF that may contain several
recorded real-estate instruments (deeds, mortgages, releases, easements, plats,
affidavits, ...). Each page is wrapped in <page number N> ... </page number N>
tags.

Split the PDF into its individual documents.

Rules:
1. Every page from 1 to the last page belongs to exactly one document.
2. Documents are listed in page order; page ranges never overlap.
3. A page that continues the previous instrument (exhibits, legal descriptions,
   signature and notary pages) belongs to that earlier document.
4. "title" is the instrument type as written on the document, or null.
5. "summary" is one or two sentences naming the parties and the property.
6. "recording_reference" is the book/page, instrument or document number
   stamped by the recorder, or null when none is visible.

Respond with exactly one JSON object wrapped in <json> and </json> tags and
nothing else inside the tags:

<json>
{
  "documents": [
    {
      "title": "Warranty Deed",
      "pages": [1, 3],
      "summary": "John Smith conveys Lot 4, Block 2 of Oak Hills to Mary Jones.",
      "recording_reference": "Book 1234, Page 56"
    }
  ],
  "total_pages": 3
}
</json>"#;

/// Build the user message for free-form analysis.
pub fn analysis_user_content(prompt: &str, text: &str) -> String {
    format!("{prompt}\n\nHere is the text to analyze:\n\n{text}")
}

/// Build the user message for segmentation.
pub fn segment_user_content(prompt: &str, text: &str) -> String {
    format!("{prompt}\n\n{text}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_prompt_documents_delimiters() {
        assert!(DEFAULT_SEGMENT_PROMPT.contains(JSON_OPEN_TAG));
        assert!(DEFAULT_SEGMENT_PROMPT.contains(JSON_CLOSE_TAG));
        assert!(DEFAULT_SEGMENT_PROMPT.contains("total_pages"));
        assert!(DEFAULT_SEGMENT_PROMPT.contains("recording_reference"));
    }

    #[test]
    fn analysis_content_layout() {
        let content = analysis_user_content("Summarize.", "GRANTOR: Smith");
        assert!(content.starts_with("Summarize.\n\nHere is the text to analyze:"));
        assert!(content.ends_with("GRANTOR: Smith"));
    }

    #[test]
    fn segment_content_layout() {
        assert_eq!(segment_user_content("P", "T"), "P\n\nT");
    }
}
