// src/documents/pdf.rs
// PDF text extraction.

use crate::error::{HivemindError, Result};

/// Extract the text layer of a PDF. Page texts are joined with blank lines,
/// matching the paragraph chunker's split points.
pub fn extract_text(bytes: &[u8]) -> Result<String> {
    let text = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| HivemindError::Validation(format!("PDF extraction failed: {e}")))?;

    // Collapse the extractor's page markers into plain paragraph breaks.
    let cleaned = text
        .split('\u{c}')
        .map(str::trim)
        .filter(|page| !page.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");

    Ok(cleaned)
}
