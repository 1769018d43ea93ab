// src/retrieval/rewrite.rs

//! Light query preprocessing before embedding.
//!
//! Attachment markers like `[Attachments: report.pdf]` are stripped, and
//! queries that mention files get a document bias: an extra prefetch
//! restricted to document source types whose results merge preferentially.

use once_cell::sync::Lazy;
use regex::Regex;

static ATTACHMENT_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\[Attachments?:\s*([^\]]+)\]").expect("valid regex"));

static FILE_KEYWORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(file|document|pdf|report|attachment|attached|uploaded)\b")
        .expect("valid regex")
});

/// Source types the document bias restricts to.
pub const DOCUMENT_SOURCE_TYPES: &[&str] = &["pdf", "markdown", "text", "image"];

#[derive(Debug, Clone)]
pub struct RewrittenQuery {
    /// Query with attachment markers removed; used for embedding.
    pub clean: String,
    /// Whether a document-biased prefetch should be issued.
    pub document_bias: bool,
}

pub fn rewrite_query(query: &str) -> RewrittenQuery {
    let had_marker = ATTACHMENT_MARKER.is_match(query);
    let clean = ATTACHMENT_MARKER.replace_all(query, "").trim().to_string();

    let mentions_file = FILE_KEYWORDS.is_match(&clean);

    RewrittenQuery {
        document_bias: had_marker || mentions_file,
        clean: if clean.is_empty() {
            query.to_string()
        } else {
            clean
        },
    }
}

pub fn document_source_types() -> Vec<String> {
    DOCUMENT_SOURCE_TYPES.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_attachment_marker() {
        let rewritten = rewrite_query("what does it say? [Attachments: q3-report.pdf]");
        assert_eq!(rewritten.clean, "what does it say?");
        assert!(rewritten.document_bias);
    }

    #[test]
    fn file_keywords_trigger_bias_without_marker() {
        let rewritten = rewrite_query("summarize the uploaded report");
        assert!(rewritten.document_bias);
        assert_eq!(rewritten.clean, "summarize the uploaded report");
    }

    #[test]
    fn plain_chat_query_gets_no_bias() {
        let rewritten = rewrite_query("what did we decide about caching?");
        assert!(!rewritten.document_bias);
    }

    #[test]
    fn marker_only_query_falls_back_to_original() {
        let rewritten = rewrite_query("[Attachments: notes.md]");
        assert!(rewritten.document_bias);
        assert!(!rewritten.clean.is_empty());
    }
}
