// src/documents/mod.rs

//! Attachment processing pipeline.
//!
//! Runs only in workers: validate (whitelist, size) -> download from the CDN
//! -> extract per kind -> chunk -> return chunks for indexing. Any violation
//! fails the whole item; there are no partial successes.

pub mod chunker;
pub mod markdown;
pub mod pdf;

use std::time::Duration;

use reqwest::Client;
use tracing::{debug, info};

use crate::error::{HivemindError, Result};
use crate::llm::LlmClient;
use crate::store::attachments::AttachmentRow;
pub use chunker::Chunk;

/// Hard ceiling on attachment payloads.
pub const MAX_FILE_SIZE: i64 = 10 * 1024 * 1024;

/// Deadline covering download plus extraction.
pub const PROCESS_TIMEOUT: Duration = Duration::from_secs(300);

const ALLOWED_EXTENSIONS: &[&str] = &["pdf", "txt", "md", "png", "jpg", "jpeg", "gif", "webp"];
const BLOCKED_EXTENSIONS: &[&str] = &["exe", "bat", "sh", "ps1", "dll", "so", "bin"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceType {
    Pdf,
    Markdown,
    Text,
    Image,
    Document,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Pdf => "pdf",
            SourceType::Markdown => "markdown",
            SourceType::Text => "text",
            SourceType::Image => "image",
            SourceType::Document => "document",
        }
    }
}

#[derive(Debug)]
pub struct ProcessedDocument {
    pub source_type: SourceType,
    pub extracted_text: Option<String>,
    /// Vision caption for images.
    pub description: Option<String>,
    pub chunks: Vec<Chunk>,
}

fn extension(filename: &str) -> String {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Reject before any bytes move. `Ok(())` means the file may be downloaded.
pub fn validate(filename: &str, size_bytes: i64) -> Result<()> {
    if size_bytes > MAX_FILE_SIZE {
        return Err(HivemindError::Exhausted(format!(
            "file too large: {size_bytes} bytes (max {MAX_FILE_SIZE})"
        )));
    }

    let ext = extension(filename);
    if BLOCKED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(HivemindError::Validation(format!("blocked file type: .{ext}")));
    }
    if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(HivemindError::Validation(format!(
            "unsupported file type: .{ext}"
        )));
    }
    Ok(())
}

pub fn detect_source_type(filename: &str, content_type: Option<&str>) -> SourceType {
    let ext = extension(filename);
    let content_type = content_type.unwrap_or("").to_ascii_lowercase();

    if ext == "pdf" || content_type.contains("pdf") {
        SourceType::Pdf
    } else if ext == "md" || content_type.contains("markdown") {
        SourceType::Markdown
    } else if ext == "txt" || content_type.contains("text/plain") {
        SourceType::Text
    } else if ["png", "jpg", "jpeg", "gif", "webp"].contains(&ext.as_str())
        || content_type.starts_with("image/")
    {
        SourceType::Image
    } else {
        SourceType::Document
    }
}

pub struct DocumentProcessor {
    http: Client,
}

impl DocumentProcessor {
    pub fn new() -> Self {
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
        }
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| HivemindError::upstream("cdn", e))?;
        if !response.status().is_success() {
            return Err(HivemindError::upstream(
                "cdn",
                format!("download failed with status {}", response.status()),
            ));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| HivemindError::upstream("cdn", e))?;

        if bytes.len() as i64 > MAX_FILE_SIZE {
            return Err(HivemindError::Exhausted(format!(
                "downloaded payload exceeds limit: {} bytes",
                bytes.len()
            )));
        }
        Ok(bytes.to_vec())
    }

    /// Full pipeline for one attachment. Errors leave the attachment FAILED.
    pub async fn process(
        &self,
        attachment: &AttachmentRow,
        vision: &LlmClient,
    ) -> Result<ProcessedDocument> {
        validate(&attachment.filename, attachment.size_bytes)?;
        let source_type = detect_source_type(&attachment.filename, attachment.content_type.as_deref());

        info!(
            "Processing attachment {} ({}, {} bytes)",
            attachment.filename,
            source_type.as_str(),
            attachment.size_bytes
        );

        match source_type {
            SourceType::Image => self.process_image(attachment, vision).await,
            SourceType::Pdf => {
                let bytes = self.download(&attachment.url).await?;
                self.process_pdf(&bytes, &attachment.filename)
            }
            SourceType::Markdown => {
                let bytes = self.download(&attachment.url).await?;
                let text = chunker::decode_text(&bytes);
                let chunks = markdown::chunk_markdown(&text, &attachment.filename);
                Ok(ProcessedDocument {
                    source_type,
                    extracted_text: Some(text),
                    description: None,
                    chunks,
                })
            }
            SourceType::Text => {
                let bytes = self.download(&attachment.url).await?;
                let text = chunker::decode_text(&bytes);
                let chunks = chunker::recursive_chunk(&text, &attachment.filename);
                Ok(ProcessedDocument {
                    source_type,
                    extracted_text: Some(text),
                    description: None,
                    chunks,
                })
            }
            SourceType::Document => Err(HivemindError::Validation(format!(
                "no processor for {}",
                attachment.filename
            ))),
        }
    }

    fn process_pdf(&self, bytes: &[u8], filename: &str) -> Result<ProcessedDocument> {
        let text = pdf::extract_text(bytes)?;

        if text.trim().is_empty() {
            // Scanned PDF with no text layer; OCR is deferred.
            return Err(HivemindError::Validation(
                "scanned PDF detected (no text layer); OCR not supported".to_string(),
            ));
        }

        let chunks = chunker::recursive_chunk(&text, filename);
        debug!("PDF {} extracted into {} chunks", filename, chunks.len());
        Ok(ProcessedDocument {
            source_type: SourceType::Pdf,
            extracted_text: Some(text),
            description: None,
            chunks,
        })
    }

    /// Caption the image with the vision model and treat the caption as the
    /// document body. Pixels are never embedded or stored.
    async fn process_image(
        &self,
        attachment: &AttachmentRow,
        vision: &LlmClient,
    ) -> Result<ProcessedDocument> {
        let description = vision.describe_image(&attachment.url).await?;
        if description.trim().is_empty() {
            return Err(HivemindError::upstream("llm", "empty image description"));
        }

        let chunks = vec![Chunk {
            text: description.clone(),
            index: 0,
            kind: "image_caption",
            heading_context: Some(format!("Image: {}", attachment.filename)),
        }];

        Ok(ProcessedDocument {
            source_type: SourceType::Image,
            extracted_text: None,
            description: Some(description),
            chunks,
        })
    }
}

impl Default for DocumentProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_limit_is_accepted_one_byte_over_is_rejected() {
        assert!(validate("report.pdf", MAX_FILE_SIZE).is_ok());
        let err = validate("report.pdf", MAX_FILE_SIZE + 1).unwrap_err();
        assert!(matches!(err, HivemindError::Exhausted(_)));
    }

    #[test]
    fn executables_are_blocked() {
        for name in ["payload.exe", "run.sh", "lib.so", "script.ps1", "x.bat"] {
            let err = validate(name, 10).unwrap_err();
            assert!(matches!(err, HivemindError::Validation(_)), "{name}");
        }
    }

    #[test]
    fn unknown_extensions_are_rejected_not_defaulted() {
        assert!(validate("archive.zip", 10).is_err());
        assert!(validate("noextension", 10).is_err());
    }

    #[test]
    fn source_type_detection_prefers_extension() {
        assert_eq!(detect_source_type("a.pdf", None), SourceType::Pdf);
        assert_eq!(detect_source_type("b.md", None), SourceType::Markdown);
        assert_eq!(detect_source_type("c.txt", None), SourceType::Text);
        assert_eq!(detect_source_type("d.webp", None), SourceType::Image);
        assert_eq!(
            detect_source_type("e.dat", Some("image/png")),
            SourceType::Image
        );
        assert_eq!(detect_source_type("f.dat", None), SourceType::Document);
    }
}
