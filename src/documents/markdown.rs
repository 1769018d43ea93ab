// src/documents/markdown.rs

//! Header-aware markdown chunking.
//!
//! Content between headings becomes a chunk carrying its nearest heading as
//! `heading_context`, so retrieval can show where in the document a chunk
//! came from.

use pulldown_cmark::{Event, Parser, Tag, TagEnd};

use super::chunker::Chunk;

pub fn chunk_markdown(text: &str, filename: &str) -> Vec<Chunk> {
    let parser = Parser::new(text);

    let mut chunks = Vec::new();
    let mut current_heading: Option<String> = None;
    let mut heading_buffer: Option<String> = None;
    let mut content = String::new();
    let mut index = 0i64;

    let mut flush =
        |content: &mut String, heading: &Option<String>, index: &mut i64, chunks: &mut Vec<Chunk>| {
            let text = content.trim().to_string();
            content.clear();
            if text.is_empty() {
                return;
            }
            chunks.push(Chunk {
                text,
                index: *index,
                kind: "text",
                heading_context: Some(
                    heading.clone().unwrap_or_else(|| format!("From: {filename}")),
                ),
            });
            *index += 1;
        };

    for event in parser {
        match event {
            Event::Start(Tag::Heading { .. }) => {
                flush(&mut content, &current_heading, &mut index, &mut chunks);
                heading_buffer = Some(String::new());
            }
            Event::End(TagEnd::Heading(_)) => {
                if let Some(heading) = heading_buffer.take() {
                    let heading = heading.trim().to_string();
                    if !heading.is_empty() {
                        current_heading = Some(heading);
                    }
                }
            }
            Event::Text(text) | Event::Code(text) => {
                match heading_buffer.as_mut() {
                    Some(buffer) => buffer.push_str(&text),
                    None => content.push_str(&text),
                }
            }
            Event::SoftBreak | Event::HardBreak => {
                if heading_buffer.is_none() {
                    content.push('\n');
                }
            }
            Event::End(TagEnd::Paragraph) | Event::End(TagEnd::Item) => {
                content.push('\n');
            }
            _ => {}
        }
    }

    flush(&mut content, &current_heading, &mut index, &mut chunks);
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sections_carry_their_heading() {
        let md = "# Setup\nInstall the thing.\n\n# Usage\nRun the thing.\n";
        let chunks = chunk_markdown(md, "guide.md");
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].heading_context.as_deref(), Some("Setup"));
        assert!(chunks[0].text.contains("Install"));
        assert_eq!(chunks[1].heading_context.as_deref(), Some("Usage"));
    }

    #[test]
    fn preamble_before_first_heading_uses_filename() {
        let md = "intro line\n\n## Details\nbody\n";
        let chunks = chunk_markdown(md, "doc.md");
        assert_eq!(chunks[0].heading_context.as_deref(), Some("From: doc.md"));
        assert_eq!(chunks[1].heading_context.as_deref(), Some("Details"));
    }

    #[test]
    fn nested_headings_track_the_nearest() {
        let md = "# Top\na\n\n## Inner\nb\n\n### Deep\nc\n";
        let chunks = chunk_markdown(md, "n.md");
        let headings: Vec<&str> = chunks
            .iter()
            .map(|c| c.heading_context.as_deref().unwrap())
            .collect();
        assert_eq!(headings, vec!["Top", "Inner", "Deep"]);
    }

    #[test]
    fn empty_markdown_yields_no_chunks() {
        assert!(chunk_markdown("", "e.md").is_empty());
        assert!(chunk_markdown("# Only Heading\n", "e.md").is_empty());
    }
}
