// src/documents/chunker.rs

//! Recursive character chunking: paragraphs first, sized at ~1000 chars
//! with 200-char overlap carried between chunks.

use once_cell::sync::Lazy;
use regex::Regex;

pub const CHUNK_SIZE: usize = 1000;
pub const CHUNK_OVERLAP: usize = 200;

static PARAGRAPH_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\n+").expect("valid regex"));

#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub index: i64,
    pub kind: &'static str,
    pub heading_context: Option<String>,
}

/// Split text into overlapping paragraph chunks.
pub fn recursive_chunk(text: &str, filename: &str) -> Vec<Chunk> {
    let text = text.trim();
    if text.is_empty() {
        return vec![];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut index = 0i64;

    for paragraph in PARAGRAPH_SPLIT.split(text) {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }

        if current.len() + paragraph.len() + 2 > CHUNK_SIZE {
            if !current.is_empty() {
                chunks.push(Chunk {
                    text: current.trim().to_string(),
                    index,
                    kind: "paragraph",
                    heading_context: Some(format!("From: {filename}")),
                });
                index += 1;

                // Carry the chunk tail so context spans the boundary.
                let overlap = tail_chars(&current, CHUNK_OVERLAP);
                current = format!("{overlap} {paragraph}");
            } else {
                current = paragraph.to_string();
            }
        } else if current.is_empty() {
            current = paragraph.to_string();
        } else {
            current.push_str("\n\n");
            current.push_str(paragraph);
        }
    }

    if !current.trim().is_empty() {
        chunks.push(Chunk {
            text: current.trim().to_string(),
            index,
            kind: "paragraph",
            heading_context: Some(format!("From: {filename}")),
        });
    }

    chunks
}

fn tail_chars(text: &str, count: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= count {
        return text.to_string();
    }
    chars[chars.len() - count..].iter().collect()
}

/// UTF-8 decode with latin-1 fallback.
pub fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        // latin-1 maps every byte to the code point of the same value.
        Err(_) => bytes.iter().map(|b| *b as char).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_chunk() {
        let chunks = recursive_chunk("a single paragraph", "notes.txt");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].kind, "paragraph");
        assert_eq!(chunks[0].heading_context.as_deref(), Some("From: notes.txt"));
    }

    #[test]
    fn long_text_splits_with_overlap() {
        let paragraph = "word ".repeat(120); // ~600 chars
        let text = format!("{paragraph}\n\n{paragraph}\n\n{paragraph}");
        let chunks = recursive_chunk(&text, "long.txt");
        assert!(chunks.len() >= 2);

        // Overlap: the head of chunk 2 repeats the tail of chunk 1.
        let tail: String = tail_chars(&chunks[0].text, 50);
        assert!(chunks[1].text.contains(tail.trim()));
    }

    #[test]
    fn indices_are_sequential() {
        let text = "p1 ".repeat(400) + "\n\n" + &"p2 ".repeat(400);
        let chunks = recursive_chunk(&text, "f.txt");
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i as i64);
        }
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(recursive_chunk("   \n\n  ", "f.txt").is_empty());
    }

    #[test]
    fn latin1_fallback_decodes_every_byte() {
        let bytes = vec![0x63, 0x61, 0x66, 0xe9]; // "café" in latin-1
        assert_eq!(decode_text(&bytes), "café");
    }
}
