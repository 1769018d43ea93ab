// src/embeddings/sparse.rs

//! Local BM25 sparse encoder for the hybrid collection.
//!
//! Tokens are hashed into a u32 vocabulary space; values carry BM25 term
//! saturation. Query and passage encodings use the same tokenizer so index
//! keys line up. No network dependency.

use std::collections::HashMap;

use super::fnv1a;

/// BM25 parameters, the usual defaults.
const K1: f32 = 1.2;
const B: f32 = 0.75;
/// Assumed average document length in tokens for length normalization.
const AVG_DOC_LEN: f32 = 48.0;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "has", "have", "i",
    "in", "is", "it", "its", "of", "on", "or", "that", "the", "this", "to", "was", "we", "were",
    "what", "when", "which", "who", "will", "with", "you", "your",
];

#[derive(Debug, Clone, PartialEq)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

impl SparseVector {
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Lowercased alphanumeric tokens, stopwords removed, single chars dropped.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 1 && !STOPWORDS.contains(t))
        .map(String::from)
        .collect()
}

pub struct SparseEncoder;

impl SparseEncoder {
    pub fn new() -> Self {
        Self
    }

    /// Passage encoding: BM25 term weights with length normalization.
    pub fn encode_passage(&self, text: &str) -> SparseVector {
        let tokens = tokenize(text);
        let doc_len = tokens.len() as f32;

        let mut counts: HashMap<u32, f32> = HashMap::new();
        for token in &tokens {
            let index = (fnv1a(token.as_bytes()) & 0xffff_ffff) as u32;
            *counts.entry(index).or_insert(0.0) += 1.0;
        }

        let mut entries: Vec<(u32, f32)> = counts
            .into_iter()
            .map(|(index, tf)| {
                let weight =
                    tf * (K1 + 1.0) / (tf + K1 * (1.0 - B + B * doc_len / AVG_DOC_LEN));
                (index, weight)
            })
            .collect();
        entries.sort_by_key(|(index, _)| *index);

        SparseVector {
            indices: entries.iter().map(|(i, _)| *i).collect(),
            values: entries.iter().map(|(_, v)| *v).collect(),
        }
    }

    /// Query encoding: raw term presence, deduplicated.
    pub fn encode_query(&self, text: &str) -> SparseVector {
        let mut counts: HashMap<u32, f32> = HashMap::new();
        for token in tokenize(text) {
            let index = (fnv1a(token.as_bytes()) & 0xffff_ffff) as u32;
            *counts.entry(index).or_insert(0.0) += 1.0;
        }

        let mut entries: Vec<(u32, f32)> = counts.into_iter().collect();
        entries.sort_by_key(|(index, _)| *index);

        SparseVector {
            indices: entries.iter().map(|(i, _)| *i).collect(),
            values: entries.iter().map(|(_, v)| *v).collect(),
        }
    }
}

impl Default for SparseEncoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizer_strips_stopwords_and_punctuation() {
        let tokens = tokenize("The cache, and the INVALIDATION strategy!");
        assert_eq!(tokens, vec!["cache", "invalidation", "strategy"]);
    }

    #[test]
    fn query_and_passage_share_index_space() {
        let encoder = SparseEncoder::new();
        let query = encoder.encode_query("redis caching");
        let passage = encoder.encode_passage("we moved session caching onto redis last sprint");

        let overlap: Vec<u32> = query
            .indices
            .iter()
            .filter(|i| passage.indices.contains(i))
            .copied()
            .collect();
        assert_eq!(overlap.len(), 2, "both query terms should hit the passage");
    }

    #[test]
    fn repeated_terms_saturate() {
        let encoder = SparseEncoder::new();
        let once = encoder.encode_passage("migration");
        let many = encoder.encode_passage("migration migration migration migration");

        assert_eq!(once.indices, many.indices);
        // BM25 saturates: 4 occurrences are worth less than 4x one occurrence.
        assert!(many.values[0] < once.values[0] * 4.0);
        assert!(many.values[0] > once.values[0]);
    }

    #[test]
    fn empty_text_encodes_empty() {
        let encoder = SparseEncoder::new();
        assert!(encoder.encode_query("").is_empty());
        assert!(encoder.encode_passage("the a of").is_empty());
    }
}
