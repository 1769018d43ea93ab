// src/embeddings/mod.rs

//! Text embedding capability.
//!
//! A single enum covers the configured providers; components hold a
//! `TextEmbedder` and never branch on provider themselves. The local variant
//! is a deterministic hashed bag-of-features model used when no remote key is
//! configured, and as the degraded path when a remote embedder fails.

pub mod gemini;
pub mod openai;
pub mod sparse;

use std::time::Duration;

use tracing::info;

use crate::config::{Config, EmbeddingProvider};
use crate::error::{HivemindError, Result};

pub use sparse::SparseEncoder;

/// Deadline for remote embedding calls.
pub const EMBED_TIMEOUT: Duration = Duration::from_secs(30);

const LOCAL_DIM: usize = 384;

pub enum TextEmbedder {
    Local(LocalEmbedder),
    OpenAi(openai::OpenAiEmbeddings),
    Gemini(gemini::GeminiEmbeddings),
}

impl TextEmbedder {
    /// Build from config, falling back to the local model when the selected
    /// remote provider has no API key.
    pub fn from_config(config: &Config) -> Self {
        match config.embedding.provider {
            EmbeddingProvider::OpenAi => match &config.llm.openai_api_key {
                Some(key) => TextEmbedder::OpenAi(openai::OpenAiEmbeddings::new(
                    key.clone(),
                    config.embedding.model.clone(),
                )),
                None => {
                    info!("No OpenAI key configured; using local embeddings");
                    TextEmbedder::Local(LocalEmbedder::new(LOCAL_DIM))
                }
            },
            EmbeddingProvider::Gemini => match &config.embedding.gemini_api_key {
                Some(key) => TextEmbedder::Gemini(gemini::GeminiEmbeddings::new(
                    key.clone(),
                    config.embedding.model.clone(),
                )),
                None => {
                    info!("No Gemini key configured; using local embeddings");
                    TextEmbedder::Local(LocalEmbedder::new(LOCAL_DIM))
                }
            },
            EmbeddingProvider::Local => TextEmbedder::Local(LocalEmbedder::new(LOCAL_DIM)),
        }
    }

    pub fn dimension(&self) -> usize {
        match self {
            TextEmbedder::Local(e) => e.dimension(),
            TextEmbedder::OpenAi(e) => e.dimension(),
            TextEmbedder::Gemini(e) => e.dimension(),
        }
    }

    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        match self {
            TextEmbedder::Local(e) => Ok(e.embed(text)),
            TextEmbedder::OpenAi(e) => with_deadline(e.embed(text)).await,
            TextEmbedder::Gemini(e) => with_deadline(e.embed(text)).await,
        }
    }

    pub async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        match self {
            TextEmbedder::Local(e) => Ok(texts.iter().map(|t| e.embed(t)).collect()),
            TextEmbedder::OpenAi(e) => with_deadline(e.embed_batch(texts)).await,
            TextEmbedder::Gemini(e) => with_deadline(e.embed_batch(texts)).await,
        }
    }
}

async fn with_deadline<T>(fut: impl std::future::Future<Output = Result<T>>) -> Result<T> {
    match tokio::time::timeout(EMBED_TIMEOUT, fut).await {
        Ok(result) => result,
        Err(_) => Err(HivemindError::Timeout {
            service: "embedder",
            seconds: EMBED_TIMEOUT.as_secs(),
        }),
    }
}

/// Deterministic hashed bag-of-features embedder.
///
/// Tokens are hashed into a fixed-width vector with sign hashing and the
/// result is L2-normalized, so cosine similarity behaves sensibly for
/// lexical overlap. Cheap, offline, and stable across runs.
pub struct LocalEmbedder {
    dim: usize,
}

impl LocalEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    pub fn dimension(&self) -> usize {
        self.dim
    }

    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dim];

        for token in sparse::tokenize(text) {
            let h = fnv1a(token.as_bytes());
            let bucket = (h % self.dim as u64) as usize;
            // Second hash decides the sign to reduce bucket collisions bias
            let sign = if (h >> 32) & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

pub(crate) fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_embeddings_are_deterministic_and_normalized() {
        let embedder = LocalEmbedder::new(384);
        let a = embedder.embed("the cache invalidation strategy");
        let b = embedder.embed("the cache invalidation strategy");
        assert_eq!(a, b);

        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn similar_texts_score_higher_than_unrelated() {
        let embedder = LocalEmbedder::new(384);
        let caching = embedder.embed("we decided to use redis for caching sessions");
        let caching2 = embedder.embed("redis caching of sessions was the decision");
        let cooking = embedder.embed("my favorite pasta recipe needs basil");

        let related = cosine_similarity(&caching, &caching2);
        let unrelated = cosine_similarity(&caching, &cooking);
        assert!(related > unrelated, "{related} should exceed {unrelated}");
    }

    #[test]
    fn empty_text_embeds_to_zero_vector() {
        let embedder = LocalEmbedder::new(16);
        let v = embedder.embed("");
        assert!(v.iter().all(|x| *x == 0.0));
    }
}
