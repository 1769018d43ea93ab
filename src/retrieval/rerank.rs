// src/retrieval/rerank.rs

//! Lightweight rerank pass over fused candidates.
//!
//! Candidate texts are embedded and scored by cosine similarity against the
//! query vector; the final ordering blends 0.6 * rerank + 0.4 * fusion. Only
//! the reranker uses this blend - prefetch merging is pure RRF.

use crate::embeddings::{TextEmbedder, cosine_similarity};
use crate::error::Result;
use crate::vector::SearchHit;

pub const RERANK_WEIGHT: f32 = 0.6;
pub const FUSION_WEIGHT: f32 = 0.4;

fn candidate_text(hit: &SearchHit) -> Option<String> {
    for key in ["text", "content", "summary"] {
        if let Some(value) = hit.payload_str(key) {
            if !value.is_empty() {
                return Some(crate::util::truncate_chars(value, 1000));
            }
        }
    }
    None
}

/// Re-score and reorder `hits`, returning the top `limit`.
pub async fn rerank(
    embedder: &TextEmbedder,
    query_embedding: &[f32],
    mut hits: Vec<SearchHit>,
    limit: usize,
) -> Result<Vec<SearchHit>> {
    if hits.len() <= 1 {
        hits.truncate(limit);
        return Ok(hits);
    }

    let texts: Vec<Option<String>> = hits.iter().map(candidate_text).collect();
    let present: Vec<String> = texts.iter().flatten().cloned().collect();
    if present.is_empty() {
        hits.truncate(limit);
        return Ok(hits);
    }

    let embeddings = embedder.embed_many(&present).await?;

    let mut embedded = embeddings.into_iter();
    for (hit, text) in hits.iter_mut().zip(&texts) {
        if text.is_some() {
            if let Some(candidate) = embedded.next() {
                let similarity = cosine_similarity(query_embedding, &candidate);
                hit.score = RERANK_WEIGHT * similarity + FUSION_WEIGHT * hit.score;
            }
        }
    }

    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    hits.truncate(limit);
    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::LocalEmbedder;

    fn hit(id: &str, score: f32, content: &str) -> SearchHit {
        SearchHit {
            id: id.to_string(),
            score,
            payload: serde_json::json!({ "content": content }),
        }
    }

    #[tokio::test]
    async fn relevant_content_overtakes_higher_fusion_score() {
        let local = LocalEmbedder::new(384);
        let embedder = TextEmbedder::Local(LocalEmbedder::new(384));
        let query_embedding = local.embed("redis caching decision");

        let hits = vec![
            hit("off-topic", 0.9, "weekend plans hiking trip mountains"),
            hit("on-topic", 0.5, "redis caching decision for the session layer"),
        ];

        let reranked = rerank(&embedder, &query_embedding, hits, 2).await.unwrap();
        assert_eq!(reranked[0].id, "on-topic");
    }

    #[tokio::test]
    async fn single_hit_passes_through() {
        let embedder = TextEmbedder::Local(LocalEmbedder::new(384));
        let hits = vec![hit("only", 0.3, "anything")];
        let reranked = rerank(&embedder, &[0.0; 384], hits, 5).await.unwrap();
        assert_eq!(reranked.len(), 1);
        assert_eq!(reranked[0].score, 0.3);
    }
}
