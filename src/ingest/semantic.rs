// src/ingest/semantic.rs

//! Semantic refinement (second pass) of the hybrid sessionizer.
//!
//! Sessions larger than the split threshold get per-message embeddings;
//! consecutive cosine similarities below a percentile cutoff become
//! breakpoints. Size bounds are enforced afterwards: undersized trailing
//! fragments merge into their predecessor, oversized sessions hard-split
//! evenly.

use tracing::debug;

use super::sessionizer::{DraftSession, SessionMessage, sessionize};
use crate::embeddings::{TextEmbedder, cosine_similarity};
use crate::error::Result;

pub const DEFAULT_SPLIT_THRESHOLD: usize = 15;
pub const DEFAULT_MIN_SESSION_SIZE: usize = 2;
pub const DEFAULT_MAX_SESSION_SIZE: usize = 30;
/// Breakpoints land where similarity drops into the bottom 10% of the session.
pub const DEFAULT_PERCENTILE: f64 = 10.0;

#[derive(Debug, Clone, Copy)]
pub struct HybridOptions {
    pub gap_minutes: i64,
    pub split_threshold: usize,
    pub min_size: usize,
    pub max_size: usize,
    pub percentile: f64,
}

impl Default for HybridOptions {
    fn default() -> Self {
        Self {
            gap_minutes: super::sessionizer::DEFAULT_GAP_MINUTES,
            split_threshold: DEFAULT_SPLIT_THRESHOLD,
            min_size: DEFAULT_MIN_SESSION_SIZE,
            max_size: DEFAULT_MAX_SESSION_SIZE,
            percentile: DEFAULT_PERCENTILE,
        }
    }
}

/// Consecutive-pair similarities: N embeddings yield N-1 scores.
pub fn consecutive_similarities(embeddings: &[Vec<f32>]) -> Vec<f32> {
    embeddings
        .windows(2)
        .map(|pair| cosine_similarity(&pair[0], &pair[1]))
        .collect()
}

/// Inclusive lower percentile over `values` (nearest-rank).
pub fn percentile_cutoff(values: &[f32], percentile: f64) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let rank = ((percentile / 100.0) * (sorted.len() - 1) as f64).round() as usize;
    sorted[rank.min(sorted.len() - 1)]
}

/// Indices to split AFTER (i.e. message i+1 starts a new chunk) where the
/// similarity drops below the percentile cutoff.
pub fn find_breakpoints(similarities: &[f32], percentile: f64) -> Vec<usize> {
    if similarities.len() < 3 {
        return vec![];
    }
    let cutoff = percentile_cutoff(similarities, percentile);
    similarities
        .iter()
        .enumerate()
        .filter(|(_, s)| **s < cutoff)
        .map(|(i, _)| i + 1)
        .collect()
}

/// Enforce min/max size bounds over split chunks of one session.
/// An undersized trailing fragment merges into its predecessor; oversized
/// chunks are hard-split evenly.
pub fn enforce_size_bounds(
    mut chunks: Vec<Vec<SessionMessage>>,
    min_size: usize,
    max_size: usize,
) -> Vec<Vec<SessionMessage>> {
    // Merge undersized trailing fragment first.
    if chunks.len() >= 2 {
        let last_len = chunks.last().map(Vec::len).unwrap_or(0);
        if last_len < min_size {
            let fragment = chunks.pop().expect("checked non-empty");
            chunks
                .last_mut()
                .expect("predecessor exists")
                .extend(fragment);
        }
    }

    let mut bounded = Vec::new();
    for chunk in chunks {
        if chunk.len() <= max_size {
            if chunk.len() >= min_size {
                bounded.push(chunk);
            } else if let Some(previous) = bounded.last_mut() {
                previous.extend(chunk);
            }
            continue;
        }

        // Even hard-split: ceil(n / max) pieces of near-equal size.
        let pieces = chunk.len().div_ceil(max_size);
        let base = chunk.len() / pieces;
        let remainder = chunk.len() % pieces;
        let mut start = 0;
        for i in 0..pieces {
            let size = base + usize::from(i < remainder);
            let piece: Vec<SessionMessage> = chunk[start..start + size].to_vec();
            start += size;
            if piece.len() >= min_size {
                bounded.push(piece);
            } else if let Some(previous) = bounded.last_mut() {
                previous.extend(piece);
            }
        }
    }
    bounded
}

/// Hybrid sessionization: time-based first, semantic refinement of large
/// sessions second.
pub async fn hybrid_sessionize(
    embedder: &TextEmbedder,
    messages: Vec<SessionMessage>,
    options: HybridOptions,
) -> Result<Vec<DraftSession>> {
    let time_sessions = sessionize(messages, options.gap_minutes);

    let mut refined = Vec::new();
    for session in time_sessions {
        if session.len() < options.split_threshold {
            if session.len() >= options.min_size {
                refined.push(session);
            }
            continue;
        }

        let chunks = split_semantically(embedder, &session, &options).await?;
        for chunk in chunks {
            if chunk.len() >= options.min_size {
                refined.push(DraftSession {
                    channel_id: session.channel_id,
                    messages: chunk,
                });
            }
        }
    }

    Ok(refined)
}

async fn split_semantically(
    embedder: &TextEmbedder,
    session: &DraftSession,
    options: &HybridOptions,
) -> Result<Vec<Vec<SessionMessage>>> {
    let contents: Vec<String> = session.messages.iter().map(|m| m.content.clone()).collect();

    let embeddings = match embedder.embed_many(&contents).await {
        Ok(embeddings) => embeddings,
        Err(e) => {
            // Degraded path: size-only split keeps the pipeline moving.
            debug!("Semantic split unavailable ({}), splitting by size", e);
            return Ok(enforce_size_bounds(
                vec![session.messages.clone()],
                options.min_size,
                options.max_size,
            ));
        }
    };

    let similarities = consecutive_similarities(&embeddings);
    let breakpoints = find_breakpoints(&similarities, options.percentile);

    let mut chunks = Vec::new();
    let mut start = 0;
    for bp in breakpoints {
        if bp > start && bp - start >= options.min_size {
            chunks.push(session.messages[start..bp].to_vec());
            start = bp;
        }
    }
    if start < session.messages.len() {
        chunks.push(session.messages[start..].to_vec());
    }

    Ok(enforce_size_bounds(chunks, options.min_size, options.max_size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::LocalEmbedder;
    use chrono::DateTime;

    fn msg(id: i64, content: &str) -> SessionMessage {
        SessionMessage {
            id,
            channel_id: 1,
            author_id: 100,
            content: content.to_string(),
            timestamp: DateTime::from_timestamp(1_700_000_000 + id * 60, 0).unwrap(),
            reply_target_id: None,
        }
    }

    #[test]
    fn percentile_cutoff_picks_low_tail() {
        let values = vec![0.9, 0.8, 0.85, 0.1, 0.88, 0.92, 0.87, 0.9, 0.86, 0.89, 0.91];
        let cutoff = percentile_cutoff(&values, 10.0);
        assert!(cutoff < 0.8, "cutoff {cutoff} should sit near the low outlier");
    }

    #[test]
    fn breakpoints_need_at_least_three_similarities() {
        assert!(find_breakpoints(&[0.1, 0.9], 10.0).is_empty());
    }

    #[test]
    fn oversized_chunk_hard_splits_evenly() {
        let messages: Vec<SessionMessage> =
            (0..31).map(|i| msg(i, &format!("m{i}"))).collect();
        let bounded = enforce_size_bounds(vec![messages], 2, 30);
        assert_eq!(bounded.len(), 2);
        assert_eq!(bounded[0].len(), 16);
        assert_eq!(bounded[1].len(), 15);
    }

    #[test]
    fn undersized_trailing_fragment_merges_into_predecessor() {
        let a: Vec<SessionMessage> = (0..5).map(|i| msg(i, "topic one")).collect();
        let b: Vec<SessionMessage> = vec![msg(5, "tail")];
        let bounded = enforce_size_bounds(vec![a, b], 2, 30);
        assert_eq!(bounded.len(), 1);
        assert_eq!(bounded[0].len(), 6);
    }

    #[tokio::test]
    async fn small_sessions_skip_refinement() {
        let embedder = TextEmbedder::Local(LocalEmbedder::new(64));
        let messages: Vec<SessionMessage> = (0..5).map(|i| msg(i, "hello")).collect();
        let sessions = hybrid_sessionize(&embedder, messages, HybridOptions::default())
            .await
            .unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].len(), 5);
    }

    #[tokio::test]
    async fn singleton_session_is_dropped() {
        let embedder = TextEmbedder::Local(LocalEmbedder::new(64));
        let mut messages = vec![msg(1, "alone")];
        // 20-minute gap isolates the second message
        messages.push(SessionMessage {
            timestamp: DateTime::from_timestamp(1_700_000_000 + 60 + 20 * 60, 0).unwrap(),
            ..msg(2, "also alone")
        });
        let sessions = hybrid_sessionize(&embedder, messages, HybridOptions::default())
            .await
            .unwrap();
        assert!(sessions.is_empty());
    }

    #[tokio::test]
    async fn large_session_respects_max_bound() {
        let embedder = TextEmbedder::Local(LocalEmbedder::new(64));
        let messages: Vec<SessionMessage> = (0..45)
            .map(|i| msg(i, &format!("ongoing discussion piece {i}")))
            .collect();
        let sessions = hybrid_sessionize(&embedder, messages, HybridOptions::default())
            .await
            .unwrap();
        assert!(!sessions.is_empty());
        for session in &sessions {
            assert!(session.len() >= 2, "session below min size");
            assert!(session.len() <= 30, "session above max size");
        }
    }
}
