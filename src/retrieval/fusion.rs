// src/retrieval/fusion.rs

//! Reciprocal Rank Fusion over per-vector result lists.
//!
//! score(p) = sum over lists of 1 / (c + rank_of_p_in_list), c = 60.
//! Ranks are 1-based. Points absent from a list contribute nothing for it.

use std::collections::HashMap;

use crate::vector::SearchHit;

pub const RRF_CONSTANT: f32 = 60.0;

/// Fuse ranked lists into a single ranking. Payloads are taken from the
/// first list a point appears in.
pub fn reciprocal_rank_fusion(lists: Vec<Vec<SearchHit>>, limit: usize) -> Vec<SearchHit> {
    let mut scores: HashMap<String, f32> = HashMap::new();
    let mut hits: HashMap<String, SearchHit> = HashMap::new();

    for list in lists {
        for (rank, hit) in list.into_iter().enumerate() {
            let contribution = 1.0 / (RRF_CONSTANT + (rank + 1) as f32);
            *scores.entry(hit.id.clone()).or_insert(0.0) += contribution;
            hits.entry(hit.id.clone()).or_insert(hit);
        }
    }

    let mut fused: Vec<SearchHit> = hits
        .into_values()
        .map(|mut hit| {
            hit.score = scores[&hit.id];
            hit
        })
        .collect();

    // Ties broken by id so fusion stays deterministic across runs.
    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    fused.truncate(limit);
    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: &str) -> SearchHit {
        SearchHit {
            id: id.to_string(),
            score: 0.0,
            payload: serde_json::json!({}),
        }
    }

    #[test]
    fn point_in_both_lists_wins() {
        let dense = vec![hit("a"), hit("b"), hit("c")];
        let sparse = vec![hit("b"), hit("d")];

        let fused = reciprocal_rank_fusion(vec![dense, sparse], 10);
        assert_eq!(fused[0].id, "b");
        // b: 1/62 + 1/61; a: 1/61
        let expected = 1.0 / 62.0 + 1.0 / 61.0;
        assert!((fused[0].score - expected).abs() < 1e-6);
    }

    #[test]
    fn single_list_preserves_order() {
        let only = vec![hit("x"), hit("y"), hit("z")];
        let fused = reciprocal_rank_fusion(vec![only], 10);
        let ids: Vec<&str> = fused.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["x", "y", "z"]);
    }

    #[test]
    fn limit_is_applied_after_fusion() {
        let dense = vec![hit("a"), hit("b"), hit("c"), hit("d")];
        let fused = reciprocal_rank_fusion(vec![dense], 2);
        assert_eq!(fused.len(), 2);
    }

    #[test]
    fn empty_lists_fuse_to_empty() {
        assert!(reciprocal_rank_fusion(vec![vec![], vec![]], 5).is_empty());
    }
}
