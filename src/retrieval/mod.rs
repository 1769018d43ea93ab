// src/retrieval/mod.rs

//! Hybrid dense+sparse retrieval engine.
//!
//! Pipeline: rewrite -> embed (dense + sparse) -> prefetch top 3k per vector
//! -> RRF fuse -> optional rerank -> top k. Every request carries a tenant id;
//! a missing one is refused as a security error, never defaulted.

pub mod fusion;
pub mod rerank;
pub mod rewrite;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::embeddings::{SparseEncoder, TextEmbedder};
use crate::error::{HivemindError, Result};
use crate::vector::{SearchHit, VectorIndex};

/// Deadline for a full search round trip.
pub const SEARCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Fallback score cut-off for dense-only search.
pub const DENSE_SCORE_THRESHOLD: f32 = 0.2;

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub tenant_id: Option<i64>,
    pub query: String,
    /// Any-of filter over channels; empty means all channels.
    pub channel_ids: Vec<i64>,
    pub limit: usize,
}

pub struct RetrievalEngine {
    index: Arc<VectorIndex>,
    embedder: Arc<TextEmbedder>,
    sparse: SparseEncoder,
    rerank_enabled: bool,
}

impl RetrievalEngine {
    pub fn new(index: Arc<VectorIndex>, embedder: Arc<TextEmbedder>, rerank_enabled: bool) -> Self {
        Self {
            index,
            embedder,
            sparse: SparseEncoder::new(),
            rerank_enabled,
        }
    }

    /// Hybrid search with mandatory tenant scoping.
    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>> {
        let tenant_id = request.tenant_id.ok_or_else(|| {
            warn!(target: "security", "search refused: missing tenant_id");
            HivemindError::Isolation("search request missing tenant_id".to_string())
        })?;

        if request.query.trim().is_empty() {
            return Err(HivemindError::Validation("empty query".to_string()));
        }

        let fut = self.search_inner(tenant_id, request);
        match tokio::time::timeout(SEARCH_TIMEOUT, fut).await {
            Ok(result) => result,
            Err(_) => Err(HivemindError::Timeout {
                service: "vector_index",
                seconds: SEARCH_TIMEOUT.as_secs(),
            }),
        }
    }

    async fn search_inner(&self, tenant_id: i64, request: &SearchRequest) -> Result<Vec<SearchHit>> {
        let limit = request.limit.max(1);
        let rewritten = rewrite::rewrite_query(&request.query);
        let dense = self.embedder.embed_one(&rewritten.clean).await?;
        let sparse = self.sparse.encode_query(&rewritten.clean);

        let channel_filter = (!request.channel_ids.is_empty()).then_some(&request.channel_ids[..]);

        // Oversample when the reranker will trim afterwards.
        let fused_limit = if self.rerank_enabled { limit * 2 } else { limit };
        let prefetch = (3 * limit) as u64;

        let mut lists: Vec<Vec<SearchHit>> = Vec::new();

        // Document bias: an extra prefetch restricted to document types.
        if rewritten.document_bias {
            let doc_filter = VectorIndex::tenant_filter(
                tenant_id,
                channel_filter,
                Some(&rewrite::document_source_types()),
            );
            match self
                .index
                .search_hybrid_dense(dense.clone(), doc_filter, prefetch)
                .await
            {
                Ok(hits) if !hits.is_empty() => {
                    debug!("Document bias prefetch returned {} chunks", hits.len());
                    lists.push(hits);
                }
                Ok(_) => {}
                Err(e) => warn!("Document-biased prefetch failed: {}", e),
            }
        }

        let filter = VectorIndex::tenant_filter(tenant_id, channel_filter, None);

        let dense_hits = self
            .index
            .search_hybrid_dense(dense.clone(), filter.clone(), prefetch)
            .await;
        match dense_hits {
            Ok(hits) => lists.push(hits),
            Err(e) => warn!("Dense prefetch failed: {}", e),
        }

        if !sparse.is_empty() {
            match self
                .index
                .search_hybrid_sparse(&sparse, filter.clone(), prefetch)
                .await
            {
                Ok(hits) => lists.push(hits),
                Err(e) => warn!("Sparse prefetch failed: {}", e),
            }
        }

        let mut fused = fusion::reciprocal_rank_fusion(lists, fused_limit);

        // Hybrid produced nothing: fall back to legacy dense with a cut-off.
        if fused.is_empty() {
            debug!("Hybrid search empty, falling back to dense collection");
            fused = self
                .index
                .search_dense(dense.clone(), filter, limit as u64, DENSE_SCORE_THRESHOLD)
                .await?;
        }

        if self.rerank_enabled && fused.len() > 1 {
            fused = rerank::rerank(&self.embedder, &dense, fused, limit).await?;
        } else {
            fused.truncate(limit);
        }

        // No result may leave the engine with a foreign tenant payload.
        for hit in &fused {
            if hit.payload_i64("tenant_id") != Some(tenant_id) {
                return Err(HivemindError::Isolation(format!(
                    "result {} carries foreign tenant payload",
                    hit.id
                )));
            }
        }

        Ok(fused)
    }
}
