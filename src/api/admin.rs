// src/api/admin.rs

//! Operator endpoints: queue introspection, dead-letter drain, reindexing,
//! sync health, topic rebuilds.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::error::{ApiError, ApiResult};
use crate::answer::thematic;
use crate::consistency::OrphanReport;
use crate::queue::{DeadLetter, QueueStats};
use crate::state::AppState;
use crate::store::sync::{ResetMode, SyncHealth};

pub async fn queue_stats(State(state): State<Arc<AppState>>) -> ApiResult<Json<QueueStats>> {
    Ok(Json(state.queue.stats().await?))
}

#[derive(Deserialize)]
pub struct DrainBody {
    #[serde(default = "default_drain_limit")]
    pub limit: i64,
    /// Re-enqueue drained payloads instead of just returning them.
    #[serde(default)]
    pub requeue: bool,
}

fn default_drain_limit() -> i64 {
    10
}

#[derive(Serialize)]
pub struct DrainResponse {
    pub drained: Vec<DeadLetter>,
}

pub async fn drain_dead_letters(
    State(state): State<Arc<AppState>>,
    Json(body): Json<DrainBody>,
) -> ApiResult<Json<DrainResponse>> {
    if body.limit <= 0 || body.limit > 1000 {
        return Err(ApiError::bad_request("limit must be between 1 and 1000"));
    }
    let drained = state.queue.drain_dead_letters(body.limit, body.requeue).await?;
    info!("Operator drained {} dead letters (requeue: {})", drained.len(), body.requeue);
    Ok(Json(DrainResponse { drained }))
}

pub async fn sync_health(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<i64>,
) -> ApiResult<Json<SyncHealth>> {
    Ok(Json(state.store.sync_health(tenant_id).await?))
}

#[derive(Deserialize)]
pub struct ReindexBody {
    /// "stale_only" (default) or "all".
    #[serde(default)]
    pub mode: Option<String>,
}

#[derive(Serialize)]
pub struct ReindexResponse {
    pub reset: u64,
}

pub async fn reindex(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<i64>,
    Json(body): Json<ReindexBody>,
) -> ApiResult<Json<ReindexResponse>> {
    let mode = match body.mode.as_deref() {
        None | Some("stale_only") => ResetMode::StaleOnly,
        Some("all") => ResetMode::All,
        Some(other) => {
            return Err(ApiError::bad_request(format!(
                "unknown mode '{other}' (expected stale_only or all)"
            )));
        }
    };

    let reset = state.store.reset_vector_bindings(tenant_id, mode).await?;
    // The sweeper re-enqueues unbound rows; nothing else to trigger here.
    Ok(Json(ReindexResponse { reset }))
}

#[derive(Deserialize)]
pub struct OrphanQuery {
    #[serde(default)]
    pub dry_run: bool,
}

pub async fn scan_orphans(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<i64>,
    Query(query): Query<OrphanQuery>,
) -> ApiResult<Json<OrphanReport>> {
    Ok(Json(
        state.consistency.scan_orphans(tenant_id, query.dry_run).await?,
    ))
}

#[derive(Serialize)]
pub struct TopicsRebuildResponse {
    pub clusters: usize,
    pub sampled_messages: usize,
}

/// Operator-triggered topic rebuild; live requests keep reading the previous
/// snapshot until the atomic file replacement.
pub async fn rebuild_topics(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<i64>,
) -> ApiResult<Json<TopicsRebuildResponse>> {
    let sample = state
        .store
        .recent_content_sample(
            tenant_id,
            thematic::SAMPLE_LIMIT,
            thematic::MIN_MESSAGE_LENGTH as i64,
        )
        .await?;
    let sampled = sample.len();

    let snapshot = state.router.thematic.rebuild(tenant_id, &sample)?;
    Ok(Json(TopicsRebuildResponse {
        clusters: snapshot.map(|s| s.clusters.len()).unwrap_or(0),
        sampled_messages: sampled,
    }))
}
