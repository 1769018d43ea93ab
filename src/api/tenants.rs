// src/api/tenants.rs

//! Tenant control-plane endpoints: channels, stats, topics, personality.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};

use super::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::store::stats::{ChannelCount, DayCount, TenantStats};

#[derive(Serialize)]
pub struct ChannelView {
    pub id: String,
    pub name: String,
    pub indexed: bool,
}

pub async fn list_channels(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<i64>,
) -> ApiResult<Json<Vec<ChannelView>>> {
    let channels = state.store.list_channels(tenant_id).await?;
    Ok(Json(
        channels
            .into_iter()
            .map(|c| ChannelView {
                // Snowflakes exceed JS number precision; ship them as strings.
                id: c.id.to_string(),
                name: c.name,
                indexed: c.indexed,
            })
            .collect(),
    ))
}

#[derive(Deserialize)]
pub struct IndexFlagBody {
    pub indexed: bool,
}

#[derive(Serialize)]
pub struct IndexFlagResponse {
    pub channel_id: String,
    pub indexed: bool,
}

pub async fn set_channel_indexed(
    State(state): State<Arc<AppState>>,
    Path((tenant_id, channel_id)): Path<(i64, i64)>,
    Json(body): Json<IndexFlagBody>,
) -> ApiResult<Json<IndexFlagResponse>> {
    let updated = state
        .store
        .set_channel_indexed(tenant_id, channel_id, body.indexed)
        .await?;
    if !updated {
        return Err(ApiError::not_found("channel not found for tenant"));
    }

    // Re-enabling indexing queues a backfill of the channel's history.
    if body.indexed {
        state.store.reset_channel_bindings(tenant_id, channel_id).await?;
        state
            .queue
            .enqueue(&crate::queue::TaskPayload::BulkChannelIndex {
                tenant_id,
                channel_id,
                batch_size: 100,
            })
            .await?;
    }

    Ok(Json(IndexFlagResponse {
        channel_id: channel_id.to_string(),
        indexed: body.indexed,
    }))
}

pub async fn tenant_stats(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<i64>,
) -> ApiResult<Json<TenantStats>> {
    Ok(Json(state.store.tenant_stats(tenant_id).await?))
}

#[derive(Deserialize)]
pub struct TimeseriesQuery {
    #[serde(default = "default_days")]
    pub days: i64,
}

fn default_days() -> i64 {
    30
}

pub async fn stats_timeseries(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<i64>,
    Query(query): Query<TimeseriesQuery>,
) -> ApiResult<Json<Vec<DayCount>>> {
    if query.days <= 0 || query.days > 365 {
        return Err(ApiError::bad_request("days must be between 1 and 365"));
    }
    Ok(Json(
        state.store.messages_timeseries(tenant_id, query.days).await?,
    ))
}

#[derive(Deserialize)]
pub struct TopChannelsQuery {
    #[serde(default = "default_top_limit")]
    pub limit: i64,
}

fn default_top_limit() -> i64 {
    10
}

pub async fn top_channels(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<i64>,
    Query(query): Query<TopChannelsQuery>,
) -> ApiResult<Json<Vec<ChannelCount>>> {
    if query.limit <= 0 || query.limit > 100 {
        return Err(ApiError::bad_request("limit must be between 1 and 100"));
    }
    Ok(Json(state.store.top_channels(tenant_id, query.limit).await?))
}

#[derive(Serialize)]
pub struct TopicsResponse {
    pub built_at: Option<String>,
    pub clusters: Vec<crate::answer::thematic::TopicCluster>,
}

pub async fn topics(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<i64>,
) -> ApiResult<Json<TopicsResponse>> {
    match state.router.thematic.load(tenant_id) {
        Some(snapshot) => Ok(Json(TopicsResponse {
            built_at: Some(snapshot.built_at),
            clusters: snapshot.clusters,
        })),
        None => Ok(Json(TopicsResponse {
            built_at: None,
            clusters: vec![],
        })),
    }
}

#[derive(Serialize)]
pub struct DirectiveResponse {
    pub personality_directive: Option<String>,
}

pub async fn get_personality_directive(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<i64>,
) -> ApiResult<Json<DirectiveResponse>> {
    Ok(Json(DirectiveResponse {
        personality_directive: state.store.personality_directive(tenant_id).await?,
    }))
}

#[derive(Deserialize)]
pub struct DirectiveBody {
    pub personality_directive: Option<String>,
}

pub async fn put_personality_directive(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<i64>,
    Json(body): Json<DirectiveBody>,
) -> ApiResult<Json<DirectiveResponse>> {
    if let Some(directive) = &body.personality_directive {
        if directive.len() > 4000 {
            return Err(ApiError::bad_request("directive too long (max 4000 chars)"));
        }
    }
    let updated = state
        .store
        .set_personality_directive(tenant_id, body.personality_directive.as_deref())
        .await?;
    if !updated {
        return Err(ApiError::not_found("tenant not found"));
    }
    Ok(Json(DirectiveResponse {
        personality_directive: body.personality_directive,
    }))
}
