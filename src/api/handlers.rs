// src/api/handlers.rs

//! Core query endpoints: health, ask, classify, chat, search, summary.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

use super::error::{ApiError, ApiResult};
use crate::answer::rag::hit_to_source;
use crate::answer::summary;
use crate::answer::{AskRequest, AskResponse, MessageSource, RouterIntent};
use crate::retrieval::SearchRequest;
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Deserialize)]
pub struct AskBody {
    pub tenant_id: i64,
    pub query: String,
    #[serde(default)]
    pub channel_ids: Vec<i64>,
    pub channel_id: Option<i64>,
}

pub async fn ask(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AskBody>,
) -> ApiResult<Json<AskResponse>> {
    if body.query.trim().is_empty() {
        return Err(ApiError::bad_request("query must not be empty"));
    }

    let response = state
        .router
        .ask(&AskRequest {
            tenant_id: body.tenant_id,
            query: body.query,
            channel_ids: body.channel_ids,
            channel_id: body.channel_id,
        })
        .await?;
    Ok(Json(response))
}

#[derive(Deserialize)]
pub struct ClassifyBody {
    pub query: String,
}

#[derive(Serialize)]
pub struct ClassifyResponse {
    pub intent: RouterIntent,
}

pub async fn classify(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ClassifyBody>,
) -> ApiResult<Json<ClassifyResponse>> {
    if body.query.trim().is_empty() {
        return Err(ApiError::bad_request("query must not be empty"));
    }
    let intent = state.router.classify(&body.query).await;
    Ok(Json(ClassifyResponse { intent }))
}

#[derive(Deserialize)]
pub struct ChatBody {
    pub user_id: i64,
    pub message: String,
    pub tenant_id: Option<i64>,
}

#[derive(Serialize)]
pub struct ChatResponse {
    pub answer: String,
    pub remembered: usize,
}

pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ChatBody>,
) -> ApiResult<Json<ChatResponse>> {
    if body.message.trim().is_empty() {
        return Err(ApiError::bad_request("message must not be empty"));
    }
    let reply = state
        .router
        .chat(body.user_id, &body.message, body.tenant_id)
        .await?;
    Ok(Json(ChatResponse {
        answer: reply.answer,
        remembered: reply.remembered,
    }))
}

#[derive(Deserialize)]
pub struct SearchBody {
    pub tenant_id: i64,
    pub query: String,
    pub channel_id: Option<i64>,
    #[serde(default = "default_search_limit")]
    pub limit: usize,
}

fn default_search_limit() -> usize {
    5
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub results: Vec<MessageSource>,
}

pub async fn search(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SearchBody>,
) -> ApiResult<Json<SearchResponse>> {
    if body.limit == 0 || body.limit > 50 {
        return Err(ApiError::bad_request("limit must be between 1 and 50"));
    }

    let hits = state
        .engine
        .search(&SearchRequest {
            tenant_id: Some(body.tenant_id),
            query: body.query,
            channel_ids: body.channel_id.into_iter().collect(),
            limit: body.limit,
        })
        .await?;

    Ok(Json(SearchResponse {
        results: hits.iter().map(hit_to_source).collect(),
    }))
}

#[derive(Deserialize)]
pub struct SummaryBody {
    pub tenant_id: i64,
    pub channel_id: i64,
    #[serde(default = "default_summary_hours")]
    pub hours: i64,
}

fn default_summary_hours() -> i64 {
    24
}

pub async fn summarize(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SummaryBody>,
) -> ApiResult<Json<summary::ChannelSummary>> {
    if body.hours <= 0 || body.hours > 24 * 30 {
        return Err(ApiError::bad_request("hours must be between 1 and 720"));
    }
    let result = summary::summarize_channel(
        &state.store,
        &state.router.llm(),
        body.tenant_id,
        body.channel_id,
        body.hours,
    )
    .await?;
    Ok(Json(result))
}
