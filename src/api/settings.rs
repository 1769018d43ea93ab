// src/api/settings.rs

//! Runtime provider settings. Reads return masked keys; writes persist to
//! the overrides file and swap the answering client in place.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::error::{ApiError, ApiResult};
use crate::config::{LlmProvider, mask_secret};
use crate::llm::LlmClient;
use crate::state::AppState;

#[derive(Serialize)]
pub struct ProviderSettings {
    pub llm_provider: String,
    pub llm_model: String,
    pub vision_provider: String,
    pub embedding_provider: String,
    pub embedding_model: String,
    pub has_api_key: bool,
    pub available_providers: Vec<&'static str>,
}

pub async fn get_provider(State(state): State<Arc<AppState>>) -> Json<ProviderSettings> {
    let overrides = state.overrides.snapshot();
    let config = &state.config;

    let llm_provider = overrides
        .llm_provider
        .clone()
        .unwrap_or_else(|| config.llm.provider.as_str().to_string());
    let embedding_provider = overrides
        .embedding_provider
        .clone()
        .unwrap_or_else(|| config.embedding.provider.as_str().to_string());

    Json(ProviderSettings {
        llm_model: overrides
            .llm_model
            .clone()
            .or_else(|| config.llm.model.clone())
            .unwrap_or_else(|| state.router.llm().model_name().to_string()),
        vision_provider: overrides
            .vision_provider
            .clone()
            .unwrap_or_else(|| config.llm.vision_provider.as_str().to_string()),
        embedding_model: overrides
            .embedding_model
            .clone()
            .or_else(|| config.embedding.model.clone())
            .unwrap_or_default(),
        has_api_key: state.router.llm().is_available(),
        available_providers: vec!["openai", "anthropic", "xai"],
        llm_provider,
        embedding_provider,
    })
}

#[derive(Deserialize)]
pub struct ProviderUpdate {
    pub llm_provider: Option<String>,
    pub llm_model: Option<String>,
    pub vision_provider: Option<String>,
    pub vision_model: Option<String>,
    pub embedding_provider: Option<String>,
    pub embedding_model: Option<String>,
}

pub async fn put_provider(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ProviderUpdate>,
) -> ApiResult<Json<ProviderSettings>> {
    for provider in [&body.llm_provider, &body.vision_provider] {
        if let Some(name) = provider {
            if LlmProvider::parse(name).is_none() {
                return Err(ApiError::bad_request(format!("unknown provider '{name}'")));
            }
        }
    }

    let mut next = (*state.overrides.snapshot()).clone();
    if body.llm_provider.is_some() {
        next.llm_provider = body.llm_provider;
    }
    if body.llm_model.is_some() {
        next.llm_model = body.llm_model;
    }
    if body.vision_provider.is_some() {
        next.vision_provider = body.vision_provider;
    }
    if body.vision_model.is_some() {
        next.vision_model = body.vision_model;
    }
    if body.embedding_provider.is_some() {
        next.embedding_provider = body.embedding_provider;
    }
    if body.embedding_model.is_some() {
        next.embedding_model = body.embedding_model;
    }

    state.overrides.replace(next)?;

    // Swap the answering client; the embedder swap applies on restart
    // (collection dimensions are bound to it).
    let rebuilt = LlmClient::from_config(&state.config, &state.overrides.snapshot());
    state.router.set_llm(Arc::new(rebuilt));
    info!("Provider settings updated; answering client swapped");

    Ok(get_provider(State(state)).await)
}

#[derive(Serialize)]
pub struct ApiKeysView {
    /// Provider name -> masked key (first 4 + last 4).
    pub api_keys: HashMap<String, String>,
}

pub async fn get_api_keys(State(state): State<Arc<AppState>>) -> Json<ApiKeysView> {
    let overrides = state.overrides.snapshot();
    let config = &state.config;

    let mut keys: HashMap<String, String> = HashMap::new();
    let configured = [
        ("openai", config.llm.openai_api_key.as_deref()),
        ("anthropic", config.llm.anthropic_api_key.as_deref()),
        ("xai", config.llm.xai_api_key.as_deref()),
        ("gemini", config.embedding.gemini_api_key.as_deref()),
        ("web_search", config.web_search_api_key.as_deref()),
    ];
    for (name, key) in configured {
        if let Some(key) = key {
            keys.insert(name.to_string(), mask_secret(key));
        }
    }
    // Overrides shadow the environment.
    for (name, key) in overrides.api_keys.iter() {
        keys.insert(name.clone(), mask_secret(key));
    }

    Json(ApiKeysView { api_keys: keys })
}

#[derive(Deserialize)]
pub struct ApiKeysUpdate {
    pub api_keys: HashMap<String, String>,
}

pub async fn put_api_keys(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ApiKeysUpdate>,
) -> ApiResult<Json<ApiKeysView>> {
    const KNOWN: &[&str] = &["openai", "anthropic", "xai", "gemini", "web_search"];
    for name in body.api_keys.keys() {
        if !KNOWN.contains(&name.as_str()) {
            return Err(ApiError::bad_request(format!("unknown key name '{name}'")));
        }
    }

    let mut next = (*state.overrides.snapshot()).clone();
    next.api_keys.extend(body.api_keys);
    state.overrides.replace(next)?;

    let rebuilt = LlmClient::from_config(&state.config, &state.overrides.snapshot());
    state.router.set_llm(Arc::new(rebuilt));

    Ok(get_api_keys(State(state)).await)
}
