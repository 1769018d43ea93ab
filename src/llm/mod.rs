// src/llm/mod.rs

//! LLM capability.
//!
//! One enum covers the configured providers (xAI speaks the OpenAI wire
//! format with a different base URL). Operations: `generate`,
//! `generate_with_history`, and `describe_image` for vision captions.
//! All calls carry a 60-second deadline.

pub mod anthropic;
pub mod openai;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{Config, LlmProvider, ProviderOverrides, ThinkingEffort};
use crate::error::{HivemindError, Result};

pub const LLM_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ThinkingOptions {
    pub enabled: bool,
    pub effort: ThinkingEffort,
    pub budget_tokens: u32,
}

pub enum LlmClient {
    OpenAi(openai::OpenAiChat),
    Anthropic(anthropic::AnthropicChat),
    Disabled,
}

impl LlmClient {
    /// Build the answering client from config plus runtime overrides.
    /// A provider without a key degrades to `Disabled` rather than failing
    /// startup; callers fall back to template paths.
    pub fn from_config(config: &Config, overrides: &ProviderOverrides) -> Self {
        let provider = overrides
            .llm_provider
            .as_deref()
            .and_then(LlmProvider::parse)
            .unwrap_or(config.llm.provider);
        let model = overrides
            .llm_model
            .clone()
            .or_else(|| config.llm.model.clone());
        let key = overrides
            .api_keys
            .get(provider.as_str())
            .cloned()
            .or_else(|| config.llm.api_key_for(provider).map(String::from));

        let thinking = ThinkingOptions {
            enabled: config.llm.thinking_enabled,
            effort: config.llm.thinking_effort,
            budget_tokens: config.llm.thinking_budget_tokens,
        };

        match (provider, key) {
            (LlmProvider::OpenAi, Some(key)) => {
                LlmClient::OpenAi(openai::OpenAiChat::new(key, model, None))
            }
            (LlmProvider::XAi, Some(key)) => LlmClient::OpenAi(openai::OpenAiChat::new(
                key,
                model.or_else(|| Some("grok-beta".to_string())),
                Some("https://api.x.ai/v1".to_string()),
            )),
            (LlmProvider::Anthropic, Some(key)) => {
                LlmClient::Anthropic(anthropic::AnthropicChat::new(key, model, thinking))
            }
            (_, None) => LlmClient::Disabled,
        }
    }

    /// Vision client for image captioning, configured independently.
    pub fn vision_from_config(config: &Config, overrides: &ProviderOverrides) -> Self {
        let provider = overrides
            .vision_provider
            .as_deref()
            .and_then(LlmProvider::parse)
            .unwrap_or(config.llm.vision_provider);
        let model = overrides
            .vision_model
            .clone()
            .or_else(|| config.llm.vision_model.clone());
        let key = overrides
            .api_keys
            .get(provider.as_str())
            .cloned()
            .or_else(|| config.llm.api_key_for(provider).map(String::from));

        match (provider, key) {
            (LlmProvider::OpenAi, Some(key)) => {
                LlmClient::OpenAi(openai::OpenAiChat::new(key, model, None))
            }
            (LlmProvider::XAi, Some(key)) => LlmClient::OpenAi(openai::OpenAiChat::new(
                key,
                model.or_else(|| Some("grok-beta".to_string())),
                Some("https://api.x.ai/v1".to_string()),
            )),
            (LlmProvider::Anthropic, Some(key)) => LlmClient::Anthropic(anthropic::AnthropicChat::new(
                key,
                model,
                ThinkingOptions {
                    enabled: false,
                    effort: ThinkingEffort::Low,
                    budget_tokens: 0,
                },
            )),
            (_, None) => LlmClient::Disabled,
        }
    }

    pub fn is_available(&self) -> bool {
        !matches!(self, LlmClient::Disabled)
    }

    pub fn model_name(&self) -> &str {
        match self {
            LlmClient::OpenAi(c) => c.model(),
            LlmClient::Anthropic(c) => c.model(),
            LlmClient::Disabled => "disabled",
        }
    }

    /// Single-turn generation.
    pub async fn generate(&self, system: &str, user: &str) -> Result<String> {
        let history = vec![ChatMessage::user(user)];
        self.generate_with_history(system, &history).await
    }

    /// Multi-turn generation with conversation history.
    pub async fn generate_with_history(
        &self,
        system: &str,
        history: &[ChatMessage],
    ) -> Result<String> {
        let fut = async {
            match self {
                LlmClient::OpenAi(c) => c.complete(system, history).await,
                LlmClient::Anthropic(c) => c.complete(system, history).await,
                LlmClient::Disabled => Err(HivemindError::upstream("llm", "no provider configured")),
            }
        };
        match tokio::time::timeout(LLM_TIMEOUT, fut).await {
            Ok(result) => result,
            Err(_) => Err(HivemindError::Timeout {
                service: "llm",
                seconds: LLM_TIMEOUT.as_secs(),
            }),
        }
    }

    /// Dense textual description of an image, used for caption embedding.
    /// The pixels are never stored.
    pub async fn describe_image(&self, image_url: &str) -> Result<String> {
        let fut = async {
            match self {
                LlmClient::OpenAi(c) => c.describe_image(image_url).await,
                LlmClient::Anthropic(c) => c.describe_image(image_url).await,
                LlmClient::Disabled => Err(HivemindError::upstream("llm", "no provider configured")),
            }
        };
        match tokio::time::timeout(LLM_TIMEOUT, fut).await {
            Ok(result) => result,
            Err(_) => Err(HivemindError::Timeout {
                service: "llm",
                seconds: LLM_TIMEOUT.as_secs(),
            }),
        }
    }
}
