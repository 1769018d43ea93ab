// src/llm/anthropic.rs
// Messages API client with optional extended thinking.

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::{ChatMessage, Role, ThinkingOptions};
use crate::config::ThinkingEffort;
use crate::error::{HivemindError, Result};

const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 2048;

pub struct AnthropicChat {
    client: Client,
    api_key: String,
    model: String,
    thinking: ThinkingOptions,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: String,
}

impl AnthropicChat {
    pub fn new(api_key: String, model: Option<String>, thinking: ThinkingOptions) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            thinking,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn thinking_budget(&self) -> u32 {
        // Effort scales the configured budget; the API floor is 1024.
        let scaled = match self.thinking.effort {
            ThinkingEffort::Low => self.thinking.budget_tokens / 2,
            ThinkingEffort::Medium => self.thinking.budget_tokens,
            ThinkingEffort::High => self.thinking.budget_tokens * 2,
        };
        scaled.max(1024)
    }

    pub async fn complete(&self, system: &str, history: &[ChatMessage]) -> Result<String> {
        let messages: Vec<serde_json::Value> = history
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| {
                json!({
                    "role": match m.role {
                        Role::Assistant => "assistant",
                        _ => "user",
                    },
                    "content": m.content,
                })
            })
            .collect();

        let mut body = json!({
            "model": self.model,
            "system": system,
            "messages": messages,
            "max_tokens": MAX_TOKENS,
        });
        if self.thinking.enabled {
            body["thinking"] = json!({
                "type": "enabled",
                "budget_tokens": self.thinking_budget(),
            });
            body["max_tokens"] = json!(MAX_TOKENS + self.thinking_budget());
        }

        self.send(body).await
    }

    pub async fn describe_image(&self, image_url: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "max_tokens": 1024,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "image", "source": { "type": "url", "url": image_url } },
                    {
                        "type": "text",
                        "text": "Describe this image in detail. Include: main subjects, \
                                 actions, text visible, colors, and any important context. \
                                 Be thorough but concise."
                    }
                ]
            }]
        });
        self.send(body).await
    }

    async fn send(&self, body: serde_json::Value) -> Result<String> {
        let response = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| HivemindError::upstream("llm", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(HivemindError::upstream(
                "llm",
                format!("API error {status}: {body}"),
            ));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| HivemindError::upstream("llm", e))?;

        let text: String = parsed
            .content
            .into_iter()
            .filter(|b| b.block_type == "text")
            .map(|b| b.text)
            .collect::<Vec<_>>()
            .join("");

        if text.is_empty() {
            return Err(HivemindError::upstream("llm", "empty completion"));
        }
        Ok(text.trim().to_string())
    }
}
