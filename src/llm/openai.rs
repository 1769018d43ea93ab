// src/llm/openai.rs
// Chat completions over the OpenAI wire format (also used for xAI).

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::{ChatMessage, Role};
use crate::error::{HivemindError, Result};

const DEFAULT_MODEL: &str = "gpt-4o-mini";

pub struct OpenAiChat {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

#[derive(Serialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<WireMessage>,
    temperature: f32,
}

#[derive(Serialize)]
struct WireMessage {
    role: &'static str,
    content: serde_json::Value,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

fn wire_role(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

impl OpenAiChat {
    pub fn new(api_key: String, model: Option<String>, base_url: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn complete(&self, system: &str, history: &[ChatMessage]) -> Result<String> {
        let mut messages = vec![WireMessage {
            role: "system",
            content: json!(system),
        }];
        for message in history {
            messages.push(WireMessage {
                role: wire_role(message.role),
                content: json!(message.content),
            });
        }

        let request = CompletionRequest {
            model: self.model.clone(),
            messages,
            temperature: 0.3,
        };
        self.send(request).await
    }

    pub async fn describe_image(&self, image_url: &str) -> Result<String> {
        let request = CompletionRequest {
            model: self.model.clone(),
            messages: vec![WireMessage {
                role: "user",
                content: json!([
                    {
                        "type": "text",
                        "text": "Describe this image in detail. Include: main subjects, \
                                 actions, text visible, colors, and any important context. \
                                 Be thorough but concise."
                    },
                    { "type": "image_url", "image_url": { "url": image_url } }
                ]),
            }],
            temperature: 0.2,
        };
        self.send(request).await
    }

    async fn send(&self, request: CompletionRequest) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
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

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| HivemindError::upstream("llm", e))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| HivemindError::upstream("llm", "empty completion"))?;

        debug!("Completion of {} chars from {}", content.len(), self.model);
        Ok(content.trim().to_string())
    }
}
