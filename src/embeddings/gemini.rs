// src/embeddings/gemini.rs
// Gemini embeddings via the embedContent endpoint.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::error::{HivemindError, Result};

const DEFAULT_MODEL: &str = "text-embedding-004";
const DEFAULT_DIM: usize = 768;

pub struct GeminiEmbeddings {
    client: Client,
    api_key: String,
    model: String,
}

#[derive(Deserialize)]
struct EmbedContentResponse {
    embedding: ContentEmbedding,
}

#[derive(Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

#[derive(Serialize)]
struct BatchEmbedRequest {
    requests: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct BatchEmbedResponse {
    embeddings: Vec<ContentEmbedding>,
}

impl GeminiEmbeddings {
    pub fn new(api_key: String, model: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        }
    }

    pub fn dimension(&self) -> usize {
        DEFAULT_DIM
    }

    fn url(&self, action: &str) -> String {
        format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:{}?key={}",
            self.model, action, self.api_key
        )
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = json!({
            "model": format!("models/{}", self.model),
            "content": { "parts": [{ "text": text }] },
        });

        let response = self
            .client
            .post(self.url("embedContent"))
            .json(&body)
            .send()
            .await
            .map_err(|e| HivemindError::upstream("embedder", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(HivemindError::upstream(
                "embedder",
                format!("Gemini API error {status}: {body}"),
            ));
        }

        let parsed: EmbedContentResponse = response
            .json()
            .await
            .map_err(|e| HivemindError::upstream("embedder", e))?;
        Ok(parsed.embedding.values)
    }

    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let request = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|t| {
                    json!({
                        "model": format!("models/{}", self.model),
                        "content": { "parts": [{ "text": t }] },
                    })
                })
                .collect(),
        };

        let response = self
            .client
            .post(self.url("batchEmbedContents"))
            .json(&request)
            .send()
            .await
            .map_err(|e| HivemindError::upstream("embedder", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(HivemindError::upstream(
                "embedder",
                format!("Gemini API error {status}: {body}"),
            ));
        }

        let parsed: BatchEmbedResponse = response
            .json()
            .await
            .map_err(|e| HivemindError::upstream("embedder", e))?;

        debug!("Embedded {} texts via Gemini", parsed.embeddings.len());
        Ok(parsed.embeddings.into_iter().map(|e| e.values).collect())
    }
}
