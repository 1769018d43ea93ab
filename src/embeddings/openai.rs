// src/embeddings/openai.rs
// OpenAI embeddings via the /v1/embeddings endpoint.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{HivemindError, Result};

const DEFAULT_MODEL: &str = "text-embedding-3-small";
const DEFAULT_DIM: usize = 1536;

pub struct OpenAiEmbeddings {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

#[derive(Serialize)]
struct EmbeddingRequest {
    input: EmbeddingInput,
    model: String,
}

#[derive(Serialize)]
#[serde(untagged)]
enum EmbeddingInput {
    Single(String),
    Batch(Vec<String>),
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

impl OpenAiEmbeddings {
    pub fn new(api_key: String, model: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }

    pub fn dimension(&self) -> usize {
        match self.model.as_str() {
            "text-embedding-3-large" => 3072,
            _ => DEFAULT_DIM,
        }
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut result = self
            .request(EmbeddingInput::Single(text.to_string()))
            .await?;
        result
            .pop()
            .ok_or_else(|| HivemindError::upstream("embedder", "empty embedding response"))
    }

    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        self.request(EmbeddingInput::Batch(texts.to_vec())).await
    }

    async fn request(&self, input: EmbeddingInput) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            input,
            model: self.model.clone(),
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| HivemindError::upstream("embedder", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(HivemindError::upstream(
                "embedder",
                format!("OpenAI API error {status}: {body}"),
            ));
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| HivemindError::upstream("embedder", e))?;

        // Response entries carry an index; output order must match input order.
        parsed.data.sort_by_key(|d| d.index);
        debug!("Embedded {} texts via OpenAI", parsed.data.len());
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}
