// src/config/mod.rs

//! Central configuration, assembled once at startup.
//!
//! Everything is read from the environment (plus an optional `.env` file) and
//! handed to components as an `Arc<Config>` at construction time. Runtime
//! provider overrides live in [`overrides`] and are swapped atomically.

pub mod overrides;

use serde::{Deserialize, Serialize};

pub use overrides::{OverrideStore, ProviderOverrides};

/// Supported LLM providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    OpenAi,
    Anthropic,
    XAi,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "openai",
            LlmProvider::Anthropic => "anthropic",
            LlmProvider::XAi => "xai",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Some(Self::OpenAi),
            "anthropic" => Some(Self::Anthropic),
            "xai" => Some(Self::XAi),
            _ => None,
        }
    }
}

/// Supported embedding providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    Local,
    OpenAi,
    Gemini,
}

impl EmbeddingProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddingProvider::Local => "local",
            EmbeddingProvider::OpenAi => "openai",
            EmbeddingProvider::Gemini => "gemini",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Some(Self::Local),
            "openai" => Some(Self::OpenAi),
            "gemini" => Some(Self::Gemini),
            _ => None,
        }
    }
}

/// Extended-thinking effort level passed through to providers that support it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThinkingEffort {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub url: String,
    /// Read-only replica for analytics SQL; falls back to the primary.
    pub readonly_url: Option<String>,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct VectorIndexConfig {
    pub url: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Broker database URL (shared across ingest, API, and worker processes).
    pub broker_url: String,
    pub worker_concurrency: usize,
    pub task_soft_limit_s: u64,
    pub task_hard_limit_s: u64,
    pub tasks_per_worker_recycle: usize,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub model: Option<String>,
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub xai_api_key: Option<String>,
    pub vision_provider: LlmProvider,
    pub vision_model: Option<String>,
    pub thinking_enabled: bool,
    pub thinking_effort: ThinkingEffort,
    pub thinking_budget_tokens: u32,
}

impl LlmConfig {
    pub fn api_key_for(&self, provider: LlmProvider) -> Option<&str> {
        match provider {
            LlmProvider::OpenAi => self.openai_api_key.as_deref(),
            LlmProvider::Anthropic => self.anthropic_api_key.as_deref(),
            LlmProvider::XAi => self.xai_api_key.as_deref(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    pub model: Option<String>,
    pub gemini_api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Store-and-index bot-authored messages (never answer them).
    pub ingest_bot_messages: bool,
    pub session_gap_minutes: i64,
    pub semantic_split_threshold: usize,
    pub min_session_size: usize,
    pub max_session_size: usize,
}

/// Main configuration handle. Built once, shared as `Arc<Config>`.
#[derive(Debug, Clone)]
pub struct Config {
    pub store: StoreConfig,
    pub vector_index: VectorIndexConfig,
    pub queue: QueueConfig,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub server: ServerConfig,
    pub ingest: IngestConfig,
    pub web_search_api_key: Option<String>,
    pub platform_token: Option<String>,
    pub topics_cache_dir: String,
    pub settings_overrides_path: String,
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env_var(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        // Don't panic if .env doesn't exist (production reads real env vars)
        dotenvy::dotenv().ok();

        let store_url =
            env_var("STORE_URL").unwrap_or_else(|| "sqlite://data/hivemind.db".to_string());

        Self {
            store: StoreConfig {
                readonly_url: env_var("STORE_READONLY_URL"),
                max_connections: env_or("STORE_MAX_CONNECTIONS", 8),
                url: store_url.clone(),
            },
            vector_index: VectorIndexConfig {
                url: env_var("VECTOR_INDEX_URL")
                    .unwrap_or_else(|| "http://localhost:6334".to_string()),
                api_key: env_var("VECTOR_INDEX_API_KEY"),
            },
            queue: QueueConfig {
                broker_url: env_var("QUEUE_BROKER_URL")
                    .unwrap_or_else(|| "sqlite://data/hivemind-queue.db".to_string()),
                worker_concurrency: env_or("WORKER_CONCURRENCY", 4),
                task_soft_limit_s: env_or("TASK_SOFT_LIMIT_S", 300),
                task_hard_limit_s: env_or("TASK_HARD_LIMIT_S", 600),
                tasks_per_worker_recycle: env_or("TASKS_PER_WORKER_RECYCLE", 1000),
            },
            llm: LlmConfig {
                provider: env_var("LLM_PROVIDER")
                    .and_then(|v| LlmProvider::parse(&v))
                    .unwrap_or(LlmProvider::OpenAi),
                model: env_var("LLM_MODEL"),
                openai_api_key: env_var("OPENAI_API_KEY"),
                anthropic_api_key: env_var("ANTHROPIC_API_KEY"),
                xai_api_key: env_var("XAI_API_KEY"),
                vision_provider: env_var("VISION_PROVIDER")
                    .and_then(|v| LlmProvider::parse(&v))
                    .unwrap_or(LlmProvider::OpenAi),
                vision_model: env_var("VISION_MODEL"),
                thinking_enabled: env_or("THINKING_ENABLED", false),
                thinking_effort: match env_var("THINKING_EFFORT").as_deref() {
                    Some("low") => ThinkingEffort::Low,
                    Some("high") => ThinkingEffort::High,
                    _ => ThinkingEffort::Medium,
                },
                thinking_budget_tokens: env_or("THINKING_BUDGET_TOKENS", 2000),
            },
            embedding: EmbeddingConfig {
                provider: env_var("EMBEDDING_PROVIDER")
                    .and_then(|v| EmbeddingProvider::parse(&v))
                    .unwrap_or(EmbeddingProvider::Local),
                model: env_var("EMBEDDING_MODEL"),
                gemini_api_key: env_var("GEMINI_API_KEY"),
            },
            server: ServerConfig {
                host: env_var("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: env_or("PORT", 8000),
            },
            ingest: IngestConfig {
                ingest_bot_messages: env_or("INGEST_BOT_MESSAGES", true),
                session_gap_minutes: env_or("SESSION_GAP_MINUTES", 15),
                semantic_split_threshold: env_or("SEMANTIC_SPLIT_THRESHOLD", 15),
                min_session_size: env_or("MIN_SESSION_SIZE", 2),
                max_session_size: env_or("MAX_SESSION_SIZE", 30),
            },
            web_search_api_key: env_var("WEB_SEARCH_API_KEY"),
            platform_token: env_var("PLATFORM_TOKEN"),
            topics_cache_dir: env_var("TOPICS_CACHE_DIR")
                .unwrap_or_else(|| "data/topics".to_string()),
            settings_overrides_path: env_var("SETTINGS_OVERRIDES_PATH")
                .unwrap_or_else(|| "data/settings.json".to_string()),
        }
    }

    /// Startup validation; failures here map to a non-zero exit code.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.queue.task_hard_limit_s <= self.queue.task_soft_limit_s {
            anyhow::bail!(
                "TASK_HARD_LIMIT_S ({}) must exceed TASK_SOFT_LIMIT_S ({})",
                self.queue.task_hard_limit_s,
                self.queue.task_soft_limit_s
            );
        }
        if self.queue.worker_concurrency == 0 {
            anyhow::bail!("WORKER_CONCURRENCY must be at least 1");
        }
        if self.ingest.min_session_size < 1 || self.ingest.max_session_size < self.ingest.min_session_size {
            anyhow::bail!("invalid session size bounds");
        }
        Ok(())
    }

    pub fn readonly_store_url(&self) -> &str {
        self.store.readonly_url.as_deref().unwrap_or(&self.store.url)
    }
}

/// Mask a secret for introspection endpoints: first 4 + last 4 characters.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}
