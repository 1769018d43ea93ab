// src/error.rs

//! Crate-wide error taxonomy.
//!
//! Component boundaries translate lower-level failures into one of these
//! kinds; nothing below the answer router surfaces raw adapter errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HivemindError {
    /// Malformed input, failed SQL guard, blocked attachment, bad parameter.
    #[error("validation: {0}")]
    Validation(String),

    /// Missing tenant_id on an indexed write or search. Never defaulted.
    #[error("tenant isolation violation: {0}")]
    Isolation(String),

    /// LLM, embedder, vector index, web search, or platform unavailable.
    #[error("upstream {service} unavailable: {message}")]
    Upstream { service: &'static str, message: String },

    /// Deadline hit on an outbound call.
    #[error("timeout after {seconds}s calling {service}")]
    Timeout { service: &'static str, seconds: u64 },

    /// Vector index and relational store disagree.
    #[error("consistency: {0}")]
    Consistency(String),

    /// Over size/attempt limits.
    #[error("resource exhausted: {0}")]
    Exhausted(String),

    /// Injection trip, output-leak detection, forbidden SQL keyword.
    #[error("security: {0}")]
    Security(String),

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl HivemindError {
    pub fn upstream(service: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Upstream {
            service,
            message: err.to_string(),
        }
    }

    /// True when a retry might succeed (used by the work queue).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Upstream { .. } | Self::Timeout { .. } | Self::Store(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, HivemindError>;
