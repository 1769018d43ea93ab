// src/config/overrides.rs

//! Runtime provider overrides with a JSON file backing.
//!
//! The dashboard can switch LLM/embedding providers without a restart.
//! Readers clone an `Arc<ProviderOverrides>` snapshot; writers persist the
//! new state to disk first, then swap the handle. Readers holding the old
//! snapshot keep a consistent view.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{HivemindError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vision_provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vision_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    /// Keyed by provider name ("openai", "anthropic", "xai", "gemini", "web_search").
    #[serde(default, skip_serializing_if = "std::collections::HashMap::is_empty")]
    pub api_keys: std::collections::HashMap<String, String>,
}

/// Shared handle around the current override snapshot.
pub struct OverrideStore {
    path: PathBuf,
    current: RwLock<Arc<ProviderOverrides>>,
}

impl OverrideStore {
    /// Load overrides from disk, falling back to an empty set.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let initial = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<ProviderOverrides>(&raw) {
                Ok(parsed) => {
                    info!("Loaded provider overrides from {}", path.display());
                    parsed
                }
                Err(e) => {
                    warn!("Ignoring malformed overrides file {}: {}", path.display(), e);
                    ProviderOverrides::default()
                }
            },
            Err(_) => ProviderOverrides::default(),
        };

        Self {
            path,
            current: RwLock::new(Arc::new(initial)),
        }
    }

    /// Current snapshot; cheap to clone, stable for the caller's lifetime.
    pub fn snapshot(&self) -> Arc<ProviderOverrides> {
        self.current.read().expect("override lock poisoned").clone()
    }

    /// Persist then atomically swap in a new snapshot.
    pub fn replace(&self, next: ProviderOverrides) -> Result<()> {
        self.persist(&next)?;
        let mut guard = self.current.write().expect("override lock poisoned");
        *guard = Arc::new(next);
        Ok(())
    }

    /// Re-read the file and swap (supervised hot-reload).
    pub fn reload(&self) -> Result<()> {
        let raw = std::fs::read_to_string(&self.path)
            .map_err(|e| HivemindError::Validation(format!("overrides file unreadable: {e}")))?;
        let parsed: ProviderOverrides = serde_json::from_str(&raw)?;
        let mut guard = self.current.write().expect("override lock poisoned");
        *guard = Arc::new(parsed);
        info!("Reloaded provider overrides from {}", self.path.display());
        Ok(())
    }

    fn persist(&self, value: &ProviderOverrides) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| HivemindError::Validation(format!("cannot create {}: {e}", parent.display())))?;
        }
        // Write to a sibling temp file and rename so readers never see a torn file.
        let tmp = self.path.with_extension("json.tmp");
        let serialized = serde_json::to_string_pretty(value)?;
        std::fs::write(&tmp, serialized)
            .map_err(|e| HivemindError::Validation(format!("cannot write overrides: {e}")))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| HivemindError::Validation(format!("cannot replace overrides: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_persists_and_swaps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store = OverrideStore::load(&path);
        assert!(store.snapshot().llm_provider.is_none());

        let mut next = ProviderOverrides::default();
        next.llm_provider = Some("anthropic".to_string());
        next.api_keys.insert("anthropic".into(), "sk-test-123".into());
        store.replace(next).unwrap();

        assert_eq!(store.snapshot().llm_provider.as_deref(), Some("anthropic"));

        // A fresh load sees the persisted state.
        let reloaded = OverrideStore::load(&path);
        assert_eq!(reloaded.snapshot().llm_provider.as_deref(), Some("anthropic"));
        assert_eq!(
            reloaded.snapshot().api_keys.get("anthropic").map(String::as_str),
            Some("sk-test-123")
        );
    }

    #[test]
    fn malformed_file_falls_back_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        let store = OverrideStore::load(&path);
        assert!(store.snapshot().llm_provider.is_none());
    }
}
