//! Layered configuration: process defaults → environment → persisted
//! key/value table. Reload swaps the snapshot atomically and bumps a
//! monotonic version so dependents can invalidate their caches.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::storage::MemoryStore;
use crate::Result;

/// Engine settings. Each field overlays `DEFAULT -> env var (uppercase field
/// name) -> settings table row (field name)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Chat provider: `ollama`, `openrouter`, or `venice`
    pub ai_provider: String,
    pub ollama_base_url: String,
    pub ollama_model: String,
    pub ollama_embedding_model: String,
    pub openrouter_model: String,
    pub openrouter_embedding_model: String,
    pub venice_model: String,
    pub venice_embedding_model: String,
    /// Embedding provider, synced with `ai_provider` by the UI
    pub embedding_provider: String,
    /// Local speech-to-text model name
    pub whisper_model: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            ai_provider: "ollama".to_string(),
            ollama_base_url: "http://localhost:11434/v1".to_string(),
            ollama_model: "llama3.2".to_string(),
            ollama_embedding_model: "mxbai-embed-large".to_string(),
            openrouter_model: "anthropic/claude-sonnet-4".to_string(),
            openrouter_embedding_model: "openai/text-embedding-3-small".to_string(),
            venice_model: "qwen3-235b".to_string(),
            venice_embedding_model: String::new(),
            embedding_provider: "ollama".to_string(),
            whisper_model: "base".to_string(),
        }
    }
}

impl Settings {
    /// Chat model for the active provider.
    pub fn chat_model(&self) -> &str {
        match self.ai_provider.as_str() {
            "ollama" => &self.ollama_model,
            "openrouter" => &self.openrouter_model,
            "venice" => &self.venice_model,
            _ => &self.ollama_model,
        }
    }

    /// Embedding model name for the active embedding provider, without the
    /// provider prefix.
    pub fn embedding_model(&self) -> &str {
        match self.embedding_provider.as_str() {
            "ollama" => &self.ollama_embedding_model,
            "openrouter" => &self.openrouter_embedding_model,
            "venice" => &self.venice_embedding_model,
            _ => "",
        }
    }

    /// The `provider:model` identifier stored alongside each embedding.
    pub fn embedding_model_id(&self) -> String {
        format!("{}:{}", self.embedding_provider, self.embedding_model())
    }

    fn apply(&mut self, key: &str, value: &str) {
        match key {
            "ai_provider" => self.ai_provider = value.to_string(),
            "ollama_base_url" => self.ollama_base_url = value.to_string(),
            "ollama_model" => self.ollama_model = value.to_string(),
            "ollama_embedding_model" => self.ollama_embedding_model = value.to_string(),
            "openrouter_model" => self.openrouter_model = value.to_string(),
            "openrouter_embedding_model" => self.openrouter_embedding_model = value.to_string(),
            "venice_model" => self.venice_model = value.to_string(),
            "venice_embedding_model" => self.venice_embedding_model = value.to_string(),
            "embedding_provider" => self.embedding_provider = value.to_string(),
            "whisper_model" => self.whisper_model = value.to_string(),
            _ => {}
        }
    }

    const KEYS: &'static [&'static str] = &[
        "ai_provider",
        "ollama_base_url",
        "ollama_model",
        "ollama_embedding_model",
        "openrouter_model",
        "openrouter_embedding_model",
        "venice_model",
        "venice_embedding_model",
        "embedding_provider",
        "whisper_model",
    ];

    /// Build from defaults, environment, and persisted overrides.
    pub fn build(saved: &HashMap<String, String>) -> Self {
        let mut settings = Settings::default();
        for key in Self::KEYS {
            if let Ok(value) = std::env::var(key.to_uppercase()) {
                settings.apply(key, &value);
            }
        }
        for key in Self::KEYS {
            if let Some(value) = saved.get(*key) {
                settings.apply(key, value);
            }
        }
        settings
    }
}

/// Versioned settings snapshot holder.
pub struct SettingsRegistry {
    state: RwLock<(Arc<Settings>, u64)>,
}

impl Default for SettingsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsRegistry {
    /// Start with defaults + environment only; persisted values arrive at
    /// the first [`SettingsRegistry::reload`] after unlock.
    pub fn new() -> Self {
        SettingsRegistry {
            state: RwLock::new((Arc::new(Settings::build(&HashMap::new())), 0)),
        }
    }

    /// Current snapshot.
    pub fn current(&self) -> Arc<Settings> {
        self.state.read().0.clone()
    }

    /// Atomic `(snapshot, version)` read for cache keying.
    pub fn with_version(&self) -> (Arc<Settings>, u64) {
        let guard = self.state.read();
        (guard.0.clone(), guard.1)
    }

    /// Current version counter.
    pub fn version(&self) -> u64 {
        self.state.read().1
    }

    /// Rebuild the snapshot from the settings table and bump the version.
    pub async fn reload(&self, store: &dyn MemoryStore) -> Result<u64> {
        let saved = store.all_settings().await?;
        let rebuilt = Arc::new(Settings::build(&saved));
        let mut guard = self.state.write();
        guard.0 = rebuilt;
        guard.1 += 1;
        info!("Settings reloaded (version {})", guard.1);
        Ok(guard.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_local_provider() {
        let settings = Settings::default();
        assert_eq!(settings.ai_provider, "ollama");
        assert_eq!(settings.chat_model(), "llama3.2");
        assert_eq!(settings.embedding_model_id(), "ollama:mxbai-embed-large");
    }

    #[test]
    fn saved_values_override_defaults() {
        let mut saved = HashMap::new();
        saved.insert("ai_provider".to_string(), "openrouter".to_string());
        saved.insert(
            "openrouter_model".to_string(),
            "meta-llama/llama-3.1-70b".to_string(),
        );
        let settings = Settings::build(&saved);
        assert_eq!(settings.ai_provider, "openrouter");
        assert_eq!(settings.chat_model(), "meta-llama/llama-3.1-70b");
    }

    #[test]
    fn registry_hands_out_versioned_snapshots() {
        let registry = SettingsRegistry::new();
        let (snapshot, version) = registry.with_version();
        assert_eq!(version, 0);
        assert_eq!(snapshot.ai_provider, registry.current().ai_provider);
    }
}
