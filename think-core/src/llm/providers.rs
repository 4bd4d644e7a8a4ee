//! Cloud provider registry for OpenAI-compatible endpoints.

/// Configuration for one OpenAI-compatible cloud provider.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub id: &'static str,
    pub base_url: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub default_chat_model: Option<&'static str>,
    pub default_embedding_model: Option<&'static str>,
    pub extra_headers: &'static [(&'static str, &'static str)],
}

/// Identifier of the local provider; needs no API key.
pub const LOCAL_PROVIDER: &str = "ollama";

/// Known cloud providers. The set is open: any OpenAI-compatible endpoint
/// can be added here.
pub const CLOUD_PROVIDERS: &[ProviderConfig] = &[
    ProviderConfig {
        id: "openrouter",
        base_url: "https://openrouter.ai/api/v1",
        name: "OpenRouter",
        description: "Access 500+ AI models",
        default_chat_model: Some("anthropic/claude-sonnet-4"),
        default_embedding_model: Some("openai/text-embedding-3-small"),
        extra_headers: &[
            ("HTTP-Referer", "https://thinkos.app"),
            ("X-Title", "ThinkOS"),
        ],
    },
    ProviderConfig {
        id: "venice",
        base_url: "https://api.venice.ai/api/v1",
        name: "Venice",
        description: "Private, uncensored AI",
        default_chat_model: Some("qwen3-235b"),
        default_embedding_model: None,
        extra_headers: &[],
    },
];

/// Look up a cloud provider by id.
pub fn get_provider_config(provider: &str) -> Option<&'static ProviderConfig> {
    CLOUD_PROVIDERS.iter().find(|p| p.id == provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_contains_known_providers() {
        assert!(get_provider_config("openrouter").is_some());
        assert!(get_provider_config("venice").is_some());
        assert!(get_provider_config("nonesuch").is_none());
    }

    #[test]
    fn venice_has_no_embedding_model() {
        let venice = get_provider_config("venice").unwrap();
        assert!(venice.default_embedding_model.is_none());
    }
}
