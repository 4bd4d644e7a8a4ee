//! Model metadata: chat context windows and embedding input limits.

/// Context window sizes for common chat models (in tokens).
const MODEL_CONTEXT_WINDOWS: &[(&str, u32)] = &[
    // Ollama / Llama models
    ("llama3.2", 128_000),
    ("llama3.2:1b", 128_000),
    ("llama3.2:3b", 128_000),
    ("llama3.1", 128_000),
    ("llama3", 8_192),
    ("llama2", 4_096),
    // Mistral models
    ("mistral", 32_768),
    ("mixtral", 32_768),
    ("mistral-nemo", 128_000),
    // Other Ollama models
    ("codellama", 16_384),
    ("phi3", 128_000),
    ("phi3:mini", 128_000),
    ("gemma2", 8_192),
    ("gemma", 8_192),
    ("qwen2", 32_768),
    ("qwen2.5", 32_768),
    ("deepseek-coder", 16_384),
    // OpenAI models
    ("gpt-4o", 128_000),
    ("gpt-4o-mini", 128_000),
    ("gpt-4-turbo", 128_000),
    ("gpt-4-turbo-preview", 128_000),
    ("gpt-4", 8_192),
    ("gpt-4-32k", 32_768),
    ("gpt-3.5-turbo", 16_385),
    ("gpt-3.5-turbo-16k", 16_385),
    // Claude models (via OpenAI-compatible gateways)
    ("claude-3-opus", 200_000),
    ("claude-3-sonnet", 200_000),
    ("claude-3-haiku", 200_000),
    ("claude-3.5-sonnet", 200_000),
];

pub const DEFAULT_CONTEXT_WINDOW: u32 = 4_096;

fn lookup(name: &str) -> Option<u32> {
    MODEL_CONTEXT_WINDOWS
        .iter()
        .find(|(id, _)| *id == name)
        .map(|(_, window)| *window)
}

/// Context window size for a model, stripping provider prefixes and version
/// suffixes before falling back to the default.
pub fn get_context_window(model_name: &str) -> u32 {
    if model_name.is_empty() {
        return DEFAULT_CONTEXT_WINDOW;
    }

    // Provider prefix, e.g. "openai/gpt-4o" -> "gpt-4o"
    let model_name = model_name.rsplit('/').next().unwrap_or(model_name);

    if let Some(window) = lookup(model_name) {
        return window;
    }

    // Variant suffix, e.g. "llama3.2:latest" -> "llama3.2"
    let base_name = model_name.split(':').next().unwrap_or(model_name);
    if let Some(window) = lookup(base_name) {
        return window;
    }

    // Version suffixes, e.g. "gpt-4-0125-preview" -> "gpt-4"
    let parts: Vec<&str> = base_name.split('-').collect();
    for take in (1..parts.len()).rev() {
        if let Some(window) = lookup(&parts[..take].join("-")) {
            return window;
        }
    }

    DEFAULT_CONTEXT_WINDOW
}

/// Input limits for embedding models (in tokens). Local models have smaller
/// practical limits than documented.
const EMBEDDING_MODEL_CONTEXT: &[(&str, u32)] = &[
    ("mxbai-embed-large", 512),
    ("snowflake-arctic-embed", 512),
    ("text-embedding-3-small", 8_191),
    ("text-embedding-3-large", 8_191),
    ("text-embedding-ada-002", 8_191),
];

pub const DEFAULT_EMBEDDING_CONTEXT: u32 = 512;

const CHARS_PER_TOKEN: usize = 4;

/// Token budget for an embedding model name (prefix-stripped).
pub fn embedding_context_tokens(model: &str) -> u32 {
    let base = model.split(':').next().unwrap_or(model);
    let base = base.rsplit('/').next().unwrap_or(base);
    EMBEDDING_MODEL_CONTEXT
        .iter()
        .find(|(id, _)| *id == base)
        .map(|(_, tokens)| *tokens)
        .unwrap_or(DEFAULT_EMBEDDING_CONTEXT)
}

/// Truncate text to fit an embedding model's input window, keeping a small
/// safety margin. The embedding summary should normally fit untouched.
pub fn truncate_for_embedding(text: &str, max_tokens: u32) -> &str {
    let max_chars = (max_tokens.saturating_sub(50) as usize) * CHARS_PER_TOKEN;
    if text.len() <= max_chars {
        return text;
    }
    // Cut on a char boundary at or below the budget
    let mut end = max_chars;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    tracing::info!("Truncating embedding input from {} to {} chars", text.len(), end);
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_and_variant_lookups() {
        assert_eq!(get_context_window("gpt-4o"), 128_000);
        assert_eq!(get_context_window("llama3.2:latest"), 128_000);
        assert_eq!(get_context_window("openai/gpt-4o"), 128_000);
    }

    #[test]
    fn version_suffix_stripping() {
        assert_eq!(get_context_window("gpt-4-0125-preview"), 128_000);
        assert_eq!(get_context_window("gpt-4"), 8_192);
    }

    #[test]
    fn unknown_models_get_default() {
        assert_eq!(get_context_window("mystery-model"), DEFAULT_CONTEXT_WINDOW);
        assert_eq!(get_context_window(""), DEFAULT_CONTEXT_WINDOW);
    }

    #[test]
    fn embedding_truncation_respects_budget() {
        let text = "x".repeat(10_000);
        let truncated = truncate_for_embedding(&text, 512);
        assert_eq!(truncated.len(), (512 - 50) * 4);

        let short = "short text";
        assert_eq!(truncate_for_embedding(short, 512), short);
    }

    #[test]
    fn embedding_context_strips_prefixes() {
        assert_eq!(embedding_context_tokens("mxbai-embed-large"), 512);
        assert_eq!(
            embedding_context_tokens("openai/text-embedding-3-small"),
            8_191
        );
        assert_eq!(embedding_context_tokens("unknown"), DEFAULT_EMBEDDING_CONTEXT);
    }
}
