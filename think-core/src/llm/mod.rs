//! Provider-agnostic LLM gateway.
//!
//! Chat (sync + streaming) and embedding clients over the OpenAI-compatible
//! contract. The local provider needs no API key; cloud providers resolve
//! theirs from the encrypted settings table and may attach extra headers.

pub mod models;
pub mod parse;
pub mod providers;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::error::{Error, Result};
use crate::settings::SettingsRegistry;
use crate::storage::{secrets, MemoryStore};
use crate::types::{ChatTurn, TokenUsage};

/// System prompt for the Think assistant persona.
const SYSTEM_PROMPT: &str = "You are Think, a friendly personal assistant with access to the user's saved memories and notes. You help them recall information, answer questions, and have natural conversations.\n\nWhen context from their memories is provided, use it naturally to inform your responses without explicitly mentioning \"your saved article\" or \"your memories\" - just incorporate the knowledge seamlessly.\n\nKeep responses conversational and concise. Be helpful and warm, like a knowledgeable friend.";

/// Retry budget for embedding and constrained-completion calls.
const EMBED_RETRIES: u32 = 3;

/// Per-request timeout for embeddings.
const EMBED_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl From<WireUsage> for TokenUsage {
    fn from(usage: WireUsage) -> Self {
        TokenUsage {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    model: String,
    input: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct OllamaEmbeddingRequest {
    model: String,
    prompt: String,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbeddingResponse {
    embedding: Vec<f32>,
}

/// Resolved connection details for the active provider.
struct Endpoint {
    base_url: String,
    api_key: Option<String>,
    extra_headers: &'static [(&'static str, &'static str)],
}

/// Provider-agnostic chat and embedding client.
#[derive(Clone)]
pub struct LlmGateway {
    http: reqwest::Client,
    settings: Arc<SettingsRegistry>,
    store: Arc<dyn MemoryStore>,
}

impl LlmGateway {
    /// Build a gateway. No default timeout on the client: inference relies
    /// on the server; embeddings set a per-request timeout.
    pub fn new(settings: Arc<SettingsRegistry>, store: Arc<dyn MemoryStore>) -> Self {
        LlmGateway {
            http: reqwest::Client::new(),
            settings,
            store,
        }
    }

    /// The `provider:model` identifier for newly created embeddings.
    pub fn current_embedding_model(&self) -> String {
        self.settings.current().embedding_model_id()
    }

    /// Chat model for the active provider.
    pub fn chat_model(&self) -> String {
        self.settings.current().chat_model().to_string()
    }

    /// Whether chat is served by the local provider.
    pub fn is_local_provider(&self) -> bool {
        self.settings.current().ai_provider == providers::LOCAL_PROVIDER
    }

    async fn chat_endpoint(&self) -> Result<Endpoint> {
        let settings = self.settings.current();
        if settings.ai_provider == providers::LOCAL_PROVIDER {
            return Ok(Endpoint {
                base_url: settings.ollama_base_url.clone(),
                api_key: Some("ollama".to_string()),
                extra_headers: &[],
            });
        }
        let config = providers::get_provider_config(&settings.ai_provider).ok_or_else(|| {
            Error::Validation(format!("Unknown provider: {}", settings.ai_provider))
        })?;
        let api_key = secrets::get_api_key(self.store.as_ref(), config.id).await?;
        Ok(Endpoint {
            base_url: config.base_url.to_string(),
            api_key,
            extra_headers: config.extra_headers,
        })
    }

    fn apply_endpoint(
        &self,
        mut request: reqwest::RequestBuilder,
        endpoint: &Endpoint,
    ) -> reqwest::RequestBuilder {
        if let Some(key) = &endpoint.api_key {
            request = request.bearer_auth(key);
        }
        for (name, value) in endpoint.extra_headers {
            request = request.header(*name, *value);
        }
        request
    }

    fn build_messages(
        message: &str,
        context: Option<&str>,
        history: &[ChatTurn],
    ) -> Vec<WireMessage> {
        let system = match context {
            Some(context) if !context.is_empty() => {
                format!("{SYSTEM_PROMPT}\n\nContext:\n{context}")
            }
            _ => SYSTEM_PROMPT.to_string(),
        };

        let mut messages = vec![WireMessage {
            role: "system",
            content: system,
        }];
        for turn in history {
            messages.push(WireMessage {
                role: turn.role.as_str(),
                content: turn.content.clone(),
            });
        }
        messages.push(WireMessage {
            role: "user",
            content: message.to_string(),
        });
        messages
    }

    /// Single-shot chat completion with the Think system prompt.
    pub async fn chat(
        &self,
        message: &str,
        context: Option<&str>,
        history: &[ChatTurn],
    ) -> Result<String> {
        let endpoint = self.chat_endpoint().await?;
        let request = ChatRequest {
            model: self.chat_model(),
            messages: Self::build_messages(message, context, history),
            stream: None,
            stream_options: None,
            max_tokens: None,
            temperature: None,
        };

        let response = self
            .apply_endpoint(
                self.http
                    .post(format!("{}/chat/completions", endpoint.base_url)),
                &endpoint,
            )
            .json(&request)
            .send()
            .await
            .map_err(classify_request_error)?;

        let response = check_status(response).await?;
        let parsed: ChatResponse = response.json().await.map_err(classify_request_error)?;
        Ok(parsed
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default())
    }

    /// Streaming chat. Yields `(token, None)` chunks, then a final
    /// `("", Some(usage))` chunk when the provider reports usage.
    pub async fn chat_stream(
        &self,
        message: &str,
        context: Option<&str>,
        history: &[ChatTurn],
    ) -> Result<mpsc::Receiver<(String, Option<TokenUsage>)>> {
        let endpoint = self.chat_endpoint().await?;
        let request = ChatRequest {
            model: self.chat_model(),
            messages: Self::build_messages(message, context, history),
            stream: Some(true),
            stream_options: Some(StreamOptions {
                include_usage: true,
            }),
            max_tokens: None,
            temperature: None,
        };

        let response = self
            .apply_endpoint(
                self.http
                    .post(format!("{}/chat/completions", endpoint.base_url)),
                &endpoint,
            )
            .json(&request)
            .send()
            .await
            .map_err(classify_request_error)?;
        let response = check_status(response).await?;

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            let mut buffer = String::new();
            let mut usage: Option<TokenUsage> = None;

            'outer: while let Some(chunk) = stream.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        warn!("Stream read failed: {e}");
                        break;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                // Drain complete SSE lines; a chunk can split a line
                while let Some(newline) = buffer.find('\n') {
                    let line = buffer[..newline].trim().to_string();
                    buffer.drain(..=newline);

                    let Some(payload) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    if payload == "[DONE]" {
                        break 'outer;
                    }
                    let Ok(parsed) = serde_json::from_str::<StreamChunk>(payload) else {
                        debug!("Skipping unparseable stream chunk");
                        continue;
                    };
                    if let Some(reported) = parsed.usage {
                        usage = Some(reported.into());
                    }
                    if let Some(token) = parsed
                        .choices
                        .first()
                        .and_then(|c| c.delta.content.clone())
                    {
                        if !token.is_empty() && tx.send((token, None)).await.is_err() {
                            // Receiver gone: client disconnected
                            return;
                        }
                    }
                }
            }

            let _ = tx.send((String::new(), usage)).await;
        });

        Ok(rx)
    }

    /// Constrained completion used by the enrichment generators and the
    /// follow-up rewriter. Retries transient failures.
    pub async fn complete(
        &self,
        system: &str,
        user: &str,
        max_tokens: u32,
        temperature: Option<f32>,
    ) -> Result<String> {
        let endpoint = self.chat_endpoint().await?;
        let request = ChatRequest {
            model: self.chat_model(),
            messages: vec![
                WireMessage {
                    role: "system",
                    content: system.to_string(),
                },
                WireMessage {
                    role: "user",
                    content: user.to_string(),
                },
            ],
            stream: None,
            stream_options: None,
            max_tokens: Some(max_tokens),
            temperature,
        };

        let mut last_error = Error::Provider("No attempts made".to_string());
        for attempt in 0..EMBED_RETRIES {
            let result = async {
                let response = self
                    .apply_endpoint(
                        self.http
                            .post(format!("{}/chat/completions", endpoint.base_url)),
                        &endpoint,
                    )
                    .json(&request)
                    .send()
                    .await
                    .map_err(classify_request_error)?;
                let response = check_status(response).await?;
                let parsed: ChatResponse =
                    response.json().await.map_err(classify_request_error)?;
                Ok::<_, Error>(
                    parsed
                        .choices
                        .first()
                        .and_then(|c| c.message.content.clone())
                        .unwrap_or_default(),
                )
            }
            .await;

            match result {
                Ok(content) => return Ok(content),
                Err(e) if e.is_recoverable() && attempt + 1 < EMBED_RETRIES => {
                    warn!("Completion attempt {} failed: {e}", attempt + 1);
                    tokio::time::sleep(backoff_delay(&e, attempt)).await;
                    last_error = e;
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error)
    }

    /// Generate an embedding for `text` with the configured provider.
    ///
    /// Input is truncated to the model's window; empty input is rejected.
    /// Retries up to 3 times with linear backoff, longer on 5xx while local
    /// models load.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(Error::Validation(
                "Cannot generate embedding for empty text".to_string(),
            ));
        }

        let settings = self.settings.current();
        let model = settings.embedding_model().to_string();
        if settings.embedding_provider != providers::LOCAL_PROVIDER && model.is_empty() {
            return Err(Error::Validation(format!(
                "No embedding model configured for {}",
                settings.embedding_provider
            )));
        }

        let max_tokens = models::embedding_context_tokens(&model);
        let text = models::truncate_for_embedding(text, max_tokens);

        let mut last_error = Error::Provider("No attempts made".to_string());
        for attempt in 0..EMBED_RETRIES {
            let result = if settings.embedding_provider == providers::LOCAL_PROVIDER {
                self.embed_local(&settings.ollama_base_url, &model, text).await
            } else {
                self.embed_cloud(&settings.embedding_provider, &model, text)
                    .await
            };

            match result {
                Ok(embedding) => return Ok(embedding),
                Err(e) if e.is_recoverable() && attempt + 1 < EMBED_RETRIES => {
                    warn!(
                        "Embedding attempt {}/{} failed: {e}",
                        attempt + 1,
                        EMBED_RETRIES
                    );
                    tokio::time::sleep(backoff_delay(&e, attempt)).await;
                    last_error = e;
                }
                Err(e) => {
                    error!("Embedding failed: {e}");
                    return Err(e);
                }
            }
        }
        Err(last_error)
    }

    /// Local provider uses the native embeddings endpoint beside the
    /// OpenAI-compatible surface.
    async fn embed_local(&self, base_url: &str, model: &str, text: &str) -> Result<Vec<f32>> {
        let native_base = base_url.trim_end_matches('/').trim_end_matches("/v1");
        let response = self
            .http
            .post(format!("{native_base}/api/embeddings"))
            .timeout(EMBED_TIMEOUT)
            .json(&OllamaEmbeddingRequest {
                model: model.to_string(),
                prompt: text.to_string(),
            })
            .send()
            .await
            .map_err(classify_request_error)?;
        let response = check_status(response).await?;
        let parsed: OllamaEmbeddingResponse =
            response.json().await.map_err(classify_request_error)?;
        Ok(parsed.embedding)
    }

    async fn embed_cloud(&self, provider: &str, model: &str, text: &str) -> Result<Vec<f32>> {
        let config = providers::get_provider_config(provider)
            .ok_or_else(|| Error::Validation(format!("Unknown provider: {provider}")))?;
        let api_key = secrets::get_api_key(self.store.as_ref(), provider)
            .await?
            .ok_or_else(|| Error::Validation(format!("{provider} API key not configured")))?;

        let mut request = self
            .http
            .post(format!("{}/embeddings", config.base_url))
            .timeout(EMBED_TIMEOUT)
            .bearer_auth(api_key);
        for (name, value) in config.extra_headers {
            request = request.header(*name, *value);
        }

        let response = request
            .json(&EmbeddingRequest {
                model: model.to_string(),
                input: text.to_string(),
            })
            .send()
            .await
            .map_err(classify_request_error)?;
        let response = check_status(response).await?;
        let parsed: EmbeddingResponse = response.json().await.map_err(classify_request_error)?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| Error::Provider("Provider returned no embeddings".to_string()))
    }
}

/// Map transport errors: connection problems are provider-unavailable,
/// everything else is transient and retryable.
fn classify_request_error(e: reqwest::Error) -> Error {
    if e.is_connect() {
        Error::Provider(format!("Connection failed: {e}"))
    } else if e.is_timeout() {
        Error::Transient(format!("Request timed out: {e}"))
    } else {
        Error::Transient(format!("Request failed: {e}"))
    }
}

/// Turn non-success statuses into typed errors; 5xx is transient.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let snippet: String = body.chars().take(500).collect();
    if status.is_server_error() {
        Err(Error::Transient(format!("Provider error {status}: {snippet}")))
    } else {
        Err(Error::Provider(format!("Provider error {status}: {snippet}")))
    }
}

/// Linear backoff, doubled while a 5xx suggests the model is still loading.
fn backoff_delay(error: &Error, attempt: u32) -> Duration {
    let base = u64::from(attempt) + 1;
    match error {
        Error::Transient(message) if message.contains("Provider error 5") => {
            Duration::from_secs(2 * base)
        }
        _ => Duration::from_secs(base),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    #[test]
    fn messages_carry_context_in_system_prompt() {
        let history = vec![ChatTurn {
            role: Role::User,
            content: "earlier".to_string(),
        }];
        let messages =
            LlmGateway::build_messages("question", Some("## Relevant Memories:\n..."), &history);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, "system");
        assert!(messages[0].content.contains("Context:"));
        assert_eq!(messages[1].role, "user");
        assert_eq!(messages[2].content, "question");
    }

    #[test]
    fn empty_context_leaves_system_prompt_bare() {
        let messages = LlmGateway::build_messages("hi", None, &[]);
        assert_eq!(messages.len(), 2);
        assert!(!messages[0].content.contains("Context:"));
    }

    #[test]
    fn backoff_is_longer_for_server_errors() {
        let transient = Error::Transient("Provider error 500: loading".to_string());
        let other = Error::Transient("Request timed out".to_string());
        assert_eq!(backoff_delay(&transient, 0), Duration::from_secs(2));
        assert_eq!(backoff_delay(&other, 0), Duration::from_secs(1));
        assert_eq!(backoff_delay(&transient, 1), Duration::from_secs(4));
    }
}
