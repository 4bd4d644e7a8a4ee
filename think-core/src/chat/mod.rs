//! Conversational RAG orchestration.
//!
//! Drives the full loop: conversation bookkeeping, optional follow-up
//! rewrite, retrieval, provider dispatch (sync and streaming), persistence
//! of messages with sources and token usage, and follow-up suggestions.
//! Provider failures become stored assistant messages so they stay visible
//! when the conversation is reopened.

pub mod special;
pub mod suggestions;

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::enrichment::{generators, Enricher};
use crate::error::{Error, Result};
use crate::events::{EventBus, EventKind, HubEvent};
use crate::llm::{models, LlmGateway};
use crate::query::{self, rewrite};
use crate::retrieval;
use crate::storage::MemoryStore;
use crate::types::{ChatTurn, RetrievedSource, Role, TokenUsage};

use suggestions::{QuickPrompt, SuggestionsCache};

/// Messages shorter than this skip retrieval entirely.
const MIN_RAG_MESSAGE_LEN: usize = 10;

/// Candidates fetched from hybrid search before filtering.
const SEARCH_LIMIT: usize = 10;

/// Provisional conversation title length before the AI title lands.
const PROVISIONAL_TITLE_LEN: usize = 50;

/// One self-contained frame of a streaming chat response.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatFrame {
    Meta {
        conversation_id: i64,
        sources: Vec<RetrievedSource>,
        searched: bool,
    },
    Token {
        content: String,
    },
    Done {
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<TokenUsage>,
        #[serde(skip_serializing_if = "Option::is_none")]
        context_window: Option<u32>,
    },
    Followups {
        suggestions: Vec<String>,
    },
    Error {
        message: String,
    },
}

/// Result of a synchronous chat call.
#[derive(Debug, Clone, Serialize)]
pub struct ChatOutcome {
    pub response: Option<String>,
    pub conversation_id: i64,
    pub sources: Vec<RetrievedSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub followups: Vec<String>,
    pub searched: bool,
}

/// Chat orchestrator.
#[derive(Clone)]
pub struct ChatService {
    store: Arc<dyn MemoryStore>,
    gateway: LlmGateway,
    events: EventBus,
    enricher: Enricher,
    suggestions: Arc<SuggestionsCache>,
}

impl ChatService {
    pub fn new(
        store: Arc<dyn MemoryStore>,
        gateway: LlmGateway,
        events: EventBus,
        enricher: Enricher,
    ) -> Self {
        ChatService {
            store,
            gateway,
            events,
            enricher,
            suggestions: Arc::new(SuggestionsCache::new()),
        }
    }

    /// Quick prompts for the chat surface; cached for five minutes.
    pub async fn quick_prompts(&self) -> Vec<QuickPrompt> {
        suggestions::get_quick_prompts(self.store.as_ref(), &self.suggestions).await
    }

    /// Validate or create the conversation, persist the user turn, set the
    /// provisional title for new conversations, and return the history
    /// excluding the turn just added.
    async fn prepare(
        &self,
        message: &str,
        conversation_id: Option<i64>,
    ) -> Result<(i64, Vec<ChatTurn>)> {
        let conversation_id = match conversation_id {
            Some(id) => {
                self.store
                    .get_conversation(id)
                    .await?
                    .ok_or_else(|| Error::not_found("Conversation", id))?;
                id
            }
            None => {
                let conversation = self.store.create_conversation("").await?;
                self.events.publish(HubEvent::new(
                    EventKind::ConversationCreated,
                    conversation.id,
                    serde_json::to_value(&conversation).ok(),
                ));

                let provisional = provisional_title(message);
                self.store
                    .update_conversation_title(conversation.id, &provisional)
                    .await?;
                self.enricher
                    .schedule_conversation_title(conversation.id, message.to_string());
                conversation.id
            }
        };

        self.store
            .add_message(conversation_id, Role::User, message, &[], None)
            .await?
            .ok_or_else(|| Error::not_found("Conversation", conversation_id))?;

        let history = match self.store.get_conversation(conversation_id).await? {
            Some(detail) => {
                let mut turns: Vec<ChatTurn> = detail
                    .messages
                    .iter()
                    .map(|m| ChatTurn {
                        role: m.role,
                        content: m.content.clone(),
                    })
                    .collect();
                // The last turn is the user message added above
                turns.pop();
                turns
            }
            None => Vec::new(),
        };

        Ok((conversation_id, history))
    }

    /// Retrieve RAG context for a message. Retrieval is an enhancement, so
    /// every failure degrades to an empty context.
    pub async fn retrieve_context(
        &self,
        message: &str,
        history: &[ChatTurn],
    ) -> (String, Vec<RetrievedSource>) {
        if message.trim().len() < MIN_RAG_MESSAGE_LEN {
            return (String::new(), Vec::new());
        }

        if let Some(handler) = special::is_special_prompt(message) {
            info!("Special prompt matched: {}", handler.name());
            return special::execute_special_handler(self.store.as_ref(), handler).await;
        }

        match self.search_context(message, history).await {
            Ok(result) => result,
            Err(e) => {
                error!("RAG retrieval error: {e}");
                (String::new(), Vec::new())
            }
        }
    }

    async fn search_context(
        &self,
        message: &str,
        history: &[ChatTurn],
    ) -> Result<(String, Vec<RetrievedSource>)> {
        let (query, rewritten) =
            rewrite::maybe_rewrite_query(&self.gateway, message, history).await;
        if rewritten {
            info!("Using rewritten query for retrieval");
        }

        let processed = query::preprocess_query(&query);
        let keywords = query::extract_keywords(&query);
        let embedding = self.gateway.embed(&processed).await?;

        let hits = self
            .store
            .search_similar(&embedding, SEARCH_LIMIT, Some(&keywords))
            .await?;
        if hits.is_empty() {
            return Ok((String::new(), Vec::new()));
        }

        let model = self.gateway.current_embedding_model();
        let filtered = retrieval::filter_hits_dynamically(hits, Some(&model));
        let context =
            retrieval::format_hits_as_context(&filtered, retrieval::DEFAULT_CONTEXT_BUDGET);
        let sources = filtered
            .iter()
            .map(|h| RetrievedSource {
                id: h.id,
                title: h.title.clone(),
                url: h.url.clone(),
                distance: h.distance,
                match_type: Some(h.match_type),
                rrf_score: Some(h.rrf_score),
            })
            .collect();
        Ok((context, sources))
    }

    /// Human-readable guidance stored when the provider is unreachable.
    fn provider_error_message(&self) -> String {
        if self.gateway.is_local_provider() {
            "Cannot connect to Ollama. Please make sure Ollama is running, or switch to a cloud provider in Settings."
                .to_string()
        } else {
            "Cannot connect to the AI provider. Please check your API key in Settings."
                .to_string()
        }
    }

    /// Synchronous chat: full RAG loop, one completion, persistence, and
    /// follow-up suggestions.
    pub async fn chat(&self, message: &str, conversation_id: Option<i64>) -> Result<ChatOutcome> {
        let (conversation_id, history) = self.prepare(message, conversation_id).await?;
        let (context, sources) = self.retrieve_context(message, &history).await;
        let context_opt = (!context.is_empty()).then_some(context.as_str());

        match self.gateway.chat(message, context_opt, &history).await {
            Ok(response) => {
                self.store
                    .add_message(conversation_id, Role::Assistant, &response, &sources, None)
                    .await?;

                let titles: Vec<String> =
                    sources.iter().filter_map(|s| s.title.clone()).collect();
                let followups = generators::generate_followup_suggestions(
                    &self.gateway,
                    message,
                    &response,
                    &titles,
                )
                .await;

                Ok(ChatOutcome {
                    response: Some(response),
                    conversation_id,
                    sources,
                    error: None,
                    followups,
                    searched: true,
                })
            }
            Err(e) => {
                let error_msg = match &e {
                    Error::Provider(_) => self.provider_error_message(),
                    other => format!("An error occurred: {other}"),
                };
                self.store
                    .add_message(conversation_id, Role::Assistant, &error_msg, &[], None)
                    .await?;

                Ok(ChatOutcome {
                    response: None,
                    conversation_id,
                    sources: Vec::new(),
                    error: Some(error_msg),
                    followups: Vec::new(),
                    searched: true,
                })
            }
        }
    }

    /// Streaming chat. Frames arrive in order: `meta`, `token`*, `done`,
    /// then a best-effort `followups`; provider failures end the stream with
    /// an `error` frame after persisting the message.
    pub async fn chat_stream(
        &self,
        message: &str,
        conversation_id: Option<i64>,
    ) -> Result<mpsc::Receiver<ChatFrame>> {
        let (conversation_id, history) = self.prepare(message, conversation_id).await?;

        let (tx, rx) = mpsc::channel(64);
        let service = self.clone();
        let message = message.to_string();

        tokio::spawn(async move {
            let (context, sources) = service.retrieve_context(&message, &history).await;
            let context_opt = (!context.is_empty()).then_some(context.as_str());

            if tx
                .send(ChatFrame::Meta {
                    conversation_id,
                    sources: sources.clone(),
                    searched: true,
                })
                .await
                .is_err()
            {
                return;
            }

            let mut stream = match service
                .gateway
                .chat_stream(&message, context_opt, &history)
                .await
            {
                Ok(stream) => stream,
                Err(e) => {
                    let error_msg = match &e {
                        Error::Provider(_) => service.provider_error_message(),
                        other => format!("An error occurred: {other}"),
                    };
                    if let Err(e) = service
                        .store
                        .add_message(conversation_id, Role::Assistant, &error_msg, &[], None)
                        .await
                    {
                        error!("Failed to persist error message: {e}");
                    }
                    let _ = tx.send(ChatFrame::Error { message: error_msg }).await;
                    return;
                }
            };

            let mut full_response = String::new();
            let mut usage: Option<TokenUsage> = None;
            let mut client_gone = false;

            while let Some((token, reported)) = stream.recv().await {
                if let Some(reported) = reported {
                    usage = Some(reported);
                }
                if token.is_empty() {
                    continue;
                }
                full_response.push_str(&token);
                if !client_gone
                    && tx.send(ChatFrame::Token { content: token }).await.is_err()
                {
                    // Client disconnected; keep draining so the full
                    // response still gets persisted
                    client_gone = true;
                }
            }

            if let Err(e) = service
                .store
                .add_message(
                    conversation_id,
                    Role::Assistant,
                    &full_response,
                    &sources,
                    usage,
                )
                .await
            {
                error!("Failed to persist assistant message: {e}");
            }

            if client_gone {
                return;
            }

            let context_window = usage
                .is_some()
                .then(|| models::get_context_window(&service.gateway.chat_model()));
            let _ = tx.send(ChatFrame::Done {
                usage,
                context_window,
            })
            .await;

            let titles: Vec<String> = sources.iter().filter_map(|s| s.title.clone()).collect();
            let followups = generators::generate_followup_suggestions(
                &service.gateway,
                &message,
                &full_response,
                &titles,
            )
            .await;
            if !followups.is_empty() {
                let _ = tx
                    .send(ChatFrame::Followups {
                        suggestions: followups,
                    })
                    .await;
            } else {
                warn!("No follow-up suggestions generated");
            }
        });

        Ok(rx)
    }
}

fn provisional_title(message: &str) -> String {
    if message.len() <= PROVISIONAL_TITLE_LEN {
        return message.to_string();
    }
    let mut end = PROVISIONAL_TITLE_LEN;
    while end > 0 && !message.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &message[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provisional_title_truncates_long_messages() {
        let long = "a".repeat(80);
        let title = provisional_title(&long);
        assert_eq!(title.len(), 53);
        assert!(title.ends_with("..."));

        assert_eq!(provisional_title("short"), "short");
    }

    #[test]
    fn frames_serialize_with_type_tag() {
        let frame = ChatFrame::Token {
            content: "hi".to_string(),
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(json, "{\"type\":\"token\",\"content\":\"hi\"}");

        let done = ChatFrame::Done {
            usage: None,
            context_window: None,
        };
        assert_eq!(serde_json::to_string(&done).unwrap(), "{\"type\":\"done\"}");
    }
}
