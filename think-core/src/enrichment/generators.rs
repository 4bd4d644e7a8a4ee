//! LLM generation steps used by the enrichment workers.
//!
//! Each generator is a single constrained completion; failures degrade to an
//! empty result so one bad call never sinks the whole pipeline.

use tracing::error;

use crate::llm::{parse, LlmGateway};

fn head(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// 1-2 sentence prose summary.
pub async fn generate_summary(gateway: &LlmGateway, content: &str, title: &str) -> String {
    let prompt = format!(
        "Summarize the following content in 1-2 sentences. Be concise and capture the main idea.\n\n\
         Title: {title}\nContent: {}\n\nSummary:",
        head(content, 3000)
    );
    match gateway
        .complete(
            "You are a helpful assistant that creates concise summaries.",
            &prompt,
            150,
            None,
        )
        .await
    {
        Ok(raw) => raw.trim().to_string(),
        Err(e) => {
            error!("Failed to generate summary: {e}");
            String::new()
        }
    }
}

/// Rewritten title for web memories, stripping site names and separators.
pub async fn generate_title(gateway: &LlmGateway, content: &str, original_title: &str) -> String {
    let prompt = format!(
        "Generate a concise, descriptive title for this webpage content.\n\n\
         Original page title: {original_title}\nContent preview: {}\n\n\
         Requirements:\n\
         - 5-10 words maximum\n\
         - Capture the main topic/purpose\n\
         - Remove site names, separators like \"|\" or \"-\", and marketing fluff\n\
         - Be informative and scannable\n\nTitle:",
        head(content, 2000)
    );
    complete_title(gateway, &prompt, "You are a helpful assistant that creates concise, descriptive titles. Respond with only the title, no quotes or extra formatting.").await
}

/// Title generated from a voice transcript.
pub async fn generate_voice_title(gateway: &LlmGateway, transcript: &str) -> String {
    let prompt = format!(
        "Generate a concise, descriptive title for this voice note transcript.\n\n\
         Transcript: {}\n\n\
         Requirements:\n\
         - 5-10 words maximum\n\
         - Capture the main topic or key point\n\
         - Be informative and scannable\n\nTitle:",
        head(transcript, 1000)
    );
    complete_title(gateway, &prompt, "You are a helpful assistant that creates concise, descriptive titles for voice notes. Respond with only the title, no quotes or extra formatting.").await
}

/// Title generated from extracted document text.
pub async fn generate_document_title(
    gateway: &LlmGateway,
    content: &str,
    filename: &str,
) -> String {
    let prompt = format!(
        "Generate a concise, descriptive title for this document.\n\n\
         Original filename: {filename}\nContent preview: {}\n\n\
         Requirements:\n\
         - 5-10 words maximum\n\
         - Capture the main topic or purpose\n\
         - Be informative and scannable\n\nTitle:",
        head(content, 2000)
    );
    complete_title(gateway, &prompt, "You are a helpful assistant that creates concise, descriptive titles for documents. Respond with only the title, no quotes or extra formatting.").await
}

/// Short title for a conversation's first message; max 8 words.
pub async fn generate_conversation_title(gateway: &LlmGateway, message: &str) -> String {
    let prompt = format!(
        "Generate a concise title for this chat message.\n\n\
         Message: {}\n\n\
         Requirements:\n\
         - 5-8 words maximum\n\
         - Capture the main topic or intent\n\
         - Be informative and scannable\n\nTitle:",
        head(message, 500)
    );
    complete_title(gateway, &prompt, "You are a helpful assistant that creates concise chat titles. Respond with only the title, no quotes or extra formatting.").await
}

async fn complete_title(gateway: &LlmGateway, prompt: &str, system: &str) -> String {
    match gateway.complete(system, prompt, 50, None).await {
        Ok(raw) => parse::clean_title(&raw),
        Err(e) => {
            error!("Failed to generate title: {e}");
            String::new()
        }
    }
}

/// 3-5 tags, preferring the existing vocabulary.
pub async fn generate_tags(
    gateway: &LlmGateway,
    content: &str,
    title: &str,
    existing_tags: &[String],
) -> Vec<String> {
    let existing = if existing_tags.is_empty() {
        "none yet".to_string()
    } else {
        existing_tags
            .iter()
            .take(50)
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    };

    let prompt = format!(
        "Analyze this content and suggest 3-5 relevant tags for categorization.\n\n\
         Existing tags in the system: [{existing}]\n\n\
         IMPORTANT: Prefer using existing tags when they fit. Only create new tags if none of the existing tags are appropriate.\n\n\
         Title: {title}\nContent: {}\n\n\
         Return ONLY a JSON array of tag strings, like: [\"tag1\", \"tag2\", \"tag3\"]\n\
         Tags should be lowercase, single words or short phrases (2-3 words max).\n\nTags:",
        head(content, 2000)
    );

    match gateway
        .complete(
            "You are a helpful assistant that categorizes content with relevant tags. Always respond with a valid JSON array.",
            &prompt,
            100,
            None,
        )
        .await
    {
        Ok(raw) => {
            let tags = parse::parse_tag_array(&raw);
            if tags.is_empty() {
                error!("Failed to parse tags response: {}", head(&raw, 200));
            }
            tags
        }
        Err(e) => {
            error!("Failed to generate tags: {e}");
            Vec::new()
        }
    }
}

/// Structured summary optimized for semantic retrieval; this is what gets
/// embedded instead of the raw content.
pub async fn generate_embedding_summary(
    gateway: &LlmGateway,
    content: &str,
    title: &str,
) -> String {
    let prompt = format!(
        "Analyze this content and create a structured summary for semantic search.\n\n\
         Title: {title}\nContent: {}\n\n\
         Create a structured summary in this exact format:\n\
         Topic: [main subject in 3-5 words]\n\
         Concepts: [key concepts, technologies, or ideas - comma separated]\n\
         Keywords: [searchable terms - comma separated]\n\n\
         Q: What is this about?\n\
         A: [1 sentence description]\n\n\
         Q: Why might this be saved?\n\
         A: [likely reasons for saving - learning, reference, project, etc.]\n\n\
         Output only the structured summary, nothing else.",
        head(content, 3000)
    );

    match gateway
        .complete(
            "You create structured summaries for semantic search. Follow the exact format requested.",
            &prompt,
            300,
            None,
        )
        .await
    {
        Ok(raw) => raw.trim().to_string(),
        Err(e) => {
            error!("Failed to generate embedding summary: {e}");
            String::new()
        }
    }
}

/// 2-3 contextual follow-up questions for the chat UI; best-effort.
pub async fn generate_followup_suggestions(
    gateway: &LlmGateway,
    user_message: &str,
    assistant_response: &str,
    source_titles: &[String],
) -> Vec<String> {
    let source_context = if source_titles.is_empty() {
        String::new()
    } else {
        format!(
            "\nRetrieved memories: {}",
            source_titles
                .iter()
                .take(3)
                .cloned()
                .collect::<Vec<_>>()
                .join(", ")
        )
    };

    let prompt = format!(
        "Based on this conversation, suggest 2-3 natural follow-up questions the user might ask.\n\n\
         User asked: {}\n\nAssistant responded: {}\n{source_context}\n\n\
         Requirements:\n\
         - Questions should be specific and actionable\n\
         - Reference the actual content discussed\n\
         - If memories were retrieved, consider questions about those topics\n\
         - Keep questions concise (under 15 words each)\n\
         - Make them genuinely useful, not generic\n\
         - Do NOT suggest questions like \"tell me more\" or \"can you elaborate\"\n\n\
         Return ONLY a JSON array of 2-3 question strings, like: [\"Question 1?\", \"Question 2?\"]",
        head(user_message, 500),
        head(assistant_response, 1000)
    );

    match gateway
        .complete(
            "Generate helpful follow-up questions. Return only valid JSON array of strings.",
            &prompt,
            150,
            Some(0.7),
        )
        .await
    {
        Ok(raw) => parse::parse_followups(&raw),
        Err(e) => {
            error!("Failed to generate follow-up suggestions: {e}");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn head_respects_char_boundaries() {
        let s = "héllo wörld".repeat(100);
        let cut = head(&s, 501);
        assert!(cut.len() <= 501);
        assert!(s.starts_with(cut));
    }
}
