//! Session title generation using a fast/cheap LLM
//!
//! Generates short, meaningful titles based on the first user message.

use crate::llm::{ContentBlock, LlmRequest, LlmResponse, LlmService};
use std::time::Duration;
use tokio::time::timeout;

/// Title used until (or instead of) a generated one
pub const DEFAULT_TITLE: &str = "New Chat";

const TITLE_PROMPT: &str = r#"Generate a very short (3-6 words) title summarizing this request. Output only the title, no quotes or punctuation. Examples:
- "add 2 and 3" -> Adding Two Numbers
- "Plot sin(x) from 0 to 10" -> Sine Wave Plot
- "Search the latest Rust release notes" -> Rust Release Notes

Request:"#;

const TITLE_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_PROMPT_CHARS: usize = 500;
const MAX_TITLE_LENGTH: usize = 60;

/// Generate a title for a session based on its first message.
///
/// Returns None if title generation fails (timeout, error, empty reply).
/// The caller falls back to `DEFAULT_TITLE` in that case.
pub async fn generate_title(message_text: &str, llm_service: &dyn LlmService) -> Option<String> {
    // Truncate very long messages for the prompt
    let truncated: String = if message_text.chars().count() > MAX_PROMPT_CHARS {
        let head: String = message_text.chars().take(MAX_PROMPT_CHARS).collect();
        format!("{head}...")
    } else {
        message_text.to_string()
    };

    let mut request = LlmRequest::prompt(format!("{TITLE_PROMPT}\n{truncated}"));
    request.max_tokens = Some(50);

    match timeout(TITLE_TIMEOUT, llm_service.complete(&request)).await {
        Ok(Ok(response)) => extract_title_from_response(&response)
            .map(|t| sanitize_title(&t))
            .filter(|t| !t.is_empty()),
        Ok(Err(e)) => {
            tracing::warn!(error = %e.message, "Title generation LLM error");
            None
        }
        Err(_) => {
            tracing::warn!("Title generation timed out");
            None
        }
    }
}

/// Extract the title text from the LLM response
fn extract_title_from_response(response: &LlmResponse) -> Option<String> {
    response.content.iter().find_map(|block| match block {
        ContentBlock::Text { text } if !text.trim().is_empty() => Some(text.trim().to_string()),
        _ => None,
    })
}

/// Strip punctuation and quotes, collapse whitespace, cap the length at a
/// word boundary
fn sanitize_title(title: &str) -> String {
    let cleaned: String = title
        .lines()
        .next()
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || matches!(c, '-' | '\'' | '+'))
        .collect();

    let mut result = String::new();
    for word in cleaned.split_whitespace() {
        let extra = if result.is_empty() { 0 } else { 1 };
        if result.chars().count() + extra + word.chars().count() > MAX_TITLE_LENGTH {
            break;
        }
        if extra == 1 {
            result.push(' ');
        }
        result.push_str(word);
    }

    if result.is_empty() {
        // A single over-long word
        cleaned.split_whitespace().next().map_or_else(String::new, |w| {
            w.chars().take(MAX_TITLE_LENGTH).collect()
        })
    } else {
        result
    }
}
