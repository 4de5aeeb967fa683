//! Prompt-in, text-out generation.
//!
//! The same [`TextGenerator`] is used for intent classification, query
//! synthesis and the final grounded answer.

pub mod http;

use std::sync::Arc;

use crate::error::Result;

/// Synchronous text generation. Callers in async contexts should use
/// `tokio::task::spawn_blocking`.
pub trait TextGenerator: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String>;
}

/// Create the HTTP chat-completions generator from config.
pub fn create_generator(config: &crate::config::GenerationConfig) -> Result<Arc<dyn TextGenerator>> {
    Ok(Arc::new(http::HttpTextGenerator::new(config)?))
}

/// Strip a surrounding Markdown code fence (with optional language tag) and trim.
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    // Drop the language tag line, if any
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
        .to_string()
}
