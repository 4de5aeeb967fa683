//! OpenAI-compatible `/chat/completions` generator.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;

use super::TextGenerator;
use crate::config::GenerationConfig;
use crate::error::{AssistError, Result};

pub struct HttpTextGenerator {
    client: reqwest::Client,
    runtime: Handle,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl HttpTextGenerator {
    /// Must be called from within a Tokio runtime; requests are driven on its handle.
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| AssistError::Config(format!("no async runtime for generation client: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AssistError::Config(format!("failed to build generation client: {e}")))?;

        Ok(Self {
            client,
            runtime,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: std::env::var(&config.api_key_env).ok().filter(|k| !k.is_empty()),
        })
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.endpoint);
        let body = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: 0.0,
        };

        let mut req = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req
            .send()
            .await
            .map_err(|e| AssistError::Generation(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error = response.text().await.unwrap_or_default();
            return Err(AssistError::Generation(format!("{status}: {error}")));
        }

        let data: ChatResponse = response
            .json()
            .await
            .map_err(|e| AssistError::Generation(format!("failed to parse response: {e}")))?;

        first_content(data)
    }
}

fn first_content(data: ChatResponse) -> Result<String> {
    data.choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|c| c.trim().to_string())
        .ok_or_else(|| AssistError::Generation("empty completion".into()))
}

impl TextGenerator for HttpTextGenerator {
    fn generate(&self, prompt: &str) -> Result<String> {
        self.runtime.block_on(self.complete(prompt))
    }
}
