//! OpenAI-compatible `/embeddings` provider.
//!
//! Works against any server speaking the same contract (OpenAI, Ollama's
//! `/v1` shim, vLLM). The API key is read from the environment variable named
//! in config; when it is unset, requests go out unauthenticated.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;

use super::EmbeddingProvider;
use crate::config::EmbeddingConfig;
use crate::error::{AssistError, Result};

pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    runtime: Handle,
    endpoint: String,
    model: String,
    dimensions: usize,
    api_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbedDatum {
    index: usize,
    embedding: Vec<f32>,
}

impl HttpEmbeddingProvider {
    /// Must be called from within a Tokio runtime; requests are driven on its handle.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| AssistError::Config(format!("no async runtime for embedding client: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AssistError::Config(format!("failed to build embedding client: {e}")))?;

        Ok(Self {
            client,
            runtime,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            dimensions: config.dimensions,
            api_key: std::env::var(&config.api_key_env).ok().filter(|k| !k.is_empty()),
        })
    }

    async fn request(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.endpoint);
        let body = EmbedRequest {
            model: &self.model,
            input: texts.to_vec(),
        };

        let mut req = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req
            .send()
            .await
            .map_err(|e| AssistError::Embedding(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error = response.text().await.unwrap_or_default();
            return Err(AssistError::Embedding(format!("{status}: {error}")));
        }

        let data: EmbedResponse = response
            .json()
            .await
            .map_err(|e| AssistError::Embedding(format!("failed to parse response: {e}")))?;

        Ok(order_by_index(data.data))
    }
}

fn order_by_index(mut data: Vec<EmbedDatum>) -> Vec<Vec<f32>> {
    data.sort_by_key(|d| d.index);
    data.into_iter().map(|d| d.embedding).collect()
}

impl EmbeddingProvider for HttpEmbeddingProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.runtime
            .block_on(self.request(&[text]))?
            .into_iter()
            .next()
            .ok_or_else(|| AssistError::Embedding("no embedding returned".into()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.runtime.block_on(self.request(texts))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
