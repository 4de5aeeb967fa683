//! Text-to-vector embedding pipeline.
//!
//! Provides the [`EmbeddingProvider`] trait, an OpenAI-compatible HTTP
//! implementation, and the [`EmbeddingAdapter`] every other component goes
//! through. The adapter never fails: blank input or a provider failure yields
//! a zero vector of the configured dimension, which downstream retrieval
//! treats as "no signal".

pub mod http;

use std::sync::Arc;

use crate::error::Result;

/// Trait for embedding text into vectors.
///
/// All methods are synchronous. Callers in async contexts should use
/// `tokio::task::spawn_blocking`.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text string into a vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of text strings. Implementations may override for batched requests.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Return the number of dimensions this provider produces.
    fn dimensions(&self) -> usize;

    fn model_name(&self) -> &str;
}

/// Create the HTTP embedding provider from config.
pub fn create_provider(
    config: &crate::config::EmbeddingConfig,
) -> Result<Arc<dyn EmbeddingProvider>> {
    let provider = http::HttpEmbeddingProvider::new(config)?;
    Ok(Arc::new(provider))
}

/// Text → fixed-dimension vector, with failures absorbed into the zero vector.
#[derive(Clone)]
pub struct EmbeddingAdapter {
    provider: Arc<dyn EmbeddingProvider>,
    dim: usize,
}

impl EmbeddingAdapter {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        let dim = provider.dimensions();
        Self { provider, dim }
    }

    pub fn dimensions(&self) -> usize {
        self.dim
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    /// Embed `text`. Blank input short-circuits without calling the provider.
    pub fn embed(&self, text: &str) -> Vec<f32> {
        if text.trim().is_empty() {
            return vec![0.0; self.dim];
        }

        match self.provider.embed(text) {
            Ok(v) if v.len() == self.dim => l2_normalize(&v),
            Ok(v) => {
                tracing::warn!(
                    expected = self.dim,
                    got = v.len(),
                    "embedding dimension mismatch, using zero vector"
                );
                vec![0.0; self.dim]
            }
            Err(e) => {
                tracing::warn!(error = %e, kind = e.kind(), "embedding failed, using zero vector");
                vec![0.0; self.dim]
            }
        }
    }

    /// Embed several texts at once; each entry degrades independently.
    pub fn embed_batch(&self, texts: &[&str]) -> Vec<Vec<f32>> {
        let live: Vec<&str> = texts
            .iter()
            .copied()
            .filter(|t| !t.trim().is_empty())
            .collect();
        if live.is_empty() {
            return texts.iter().map(|_| vec![0.0; self.dim]).collect();
        }

        let mut embedded = match self.provider.embed_batch(&live) {
            Ok(vs) if vs.len() == live.len() => vs.into_iter(),
            Ok(vs) => {
                tracing::warn!(
                    expected = live.len(),
                    got = vs.len(),
                    "embedding batch size mismatch, embedding one by one"
                );
                return texts.iter().map(|t| self.embed(t)).collect();
            }
            Err(e) => {
                tracing::warn!(error = %e, "batch embedding failed, embedding one by one");
                return texts.iter().map(|t| self.embed(t)).collect();
            }
        };

        texts
            .iter()
            .map(|t| {
                if t.trim().is_empty() {
                    return vec![0.0; self.dim];
                }
                match embedded.next() {
                    Some(v) if v.len() == self.dim => l2_normalize(&v),
                    _ => vec![0.0; self.dim],
                }
            })
            .collect()
    }
}

/// L2-normalize a vector. Returns a zero vector if the input norm is zero.
pub fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 && norm.is_finite() {
        v.iter().map(|x| x / norm).collect()
    } else {
        vec![0.0; v.len()]
    }
}

pub fn is_zero_vector(v: &[f32]) -> bool {
    v.iter().all(|x| *x == 0.0)
}

/// Component-wise mean of the non-zero vectors of dimension `dim`, or `None` if there are none.
pub fn mean_vector<'a>(vectors: impl IntoIterator<Item = &'a [f32]>, dim: usize) -> Option<Vec<f32>> {
    let mut sum = vec![0.0f32; dim];
    let mut n = 0usize;
    for v in vectors {
        if v.len() != dim || is_zero_vector(v) {
            continue;
        }
        for (acc, x) in sum.iter_mut().zip(v) {
            *acc += x;
        }
        n += 1;
    }
    if n == 0 {
        return None;
    }
    Some(sum.into_iter().map(|x| x / n as f32).collect())
}

/// Render a vector as the JSON-array literal sqlite-vec accepts, six decimals per component.
pub fn to_vector_literal(v: &[f32]) -> String {
    let parts: Vec<String> = v.iter().map(|x| format!("{x:.6}")).collect();
    format!("[{}]", parts.join(","))
}
