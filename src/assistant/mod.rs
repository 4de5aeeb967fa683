//! The assistant core: conversation log, retrieval, query agent, orchestrator,
//! recommendations, feedback and mirror synchronization.
//!
//! [`Assistant`] owns the injected providers and store paths and exposes the
//! three request-level operations (chat, synchronize, recommend). Every
//! operation is synchronous and opens its own connections; async callers run
//! them on the blocking pool.

pub mod chat;
pub mod conversation;
pub mod feedback;
pub mod orchestrator;
pub mod query_agent;
pub mod recommend;
pub mod retrieval;
pub mod sync;
pub mod types;

use std::sync::Arc;

use crate::config::{AssistantConfig, RetrievalConfig};
use crate::db::{migrations, Databases};
use crate::embedding::{self, EmbeddingAdapter};
use crate::error::{AssistError, Result};
use crate::generation::{self, TextGenerator};

pub use chat::ChatReply;
pub use types::{Recommendation, SyncSummary};

pub struct Assistant {
    databases: Databases,
    embedder: EmbeddingAdapter,
    generator: Arc<dyn TextGenerator>,
    settings: RetrievalConfig,
}

impl Assistant {
    pub fn new(
        databases: Databases,
        embedder: EmbeddingAdapter,
        generator: Arc<dyn TextGenerator>,
        settings: RetrievalConfig,
    ) -> Self {
        Self {
            databases,
            embedder,
            generator,
            settings,
        }
    }

    /// Build the HTTP providers from config. Must run inside a Tokio runtime.
    pub fn from_config(config: &AssistantConfig) -> Result<Self> {
        let provider = embedding::create_provider(&config.embedding)?;
        let generator = generation::create_generator(&config.generation)?;
        Ok(Self::new(
            Databases::from_config(config),
            EmbeddingAdapter::new(provider),
            generator,
            config.retrieval.clone(),
        ))
    }

    pub fn databases(&self) -> &Databases {
        &self.databases
    }

    pub fn embedder(&self) -> &EmbeddingAdapter {
        &self.embedder
    }

    /// Warn when stored vectors came from a different model or dimension than configured.
    pub fn check_embedding_model(&self) -> Result<()> {
        let conn = self
            .databases
            .open_assistant()
            .map_err(|e| AssistError::Store(format!("{e:#}")))?;
        let stored_model = migrations::get_embedding_model(&conn)
            .map_err(|e| AssistError::Store(e.to_string()))?;
        let stored_dim = migrations::get_embedding_dimensions(&conn)
            .map_err(|e| AssistError::Store(e.to_string()))?;

        let configured = self.embedder.model_name();
        let dim = self.embedder.dimensions();
        match (stored_model.as_deref(), stored_dim) {
            (Some(model), Some(d)) if model == configured && d == dim => {
                tracing::debug!(model, dimensions = d, "embedding model matches")
            }
            (None, _) => tracing::info!("no embedding model recorded yet, run `sync` to populate"),
            (model, d) => tracing::warn!(
                stored_model = ?model,
                stored_dimensions = ?d,
                configured_model = configured,
                configured_dimensions = dim,
                "embedding model mismatch, run `sync --force` to re-embed"
            ),
        }
        Ok(())
    }

    /// Resynchronize the mirrored catalog from the transactional store.
    pub fn synchronize(&self, force: bool, progress: &mut dyn FnMut(usize, usize)) -> Result<SyncSummary> {
        let store = self
            .databases
            .open_store()
            .map_err(|e| AssistError::Store(format!("{e:#}")))?;
        let mut conn = self
            .databases
            .open_assistant()
            .map_err(|e| AssistError::Store(format!("{e:#}")))?;

        sync::synchronize(&store, &mut conn, &self.embedder, force, progress)
            .map_err(|e| AssistError::Persistence(format!("{e:#}")))
    }

    /// Ranked suggestions for a customer (or best sellers without one). Never fails on
    /// store problems; only an unopenable assistant store is an error.
    pub fn recommend(&self, customer_id: Option<i64>, limit: usize) -> Result<Vec<Recommendation>> {
        let conn = self
            .databases
            .open_assistant()
            .map_err(|e| AssistError::Store(format!("{e:#}")))?;
        Ok(recommend::recommend(&conn, &self.databases, customer_id, limit))
    }
}
