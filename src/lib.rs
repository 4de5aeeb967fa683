//! Retrieval-augmented assistant for point-of-sale staff.
//!
//! Answers natural-language questions by blending three sources:
//!
//! | Source | Module | Degrades to |
//! |--------|--------|-------------|
//! | Similar prior messages from the seller's conversation log | [`assistant::retrieval`] | `no context found` |
//! | Facts from a synthesized, safety-gated query on the transactional store | [`assistant::query_agent`] | `(no data)` |
//! | Product suggestions from purchase-history embeddings or best sellers | [`assistant::recommend`] | popularity, then empty |
//!
//! The [`assistant::orchestrator`] merges whatever survived into a single
//! grounding prompt and makes exactly one generation call. No single stage's
//! failure aborts a response.
//!
//! # Architecture
//!
//! - **Storage**: two SQLite databases via rusqlite. The assistant store holds
//!   the conversation log, embedding-enriched mirrors of customers and
//!   products, and audit tables. Vector distance comes from
//!   [sqlite-vec](https://github.com/asg017/sqlite-vec).
//! - **Providers**: OpenAI-compatible embedding and chat-completion endpoints
//!   behind the [`embedding::EmbeddingProvider`] and
//!   [`generation::TextGenerator`] traits, injected once and shared.
//! - **Transport**: axum HTTP server, see [`server`].
//!
//! # Modules
//!
//! - [`config`]: TOML configuration with environment overrides
//! - [`db`]: connections, schema, migrations, health checks
//! - [`embedding`]: embedding adapter and HTTP provider
//! - [`generation`]: text generation trait and HTTP provider
//! - [`assistant`]: the retrieval, query, recommendation and feedback pipeline
//! - [`server`]: HTTP routes

pub mod assistant;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod server;
