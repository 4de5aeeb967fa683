//! Error taxonomy for the assistant pipeline.
//!
//! Every fallible boundary (embedding, retrieval, query synthesis, execution,
//! generation, persistence) reports one of these variants. Most of them are
//! absorbed by the component that produced them and turned into a degraded
//! result; only [`AssistError::Persistence`] of the inbound message and
//! [`AssistError::Store`] reach the HTTP caller.

use thiserror::Error;

/// Result type alias for assistant operations.
pub type Result<T> = std::result::Result<T, AssistError>;

#[derive(Debug, Error)]
pub enum AssistError {
    /// Embedding provider error, timeout, or malformed response.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// Vector store query error.
    #[error("retrieval failed: {0}")]
    Retrieval(String),

    /// Intent label missing or outside the closed set.
    #[error("intent classification failed: {0}")]
    IntentClassification(String),

    #[error("query synthesis failed: {0}")]
    QuerySynthesis(String),

    /// The synthesized query was refused before execution.
    #[error("query rejected by safety gate: {0}")]
    SafetyGate(String),

    #[error("query execution failed: {0}")]
    QueryExecution(String),

    /// Final (or intermediate) text-generation call failed.
    #[error("text generation failed: {0}")]
    Generation(String),

    #[error("persistence failed: {0}")]
    Persistence(String),

    /// A store connection could not be opened.
    #[error("store unavailable: {0}")]
    Store(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl AssistError {
    /// Short machine-readable kind, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Embedding(_) => "embedding",
            Self::Retrieval(_) => "retrieval",
            Self::IntentClassification(_) => "intent_classification",
            Self::QuerySynthesis(_) => "query_synthesis",
            Self::SafetyGate(_) => "safety_gate",
            Self::QueryExecution(_) => "query_execution",
            Self::Generation(_) => "generation",
            Self::Persistence(_) => "persistence",
            Self::Store(_) => "store",
            Self::Config(_) => "config",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_prefix() {
        let err = AssistError::SafetyGate("wildcard column selection".into());
        assert_eq!(
            err.to_string(),
            "query rejected by safety gate: wildcard column selection"
        );
        assert_eq!(err.kind(), "safety_gate");
    }
}
