//! The end-to-end chat pipeline.
//!
//! Persist the question, answer it through the orchestrator, persist the
//! answer, then run feedback. Only an unopenable assistant store or a failed
//! write of the inbound message is fatal; everything else degrades.

use serde::Serialize;

use super::conversation;
use super::feedback::{self, Exchange};
use super::orchestrator::HybridOrchestrator;
use super::query_agent::{FactSource, QueryAgent, SqliteQueryExecutor};
use super::recommend;
use super::retrieval::VectorContextRetriever;
use super::types::{FeedbackReport, Sender};
use super::Assistant;
use crate::error::{AssistError, Result};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub answer: String,
    pub session_id: String,
    pub message_id: i64,
    pub answer_message_id: Option<i64>,
    pub feedback: FeedbackReport,
}

impl Assistant {
    pub fn chat(&self, seller_id: i64, message: &str, customer_id: Option<i64>) -> Result<ChatReply> {
        let conn = self
            .databases
            .open_assistant()
            .map_err(|e| AssistError::Store(format!("{e:#}")))?;

        let session_id = conversation::resolve_session_id(&conn, seller_id);

        let question_vector = self.embedder.embed(message);
        let message_id = conversation::append_message(
            &conn,
            &session_id,
            seller_id,
            Sender::Requester,
            message,
            &question_vector,
        )
        .map_err(|e| {
            tracing::error!(seller_id, error = %e, "inbound message not persisted");
            AssistError::Persistence(format!("{e:#}"))
        })?;

        tracing::info!(seller_id, message_id, session_id = %session_id, "chat request");

        let retriever = VectorContextRetriever::new(&conn, &self.embedder, self.settings.context_k)
            .excluding(message_id)
            .with_query_vector(&question_vector);

        let executor = match SqliteQueryExecutor::open(&self.databases) {
            Ok(executor) => Some(executor),
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "query agent unavailable");
                None
            }
        };
        let agent = executor
            .as_ref()
            .map(|ex| QueryAgent::new(self.generator.as_ref(), ex));
        let facts = agent.as_ref().map(|a| a as &dyn FactSource);

        let answer = HybridOrchestrator::new(self.generator.as_ref(), facts)
            .answer(seller_id, message, &retriever);

        let answer_vector = self.embedder.embed(&answer);
        let answer_message_id = match conversation::append_message(
            &conn,
            &session_id,
            seller_id,
            Sender::Assistant,
            &answer,
            &answer_vector,
        ) {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::error!(seller_id, error = %e, "assistant answer not persisted");
                None
            }
        };

        let exchange = Exchange {
            seller_id,
            customer_id,
            message_id: Some(message_id),
            question: message,
            answer: &answer,
        };
        let feedback = feedback::process_feedback(&conn, &exchange, |customer, limit| {
            recommend::recommend(&conn, &self.databases, customer, limit)
        });

        Ok(ChatReply {
            answer,
            session_id,
            message_id,
            answer_message_id,
            feedback,
        })
    }
}
