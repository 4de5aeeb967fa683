//! Hybrid orchestrator: conversational context + structured facts → one
//! grounded generation call.
//!
//! Each upstream stage is isolated. A failing stage only replaces its own
//! section of the prompt with a placeholder; the final generation call always
//! happens exactly once, and its failure is replaced by [`GENERATION_APOLOGY`].

use super::query_agent::FactSource;
use super::retrieval::ContextRetriever;
use super::types::QueryOutcome;
use crate::error::AssistError;
use crate::generation::TextGenerator;

pub const CONTEXT_UNAVAILABLE: &str = "(context unavailable)";
pub const NO_DATA: &str = "(no data)";
pub const NONE: &str = "(none)";

/// Returned when the final generation call fails or comes back empty.
pub const GENERATION_APOLOGY: &str =
    "Sorry, I could not generate an answer right now. Please try again in a moment.";

const INSTRUCTIONS: &str = "\
- Always prioritize the structured facts over the conversation history.
- Use the conversation history only as background memory.
- Never invent information that is not present above.
- Never reveal queries, tables, columns or any other internal detail.
- Answer simply, helpfully and objectively.";

pub struct HybridOrchestrator<'a> {
    generator: &'a dyn TextGenerator,
    facts: Option<&'a dyn FactSource>,
}

impl<'a> HybridOrchestrator<'a> {
    /// `facts` is `None` when the query agent could not be initialized.
    pub fn new(generator: &'a dyn TextGenerator, facts: Option<&'a dyn FactSource>) -> Self {
        Self { generator, facts }
    }

    pub fn answer(&self, seller_id: i64, question: &str, retriever: &dyn ContextRetriever) -> String {
        let context = match retriever.retrieve(seller_id, question) {
            Ok(context) => context,
            Err(e) => {
                tracing::warn!(seller_id, kind = e.kind(), error = %e, "context stage degraded");
                CONTEXT_UNAVAILABLE.to_string()
            }
        };

        let outcome = match self.facts {
            Some(facts) => facts.answer(question),
            None => {
                tracing::warn!(seller_id, "query agent unavailable");
                QueryOutcome::failure("query agent unavailable")
            }
        };

        let prompt = build_prompt(&context, &outcome, question);

        match self.generator.generate(&prompt) {
            Ok(answer) if !answer.trim().is_empty() => answer.trim().to_string(),
            Ok(_) => {
                let err = AssistError::Generation("empty answer".into());
                tracing::warn!(seller_id, error = %err, "final generation degraded");
                GENERATION_APOLOGY.to_string()
            }
            Err(e) => {
                tracing::warn!(seller_id, error = %e, "final generation degraded");
                GENERATION_APOLOGY.to_string()
            }
        }
    }
}

/// Flatten result rows into ` | `-joined lines. Absent or empty rows become [`NO_DATA`].
pub fn normalize_rows(outcome: &QueryOutcome) -> String {
    match &outcome.rows {
        Some(rows) if outcome.success && !rows.is_empty() => rows
            .iter()
            .map(|row| row.join(" | "))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => NO_DATA.to_string(),
    }
}

pub fn build_prompt(context: &str, outcome: &QueryOutcome, question: &str) -> String {
    let intent = outcome.intent.map(|i| i.as_str()).unwrap_or(NONE);
    let subject = outcome.subject_name.as_deref().unwrap_or(NONE);
    let facts = normalize_rows(outcome);

    format!(
        "You are an assistant for point-of-sale sellers.\n\n\
         === CONVERSATION HISTORY ===\n{context}\n\n\
         === DETECTED INTENT ===\n{intent}\n\n\
         === DETECTED CUSTOMER ===\n{subject}\n\n\
         === STRUCTURED FACTS ===\n{facts}\n\n\
         === QUESTION ===\n{question}\n\n\
         === RULES ===\n{INSTRUCTIONS}\n"
    )
}
