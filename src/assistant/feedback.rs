//! Post-answer bookkeeping: interaction log, inferred preferences, and
//! recommendation records.
//!
//! Best effort throughout. Every write is attempted independently; a failed
//! write is logged and the next one still runs.

use anyhow::{Context, Result};
use rusqlite::{params, Connection};

use super::types::{FeedbackReport, PreferenceSource, Recommendation};

pub const INTERACTION_KIND: &str = "assistant_response";
pub const PREFERENCE_KEY: &str = "affinity";
pub const RECOMMENDATION_BATCH: usize = 5;
/// Recorded when a recommendation carries no usable score.
pub const NEUTRAL_SCORE: f64 = 0.5;

const MAX_PREFERENCE_VALUE_CHARS: usize = 200;
const MAX_REASON_CHARS: usize = 500;

const PREFERENCE_KEYWORDS: &[&str] = &["like", "prefer", "favorite", "favourite", "enjoy", "love"];
const RECOMMENDATION_TRIGGERS: &[&str] = &["recommend", "suggest", "products for", "what else"];

/// One answered question, as seen by the feedback stage.
#[derive(Debug, Clone)]
pub struct Exchange<'a> {
    pub seller_id: i64,
    pub customer_id: Option<i64>,
    /// Id of the persisted inbound message; `None` skips the interaction log.
    pub message_id: Option<i64>,
    pub question: &'a str,
    pub answer: &'a str,
}

pub fn mentions_preference(answer: &str) -> bool {
    let lowered = answer.to_lowercase();
    PREFERENCE_KEYWORDS.iter().any(|k| lowered.contains(k))
}

pub fn asks_for_recommendations(question: &str) -> bool {
    let lowered = question.to_lowercase();
    RECOMMENDATION_TRIGGERS.iter().any(|t| lowered.contains(t))
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Run every feedback step. `recommend` is only invoked when the question asks for suggestions.
pub fn process_feedback(
    conn: &Connection,
    exchange: &Exchange<'_>,
    recommend: impl FnOnce(Option<i64>, usize) -> Vec<Recommendation>,
) -> FeedbackReport {
    let mut report = FeedbackReport::default();

    match exchange.message_id {
        Some(message_id) => match log_interaction(
            conn,
            message_id,
            exchange.customer_id,
            Some(exchange.seller_id),
            INTERACTION_KIND,
            exchange.question,
        ) {
            Ok(_) => report.interaction_logged = true,
            Err(e) => tracing::error!(message_id, error = %e, "interaction log write failed"),
        },
        None => tracing::warn!(seller_id = exchange.seller_id, "no message id, interaction not logged"),
    }

    if let Some(customer_id) = exchange.customer_id {
        if mentions_preference(exchange.answer) {
            let value = truncate_chars(exchange.answer, MAX_PREFERENCE_VALUE_CHARS);
            match record_preference(
                conn,
                customer_id,
                PREFERENCE_KEY,
                &value,
                PreferenceSource::Inferred,
                1.0,
            ) {
                Ok(_) => report.preference_recorded = true,
                Err(e) => tracing::error!(customer_id, error = %e, "preference write failed"),
            }
        }
    }

    if asks_for_recommendations(exchange.question) {
        let recs = recommend(exchange.customer_id, RECOMMENDATION_BATCH);
        for rec in &recs {
            let score = rec.score.filter(|s| s.is_finite()).unwrap_or(NEUTRAL_SCORE);
            match record_recommendation(
                conn,
                exchange.customer_id,
                Some(exchange.seller_id),
                Some(rec.product_id),
                rec.reason.as_str(),
                score,
            ) {
                Ok(_) => report.recommendations_recorded += 1,
                Err(e) => tracing::error!(product_id = rec.product_id, error = %e, "recommendation write failed"),
            }
        }
    }

    tracing::debug!(
        interaction = report.interaction_logged,
        preference = report.preference_recorded,
        recommendations = report.recommendations_recorded,
        "feedback processed"
    );
    report
}

pub fn log_interaction(
    conn: &Connection,
    message_id: i64,
    customer_id: Option<i64>,
    seller_id: Option<i64>,
    kind: &str,
    detail: &str,
) -> Result<i64> {
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO interaction_log (message_id, customer_id, seller_id, kind, detail, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![message_id, customer_id, seller_id, kind, detail, now],
    )
    .context("failed to insert interaction")?;
    Ok(conn.last_insert_rowid())
}

pub fn record_preference(
    conn: &Connection,
    customer_id: i64,
    key: &str,
    value: &str,
    source: PreferenceSource,
    weight: f64,
) -> Result<i64> {
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO preference_signals (customer_id, key, value, source, weight, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![customer_id, key, value, source.as_str(), weight, now],
    )
    .context("failed to insert preference signal")?;
    Ok(conn.last_insert_rowid())
}

pub fn record_recommendation(
    conn: &Connection,
    customer_id: Option<i64>,
    seller_id: Option<i64>,
    product_id: Option<i64>,
    reason: &str,
    score: f64,
) -> Result<i64> {
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO recommendations (customer_id, seller_id, product_id, reason, score, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            customer_id,
            seller_id,
            product_id,
            truncate_chars(reason, MAX_REASON_CHARS),
            score,
            now
        ],
    )
    .context("failed to insert recommendation")?;
    Ok(conn.last_insert_rowid())
}
