//! Nearest-neighbor retrieval over stored embeddings.
//!
//! All lookups share one query shape: cosine distance computed by sqlite-vec
//! against the bound vector literal, rows with a missing, zero or
//! wrong-dimension embedding skipped, ordered by ascending distance with
//! ascending id as the tie-break. Message lookups are always scoped to one
//! seller.

use anyhow::{Context, Result};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};

use super::types::SimilarityHit;
use crate::embedding::{is_zero_vector, to_vector_literal, EmbeddingAdapter};

/// Returned in place of context when nothing usable was retrieved.
pub const NO_CONTEXT: &str = "no context found";

/// Pluggable source of conversational context for the orchestrator.
pub trait ContextRetriever {
    fn retrieve(&self, seller_id: i64, question: &str) -> crate::error::Result<String>;
}

/// A prior message close to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextHit {
    pub message_id: i64,
    pub text: String,
    pub similarity: f64,
}

/// Similarity search over the seller's conversation log.
pub fn search_messages(
    conn: &Connection,
    seller_id: i64,
    query: &[f32],
    k: usize,
    exclude_message_id: Option<i64>,
) -> Result<Vec<ContextHit>> {
    if k == 0 || query.is_empty() || is_zero_vector(query) {
        return Ok(Vec::new());
    }

    let exclusion = if exclude_message_id.is_some() {
        " AND id != ?5"
    } else {
        ""
    };
    let sql = format!(
        "SELECT id, message, distance FROM (
             SELECT id, message,
                    CASE WHEN length(embedding) = ?3 * 4 AND embedding != zeroblob(?3 * 4)
                         THEN vec_distance_cosine(embedding, vec_f32(?2)) END AS distance
             FROM chat_messages
             WHERE seller_id = ?1{exclusion}
         )
         WHERE distance IS NOT NULL
         ORDER BY distance ASC, id ASC
         LIMIT ?4"
    );

    let mut params: Vec<Value> = vec![
        Value::Integer(seller_id),
        Value::Text(to_vector_literal(query)),
        Value::Integer(query.len() as i64),
        Value::Integer(k as i64),
    ];
    if let Some(id) = exclude_message_id {
        params.push(Value::Integer(id));
    }

    let mut stmt = conn.prepare(&sql).context("failed to prepare message search")?;
    let hits = stmt
        .query_map(params_from_iter(params), |row| {
            let distance: f64 = row.get(2)?;
            Ok(ContextHit {
                message_id: row.get(0)?,
                text: row.get(1)?,
                similarity: 1.0 - distance,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("message search failed")?;

    Ok(hits)
}

/// One line per hit: `- (0.873) message text`.
pub fn format_context(hits: &[ContextHit]) -> String {
    if hits.is_empty() {
        return NO_CONTEXT.to_string();
    }
    hits.iter()
        .map(|h| format!("- ({:.3}) {}", h.similarity, h.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Embed `query_text` and return the formatted top-`k` context for the seller.
/// Any failure degrades to [`NO_CONTEXT`].
pub fn retrieve_context(
    conn: &Connection,
    embedder: &EmbeddingAdapter,
    seller_id: i64,
    query_text: &str,
    k: usize,
    exclude_message_id: Option<i64>,
) -> String {
    let query = embedder.embed(query_text);
    context_for_vector(conn, seller_id, &query, k, exclude_message_id)
}

fn context_for_vector(
    conn: &Connection,
    seller_id: i64,
    query: &[f32],
    k: usize,
    exclude_message_id: Option<i64>,
) -> String {
    match search_messages(conn, seller_id, query, k, exclude_message_id) {
        Ok(hits) => {
            tracing::debug!(seller_id, hits = hits.len(), "context retrieved");
            format_context(&hits)
        }
        Err(e) => {
            tracing::warn!(seller_id, error = %e, "context retrieval failed");
            NO_CONTEXT.to_string()
        }
    }
}

/// Default [`ContextRetriever`]: vector search over the seller's message log.
pub struct VectorContextRetriever<'a> {
    conn: &'a Connection,
    embedder: &'a EmbeddingAdapter,
    k: usize,
    exclude_message_id: Option<i64>,
    query_vector: Option<&'a [f32]>,
}

impl<'a> VectorContextRetriever<'a> {
    pub fn new(conn: &'a Connection, embedder: &'a EmbeddingAdapter, k: usize) -> Self {
        Self {
            conn,
            embedder,
            k,
            exclude_message_id: None,
            query_vector: None,
        }
    }

    /// Skip this message, typically the question that was just persisted.
    pub fn excluding(mut self, message_id: i64) -> Self {
        self.exclude_message_id = Some(message_id);
        self
    }

    /// Reuse an embedding already computed for the question.
    pub fn with_query_vector(mut self, vector: &'a [f32]) -> Self {
        self.query_vector = Some(vector);
        self
    }
}

impl ContextRetriever for VectorContextRetriever<'_> {
    fn retrieve(&self, seller_id: i64, question: &str) -> crate::error::Result<String> {
        let context = match self.query_vector {
            Some(v) => context_for_vector(self.conn, seller_id, v, self.k, self.exclude_message_id),
            None => retrieve_context(
                self.conn,
                self.embedder,
                seller_id,
                question,
                self.k,
                self.exclude_message_id,
            ),
        };
        Ok(context)
    }
}

/// Nearest mirrored products to `query`, skipping `exclude_ids`.
pub fn retrieve_similar_products(
    conn: &Connection,
    query: &[f32],
    k: usize,
    exclude_ids: &[i64],
) -> Result<Vec<SimilarityHit>> {
    nearest(conn, "product_catalog", query, k, exclude_ids)
}

/// Nearest customer profiles to `query`, skipping `exclude_ids`.
pub fn retrieve_similar_customers(
    conn: &Connection,
    query: &[f32],
    k: usize,
    exclude_ids: &[i64],
) -> Result<Vec<SimilarityHit>> {
    nearest(conn, "customer_profiles", query, k, exclude_ids)
}

fn nearest(
    conn: &Connection,
    table: &'static str,
    query: &[f32],
    k: usize,
    exclude_ids: &[i64],
) -> Result<Vec<SimilarityHit>> {
    if k == 0 || query.is_empty() || is_zero_vector(query) {
        return Ok(Vec::new());
    }

    // ?1 = vector literal, ?2 = dimension, ?3 = limit, ?4.. = excluded ids
    let exclusion = if exclude_ids.is_empty() {
        String::new()
    } else {
        let placeholders: Vec<String> = (0..exclude_ids.len())
            .map(|i| format!("?{}", i + 4))
            .collect();
        format!(" WHERE id NOT IN ({})", placeholders.join(", "))
    };
    let sql = format!(
        "SELECT id, distance FROM (
             SELECT id,
                    CASE WHEN length(embedding) = ?2 * 4 AND embedding != zeroblob(?2 * 4)
                         THEN vec_distance_cosine(embedding, vec_f32(?1)) END AS distance
             FROM {table}{exclusion}
         )
         WHERE distance IS NOT NULL
         ORDER BY distance ASC, id ASC
         LIMIT ?3"
    );

    let mut params: Vec<Value> = vec![
        Value::Text(to_vector_literal(query)),
        Value::Integer(query.len() as i64),
        Value::Integer(k as i64),
    ];
    params.extend(exclude_ids.iter().map(|id| Value::Integer(*id)));

    let mut stmt = conn
        .prepare(&sql)
        .with_context(|| format!("failed to prepare similarity search on {table}"))?;
    let hits = stmt
        .query_map(params_from_iter(params), |row| {
            let distance: f64 = row.get(1)?;
            Ok(SimilarityHit {
                id: row.get(0)?,
                similarity: 1.0 - distance,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()
        .with_context(|| format!("similarity search on {table} failed"))?;

    Ok(hits)
}
