//! Product recommendations with a multi-tier fallback chain.
//!
//! 1. No customer → popularity.
//! 2. Purchased product ids from the transactional store; none → popularity.
//! 3. Their mirrored embeddings; none usable → popularity.
//! 4. Nearest catalog products to the normalized mean embedding, excluding
//!    what was already bought; no hits → popularity.
//! 5. Popularity: total quantity sold per product, descending.
//!
//! Nothing in here returns an error to the caller. Failures advance to the
//! next tier; if the transactional store cannot even be opened the result is
//! empty.

use std::collections::HashMap;

use anyhow::{Context, Result};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};

use super::retrieval::retrieve_similar_products;
use super::types::{Recommendation, RecommendationReason, SimilarityHit};
use crate::db::{bytes_to_embedding, Databases};
use crate::embedding::{is_zero_vector, l2_normalize, mean_vector};

/// Open the transactional store and run the fallback chain.
pub fn recommend(
    catalog: &Connection,
    databases: &Databases,
    customer_id: Option<i64>,
    limit: usize,
) -> Vec<Recommendation> {
    let store = match databases.open_store() {
        Ok(conn) => conn,
        Err(e) => {
            tracing::error!(error = %e, "store unavailable, no recommendations");
            return Vec::new();
        }
    };
    recommend_with(catalog, &store, customer_id, limit)
}

/// Fallback chain over already-open connections.
pub fn recommend_with(
    catalog: &Connection,
    store: &Connection,
    customer_id: Option<i64>,
    limit: usize,
) -> Vec<Recommendation> {
    if limit == 0 {
        return Vec::new();
    }

    let Some(customer_id) = customer_id else {
        tracing::debug!("no customer, using popularity");
        return popular_or_empty(store, limit);
    };

    let purchased = match purchased_product_ids(store, customer_id) {
        Ok(ids) if !ids.is_empty() => ids,
        Ok(_) => {
            tracing::debug!(customer_id, "no purchase history, using popularity");
            return popular_or_empty(store, limit);
        }
        Err(e) => {
            tracing::warn!(customer_id, error = %e, "purchase history lookup failed");
            return popular_or_empty(store, limit);
        }
    };

    let profile = match purchase_profile(catalog, &purchased) {
        Ok(Some(v)) => v,
        Ok(None) => {
            tracing::debug!(customer_id, purchased = purchased.len(), "no usable embeddings, using popularity");
            return popular_or_empty(store, limit);
        }
        Err(e) => {
            tracing::warn!(customer_id, error = %e, "embedding lookup failed");
            return popular_or_empty(store, limit);
        }
    };

    match similar_products(catalog, &profile, limit, &purchased) {
        Ok(recs) if !recs.is_empty() => {
            tracing::info!(customer_id, count = recs.len(), "similarity recommendations");
            recs
        }
        Ok(_) => {
            tracing::debug!(customer_id, "no similar products, using popularity");
            popular_or_empty(store, limit)
        }
        Err(e) => {
            tracing::warn!(customer_id, error = %e, "similarity search failed");
            popular_or_empty(store, limit)
        }
    }
}

/// Catalog products nearest to an arbitrary embedding, nothing excluded.
pub fn recommend_by_embedding(catalog: &Connection, vector: &[f32], limit: usize) -> Vec<Recommendation> {
    match similar_products(catalog, &l2_normalize(vector), limit, &[]) {
        Ok(recs) => recs,
        Err(e) => {
            tracing::warn!(error = %e, "similarity search failed");
            Vec::new()
        }
    }
}

/// Distinct ids of products the customer has bought, ascending.
pub fn purchased_product_ids(store: &Connection, customer_id: i64) -> Result<Vec<i64>> {
    let mut stmt = store.prepare(
        "SELECT DISTINCT ol.productId
         FROM order_line ol
         JOIN \"order\" o ON o.id = ol.orderId
         WHERE o.customerId = ?1 AND ol.productId IS NOT NULL
         ORDER BY 1",
    )?;
    let ids = stmt
        .query_map([customer_id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<i64>>>()
        .context("failed to read purchase history")?;
    Ok(ids)
}

/// Normalized mean of the stored embeddings for `product_ids`, skipping zero vectors.
pub fn purchase_profile(catalog: &Connection, product_ids: &[i64]) -> Result<Option<Vec<f32>>> {
    let embeddings = fetch_embeddings(catalog, product_ids)?;
    let Some(dim) = embeddings.iter().find(|v| !is_zero_vector(v)).map(|v| v.len()) else {
        return Ok(None);
    };
    Ok(mean_vector(embeddings.iter().map(|v| v.as_slice()), dim).map(|m| l2_normalize(&m)))
}

fn fetch_embeddings(catalog: &Connection, product_ids: &[i64]) -> Result<Vec<Vec<f32>>> {
    if product_ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders: Vec<String> = (1..=product_ids.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "SELECT embedding FROM product_catalog
         WHERE embedding IS NOT NULL AND id IN ({})
         ORDER BY id",
        placeholders.join(", ")
    );
    let mut stmt = catalog.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(product_ids.iter()), |row| {
            let blob: Vec<u8> = row.get(0)?;
            Ok(bytes_to_embedding(&blob))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("failed to read product embeddings")?;
    Ok(rows)
}

fn similar_products(
    catalog: &Connection,
    query: &[f32],
    limit: usize,
    exclude_ids: &[i64],
) -> Result<Vec<Recommendation>> {
    let hits = retrieve_similar_products(catalog, query, limit, exclude_ids)?;
    hydrate(catalog, &hits)
}

/// Attach catalog details to similarity hits, keeping their order.
fn hydrate(catalog: &Connection, hits: &[SimilarityHit]) -> Result<Vec<Recommendation>> {
    if hits.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders: Vec<String> = (1..=hits.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "SELECT id, name, description, price FROM product_catalog WHERE id IN ({})",
        placeholders.join(", ")
    );
    let mut stmt = catalog.prepare(&sql)?;
    let params: Vec<Value> = hits.iter().map(|h| Value::Integer(h.id)).collect();
    let details: HashMap<i64, (String, Option<String>, Option<f64>)> = stmt
        .query_map(params_from_iter(params), |row| {
            Ok((row.get(0)?, (row.get(1)?, row.get(2)?, row.get(3)?)))
        })?
        .collect::<rusqlite::Result<_>>()
        .context("failed to read catalog details")?;

    Ok(hits
        .iter()
        .filter_map(|hit| {
            let (name, description, price) = details.get(&hit.id)?.clone();
            Some(Recommendation {
                product_id: hit.id,
                name,
                description,
                price,
                score: Some(hit.similarity),
                reason: RecommendationReason::EmbeddingSimilarity,
            })
        })
        .collect())
}

/// Best sellers by total quantity across all order lines. Ties break on ascending id.
pub fn popular_products(store: &Connection, limit: usize) -> Result<Vec<Recommendation>> {
    let mut stmt = store.prepare(
        "SELECT p.id, p.name, p.description, p.price, SUM(ol.quantity) AS total
         FROM product p
         JOIN order_line ol ON ol.productId = p.id
         GROUP BY p.id
         ORDER BY total DESC, p.id ASC
         LIMIT ?1",
    )?;
    let recs = stmt
        .query_map([limit as i64], |row| {
            let name: Option<String> = row.get(1)?;
            Ok(Recommendation {
                product_id: row.get(0)?,
                name: name.unwrap_or_default(),
                description: row.get(2)?,
                price: row.get(3)?,
                score: row.get(4)?,
                reason: RecommendationReason::Popularity,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("failed to read popular products")?;
    Ok(recs)
}

fn popular_or_empty(store: &Connection, limit: usize) -> Vec<Recommendation> {
    match popular_products(store, limit) {
        Ok(recs) => recs,
        Err(e) => {
            tracing::warn!(error = %e, "popularity fallback failed");
            Vec::new()
        }
    }
}
