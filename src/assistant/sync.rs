//! Mirror customers and products from the transactional store into the
//! assistant store, embedding products and deriving customer profile vectors.
//!
//! Upserts are keyed by id and skip rows whose mirrored fields are unchanged,
//! so resynchronizing an unchanged store rewrites nothing. A product is sent
//! to the embedding provider only when its source text changed, its stored
//! vector is unusable, or a forced run was requested.

use std::collections::{BTreeMap, HashMap};

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

use super::types::SyncSummary;
use crate::db::{bytes_to_embedding, embedding_to_bytes, migrations};
use crate::embedding::{is_zero_vector, l2_normalize, mean_vector, EmbeddingAdapter};

const EMBED_BATCH_SIZE: usize = 64;

struct StoreCustomer {
    id: i64,
    name: String,
    email: Option<String>,
    tax_id: Option<String>,
    phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
struct StoreProduct {
    id: i64,
    name: String,
    description: Option<String>,
    price: Option<f64>,
    category_id: Option<i64>,
}

struct MirroredProduct {
    product: StoreProduct,
    embedding_source: Option<String>,
    embedding: Option<Vec<f32>>,
}

/// Text a product embedding is computed from.
pub fn embedding_source(name: &str, description: Option<&str>) -> String {
    format!("{name}. {}", description.unwrap_or_default())
        .trim()
        .to_string()
}

/// Full resynchronization. `progress` is called with `(done, total)` as products are embedded.
pub fn synchronize(
    store: &Connection,
    assistant: &mut Connection,
    embedder: &EmbeddingAdapter,
    force: bool,
    progress: &mut dyn FnMut(usize, usize),
) -> Result<SyncSummary> {
    let customers = sync_customers(store, assistant)?;
    let (products, embedded, failed) = sync_products(store, assistant, embedder, force, progress)?;
    let profiles = refresh_customer_embeddings(store, assistant)?;

    // Vectors from an older model may survive a failed pass, so only a complete one is recorded.
    if failed == 0 {
        migrations::set_embedding_model(assistant, embedder.model_name(), embedder.dimensions())
            .context("failed to record embedding model")?;
    } else {
        tracing::warn!(failed, "embedding model not recorded, some products were not embedded");
    }

    tracing::info!(customers, products, embedded, failed, profiles, force, "synchronization finished");
    Ok(SyncSummary {
        customers,
        products,
        embedded,
    })
}

fn sync_customers(store: &Connection, assistant: &mut Connection) -> Result<usize> {
    let mut stmt = store
        .prepare("SELECT id, name, email, taxId, phone FROM customer ORDER BY id")
        .context("failed to read customers from store")?;
    let customers = stmt
        .query_map([], |row| {
            let name: Option<String> = row.get(1)?;
            Ok(StoreCustomer {
                id: row.get(0)?,
                name: name.unwrap_or_default(),
                email: row.get(2)?,
                tax_id: row.get(3)?,
                phone: row.get(4)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let now = chrono::Utc::now().to_rfc3339();
    let tx = assistant.transaction()?;
    let mut written = 0usize;
    for c in &customers {
        written += tx.execute(
            "INSERT INTO customer_profiles (id, name, email, tax_id, phone, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 email = excluded.email,
                 tax_id = excluded.tax_id,
                 phone = excluded.phone,
                 updated_at = excluded.updated_at
             WHERE customer_profiles.name IS NOT excluded.name
                OR customer_profiles.email IS NOT excluded.email
                OR customer_profiles.tax_id IS NOT excluded.tax_id
                OR customer_profiles.phone IS NOT excluded.phone",
            params![c.id, c.name, c.email, c.tax_id, c.phone, now],
        )?;
    }
    tx.commit()?;

    tracing::debug!(total = customers.len(), written, "customers mirrored");
    Ok(customers.len())
}

fn load_mirrored_products(assistant: &Connection) -> Result<HashMap<i64, MirroredProduct>> {
    let mut stmt = assistant.prepare(
        "SELECT id, name, description, price, category_id, embedding_source, embedding
         FROM product_catalog",
    )?;
    let rows = stmt
        .query_map([], |row| {
            let blob: Option<Vec<u8>> = row.get(6)?;
            Ok(MirroredProduct {
                product: StoreProduct {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    description: row.get(2)?,
                    price: row.get(3)?,
                    category_id: row.get(4)?,
                },
                embedding_source: row.get(5)?,
                embedding: blob.map(|b| bytes_to_embedding(&b)),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("failed to read mirrored products")?;
    Ok(rows.into_iter().map(|m| (m.product.id, m)).collect())
}

fn sync_products(
    store: &Connection,
    assistant: &mut Connection,
    embedder: &EmbeddingAdapter,
    force: bool,
    progress: &mut dyn FnMut(usize, usize),
) -> Result<(usize, usize, usize)> {
    let mut stmt = store
        .prepare("SELECT id, name, description, price, categoryId FROM product ORDER BY id")
        .context("failed to read products from store")?;
    let products = stmt
        .query_map([], |row| {
            let name: Option<String> = row.get(1)?;
            Ok(StoreProduct {
                id: row.get(0)?,
                name: name.unwrap_or_default(),
                description: row.get(2)?,
                price: row.get(3)?,
                category_id: row.get(4)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mirrored = load_mirrored_products(assistant)?;
    let dim = embedder.dimensions();

    // (product, source text, whether the stored vector is still usable)
    let mut to_embed: Vec<(&StoreProduct, String, bool)> = Vec::new();
    let mut to_update: Vec<&StoreProduct> = Vec::new();
    for p in &products {
        let source = embedding_source(&p.name, p.description.as_deref());
        let existing = mirrored.get(&p.id);
        let vector_usable = existing
            .and_then(|m| m.embedding.as_deref())
            .is_some_and(|v| v.len() == dim && !is_zero_vector(v));
        let source_unchanged =
            existing.and_then(|m| m.embedding_source.as_deref()) == Some(source.as_str());

        if force || !vector_usable || !source_unchanged {
            to_embed.push((p, source, vector_usable));
        } else if existing.map(|m| &m.product) != Some(p) {
            to_update.push(p);
        }
    }

    tracing::info!(
        total = products.len(),
        embed = to_embed.len(),
        update = to_update.len(),
        "product sync plan"
    );

    let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(to_embed.len());
    progress(0, to_embed.len());
    for chunk in to_embed.chunks(EMBED_BATCH_SIZE) {
        let texts: Vec<&str> = chunk.iter().map(|(_, s, _)| s.as_str()).collect();
        vectors.extend(embedder.embed_batch(&texts));
        progress(vectors.len(), to_embed.len());
    }

    let now = chrono::Utc::now().to_rfc3339();
    let tx = assistant.transaction()?;
    let mut embedded = 0usize;
    let mut failed = 0usize;
    for ((p, source, had_vector), vector) in to_embed.iter().zip(&vectors) {
        let ok = !is_zero_vector(vector);
        if !ok {
            failed += 1;
            if *had_vector {
                // Keep the previous vector and source; a changed source is retried next run.
                tracing::warn!(product_id = p.id, "product embedding unavailable, keeping previous vector");
                update_product_fields(&tx, p, &now)?;
                continue;
            }
        }
        // A failed embedding for a row with no usable vector is stored as zeros with no
        // source, so the next run retries it.
        let source = ok.then_some(source.as_str());
        tx.execute(
            "INSERT INTO product_catalog
                 (id, name, description, price, category_id, embedding, embedding_source, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 description = excluded.description,
                 price = excluded.price,
                 category_id = excluded.category_id,
                 embedding = excluded.embedding,
                 embedding_source = excluded.embedding_source,
                 updated_at = excluded.updated_at",
            params![
                p.id,
                p.name,
                p.description,
                p.price,
                p.category_id,
                embedding_to_bytes(vector),
                source,
                now
            ],
        )?;
        if ok {
            embedded += 1;
        } else {
            tracing::warn!(product_id = p.id, "product embedding unavailable, will retry next sync");
        }
    }
    for p in &to_update {
        update_product_fields(&tx, p, &now)?;
    }
    tx.commit()?;

    Ok((products.len(), embedded, failed))
}

/// Rewrite the mirrored fields of a product, leaving its embedding untouched.
fn update_product_fields(conn: &Connection, p: &StoreProduct, now: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE product_catalog
         SET name = ?2, description = ?3, price = ?4, category_id = ?5, updated_at = ?6
         WHERE id = ?1",
        params![p.id, p.name, p.description, p.price, p.category_id, now],
    )
}

/// Recompute every customer's vector as the normalized mean of purchased product vectors.
/// Returns how many profiles changed.
fn refresh_customer_embeddings(store: &Connection, assistant: &mut Connection) -> Result<usize> {
    let mut stmt = store.prepare(
        "SELECT DISTINCT o.customerId, ol.productId
         FROM order_line ol
         JOIN \"order\" o ON o.id = ol.orderId
         WHERE o.customerId IS NOT NULL AND ol.productId IS NOT NULL
         ORDER BY 1, 2",
    )?;
    let mut purchases: BTreeMap<i64, Vec<i64>> = BTreeMap::new();
    let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))?;
    for row in rows {
        let (customer_id, product_id) = row?;
        purchases.entry(customer_id).or_default().push(product_id);
    }

    let catalog: HashMap<i64, Vec<f32>> = load_mirrored_products(assistant)?
        .into_values()
        .filter_map(|m| Some((m.product.id, m.embedding?)))
        .collect();

    let tx = assistant.transaction()?;
    let mut changed = 0usize;
    for (customer_id, product_ids) in &purchases {
        let vectors = product_ids
            .iter()
            .filter_map(|id| catalog.get(id))
            .map(|v| v.as_slice());
        let Some(dim) = product_ids
            .iter()
            .filter_map(|id| catalog.get(id))
            .find(|v| !is_zero_vector(v))
            .map(|v| v.len())
        else {
            continue;
        };
        let Some(mean) = mean_vector(vectors, dim) else {
            continue;
        };
        let bytes = embedding_to_bytes(&l2_normalize(&mean));
        changed += tx.execute(
            "UPDATE customer_profiles SET embedding = ?2 WHERE id = ?1 AND embedding IS NOT ?2",
            params![customer_id, bytes],
        )?;
    }
    tx.commit()?;

    tracing::debug!(customers = purchases.len(), changed, "customer profiles refreshed");
    Ok(changed)
}

/// Stored profile vector for one customer, if any.
pub fn customer_embedding(assistant: &Connection, customer_id: i64) -> Result<Option<Vec<f32>>> {
    let blob: Option<Option<Vec<u8>>> = assistant
        .query_row(
            "SELECT embedding FROM customer_profiles WHERE id = ?1",
            [customer_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(blob.flatten().map(|b| bytes_to_embedding(&b)))
}
