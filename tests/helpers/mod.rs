#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use pos_assistant::assistant::query_agent::QueryExecutor;
use pos_assistant::assistant::retrieval::ContextRetriever;
use pos_assistant::assistant::Assistant;
use pos_assistant::config::RetrievalConfig;
use pos_assistant::db::{self, embedding_to_bytes, Databases};
use pos_assistant::embedding::{EmbeddingAdapter, EmbeddingProvider};
use pos_assistant::error::{AssistError, Result};
use pos_assistant::generation::TextGenerator;
use rusqlite::{params, Connection};
use tempfile::TempDir;

/// Embedding dimension used throughout the integration tests.
pub const DIM: usize = 16;

/// Open a fresh in-memory assistant database with schema and migrations applied.
pub fn test_db() -> Connection {
    db::load_sqlite_vec();
    let mut conn = Connection::open_in_memory().unwrap();
    conn.pragma_update(None, "foreign_keys", "ON").unwrap();
    db::schema::init_schema(&conn).unwrap();
    db::migrations::run_migrations(&mut conn).unwrap();
    conn
}

/// In-memory transactional store with the seeded point-of-sale data.
pub fn test_store() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    db::schema::init_store_schema(&conn).unwrap();
    seed_store(&conn);
    conn
}

/// Temp directory holding a seeded store file and a (not yet created) assistant file.
pub fn temp_databases() -> (TempDir, Databases) {
    let tmp = TempDir::new().unwrap();
    let dbs = Databases::new(tmp.path().join("assistant.db"), tmp.path().join("store.db"));
    let store = Connection::open(&dbs.store).unwrap();
    db::schema::init_store_schema(&store).unwrap();
    seed_store(&store);
    (tmp, dbs)
}

/// Customers:
///   1 Ana Souza  : orders 100, 101: Espresso Beans x3, Green Tea x1
///   2 Bruno Lima : order 102: Paper Filters x5, Chocolate Bar x2, Milk Frother x1
///   3 Carla Dias : no orders
///
/// Popularity: 6 (5), 1 (3), 5 (2), 2 (1), 4 (1), 3 (never sold).
pub fn seed_store(conn: &Connection) {
    conn.execute_batch(
        "INSERT INTO customer (id, name, taxId, email, phone) VALUES
             (1, 'Ana Souza', '111', 'ana@example.com', '555-0100'),
             (2, 'Bruno Lima', '222', 'bruno@example.com', '555-0200'),
             (3, 'Carla Dias', '333', NULL, NULL);
         INSERT INTO product (id, name, description, price, categoryId) VALUES
             (1, 'Espresso Beans', 'Dark roast coffee beans', 30.0, 1),
             (2, 'Green Tea', 'Loose leaf green tea', 12.0, 2),
             (3, 'Coffee Grinder', 'Burr grinder for coffee beans', 80.0, 3),
             (4, 'Milk Frother', 'Handheld milk frother', 25.0, 3),
             (5, 'Chocolate Bar', 'Dark chocolate bar', 5.0, 4),
             (6, 'Paper Filters', 'Paper coffee filters', 3.0, 3);
         INSERT INTO \"order\" (id, orderDate, customerId, status) VALUES
             (100, '2026-01-02', 1, 'paid'),
             (101, '2026-02-03', 1, 'paid'),
             (102, '2026-02-10', 2, 'open');
         INSERT INTO order_line (orderId, productId, quantity, salePrice, discount) VALUES
             (100, 1, 2, 30.0, 0),
             (100, 2, 1, 12.0, 0),
             (101, 1, 1, 30.0, 0),
             (102, 6, 5, 3.0, 0),
             (102, 5, 2, 5.0, 0),
             (102, 4, 1, 25.0, 0);",
    )
    .unwrap();
}

/// Deterministic unit embedding with a spike at position `seed`.
pub fn test_embedding(seed: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; DIM];
    v[seed % DIM] = 1.0;
    v
}

/// Normalized blend of two spikes: `a` weighted by `wa`, `b` by `1 - wa`.
pub fn blend(a: usize, b: usize, wa: f32) -> Vec<f32> {
    let mut v = vec![0.0f32; DIM];
    v[a % DIM] += wa;
    v[b % DIM] += 1.0 - wa;
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    v.iter().map(|x| x / norm).collect()
}

/// Write a mirrored catalog row directly, bypassing sync.
pub fn insert_catalog_product(conn: &Connection, id: i64, name: &str, embedding: Option<&[f32]>) {
    conn.execute(
        "INSERT INTO product_catalog (id, name, description, price, category_id, embedding, updated_at)
         VALUES (?1, ?2, NULL, 1.0, NULL, ?3, '2026-01-01T00:00:00Z')",
        params![id, name, embedding.map(embedding_to_bytes)],
    )
    .unwrap();
}

pub fn insert_customer_profile(conn: &Connection, id: i64, name: &str, embedding: &[f32]) {
    conn.execute(
        "INSERT INTO customer_profiles (id, name, embedding, updated_at)
         VALUES (?1, ?2, ?3, '2026-01-01T00:00:00Z')",
        params![id, name, embedding_to_bytes(embedding)],
    )
    .unwrap();
}

pub fn count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
        .unwrap()
}

// ── Test doubles ──────────────────────────────────────────────────────────────

/// Bag-of-words embedder: each word adds 1.0 to a bucket derived from its bytes.
pub struct KeywordEmbedder {
    pub calls: AtomicUsize,
    pub fail: bool,
}

impl KeywordEmbedder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: false,
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: true,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; DIM];
        for word in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let bucket = word.bytes().map(|b| b as usize).sum::<usize>() % DIM;
            v[bucket] += 1.0;
        }
        v
    }
}

impl EmbeddingProvider for KeywordEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(AssistError::Embedding("provider down".into()));
        }
        Ok(Self::vector(text))
    }

    fn dimensions(&self) -> usize {
        DIM
    }

    fn model_name(&self) -> &str {
        "keyword-test"
    }
}

pub fn adapter(provider: Arc<KeywordEmbedder>) -> EmbeddingAdapter {
    EmbeddingAdapter::new(provider)
}

/// Replies from a script, in order; once exhausted, every call gets `fallback`.
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Result<String>>>,
    fallback: Option<String>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(script: Vec<Result<String>>, fallback: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fallback: fallback.map(str::to_string),
            prompts: Mutex::new(Vec::new()),
        })
    }

    /// Every call fails.
    pub fn failing() -> Arc<Self> {
        Self::new(Vec::new(), None)
    }

    /// Every call returns `text`.
    pub fn always(text: &str) -> Arc<Self> {
        Self::new(Vec::new(), Some(text))
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn last_prompt(&self) -> String {
        self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

impl TextGenerator for ScriptedGenerator {
    fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match self.script.lock().unwrap().pop_front() {
            Some(reply) => reply,
            None => self
                .fallback
                .clone()
                .ok_or_else(|| AssistError::Generation("no scripted reply".into())),
        }
    }
}

pub fn ok(text: &str) -> Result<String> {
    Ok(text.to_string())
}

pub fn gen_err() -> Result<String> {
    Err(AssistError::Generation("provider down".into()))
}

/// Records every query it is asked to run and returns fixed rows.
pub struct RecordingExecutor {
    pub executed: Mutex<Vec<String>>,
    pub rows: Vec<Vec<String>>,
}

impl RecordingExecutor {
    pub fn new(rows: Vec<Vec<String>>) -> Self {
        Self {
            executed: Mutex::new(Vec::new()),
            rows,
        }
    }

    pub fn calls(&self) -> usize {
        self.executed.lock().unwrap().len()
    }
}

impl QueryExecutor for RecordingExecutor {
    fn execute(&self, sql: &str) -> Result<Vec<Vec<String>>> {
        self.executed.lock().unwrap().push(sql.to_string());
        Ok(self.rows.clone())
    }
}

/// Retriever that always errors.
pub struct FailingRetriever;

impl ContextRetriever for FailingRetriever {
    fn retrieve(&self, _seller_id: i64, _question: &str) -> Result<String> {
        Err(AssistError::Retrieval("vector store offline".into()))
    }
}

/// Retriever returning a fixed context string.
pub struct StaticRetriever(pub &'static str);

impl ContextRetriever for StaticRetriever {
    fn retrieve(&self, _seller_id: i64, _question: &str) -> Result<String> {
        Ok(self.0.to_string())
    }
}

pub fn build_assistant(
    dbs: Databases,
    embedder: Arc<KeywordEmbedder>,
    generator: Arc<ScriptedGenerator>,
) -> Assistant {
    Assistant::new(
        dbs,
        EmbeddingAdapter::new(embedder),
        generator,
        RetrievalConfig::default(),
    )
}
