//! SQLite access for the two stores the assistant talks to.
//!
//! The assistant store is created and migrated on open. The transactional
//! store belongs to the point-of-sale system and is never created here: a
//! missing file is an error, and the query agent only ever sees it through a
//! read-only connection.

pub mod migrations;
pub mod schema;

use anyhow::{Context, Result};
use rusqlite::{Connection, OpenFlags};
use sqlite_vec::sqlite3_vec_init;
use std::path::{Path, PathBuf};
use std::sync::Once;
use std::time::Duration;

use crate::config::AssistantConfig;

static SQLITE_VEC_INIT: Once = Once::new();

const BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Register the sqlite-vec extension globally. Safe to call multiple times.
pub fn load_sqlite_vec() {
    SQLITE_VEC_INIT.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite3_vec_init as *const (),
        )));
    });
}

/// Paths of both stores. Connections are opened per request and dropped at the end of it.
#[derive(Debug, Clone)]
pub struct Databases {
    pub assistant: PathBuf,
    pub store: PathBuf,
}

impl Databases {
    pub fn new(assistant: impl Into<PathBuf>, store: impl Into<PathBuf>) -> Self {
        Self {
            assistant: assistant.into(),
            store: store.into(),
        }
    }

    pub fn from_config(config: &AssistantConfig) -> Self {
        Self::new(
            config.resolved_assistant_db_path(),
            config.resolved_store_db_path(),
        )
    }

    pub fn open_assistant(&self) -> Result<Connection> {
        open_database(&self.assistant)
    }

    pub fn open_store(&self) -> Result<Connection> {
        open_store(&self.store, false)
    }

    /// Read-only connection used to run synthesized queries.
    pub fn open_store_read_only(&self) -> Result<Connection> {
        open_store(&self.store, true)
    }
}

/// Open (or create) the assistant database at the given path, with all extensions
/// loaded and schema initialized.
pub fn open_database(path: impl AsRef<Path>) -> Result<Connection> {
    let path = path.as_ref();

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    load_sqlite_vec();

    let mut conn = Connection::open(path)
        .with_context(|| format!("failed to open database at {}", path.display()))?;

    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    schema::init_schema(&conn).context("failed to initialize schema")?;
    migrations::run_migrations(&mut conn).context("failed to run migrations")?;

    tracing::debug!(path = %path.display(), "assistant database opened");
    Ok(conn)
}

/// Open the existing transactional store. Never creates the file.
pub fn open_store(path: impl AsRef<Path>, read_only: bool) -> Result<Connection> {
    let path = path.as_ref();
    let mode = if read_only {
        OpenFlags::SQLITE_OPEN_READ_ONLY
    } else {
        OpenFlags::SQLITE_OPEN_READ_WRITE
    };

    let conn = Connection::open_with_flags(
        path,
        mode | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .with_context(|| format!("failed to open store at {}", path.display()))?;

    conn.busy_timeout(BUSY_TIMEOUT)?;
    if read_only {
        conn.pragma_update(None, "query_only", "ON")?;
    }

    tracing::debug!(path = %path.display(), read_only, "store opened");
    Ok(conn)
}

/// Open an in-memory assistant database for testing.
#[cfg(test)]
pub fn open_memory_database() -> Result<Connection> {
    load_sqlite_vec();
    let mut conn = Connection::open_in_memory().context("failed to open in-memory database")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    schema::init_schema(&conn).context("failed to initialize schema")?;
    migrations::run_migrations(&mut conn).context("failed to run migrations")?;
    Ok(conn)
}

/// Serialize an embedding as a native-endian `f32` BLOB, the layout sqlite-vec reads.
pub fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|x| x.to_ne_bytes()).collect()
}

/// Inverse of [`embedding_to_bytes`]. Trailing bytes that do not form a whole `f32` are dropped.
pub fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Diagnostic snapshot of the assistant store.
#[derive(Debug)]
pub struct HealthReport {
    pub schema_version: u32,
    pub sqlite_vec_version: String,
    pub embedding_model: Option<String>,
    pub embedding_dimensions: Option<usize>,
    pub message_count: i64,
    pub customer_count: i64,
    pub product_count: i64,
    pub unembedded_product_count: i64,
    pub interaction_count: i64,
    pub recommendation_count: i64,
    pub integrity_ok: bool,
    pub integrity_details: String,
}

fn count(conn: &Connection, sql: &str) -> Result<i64> {
    conn.query_row(sql, [], |r| r.get(0))
        .with_context(|| format!("count query failed: {sql}"))
}

/// Collect schema version, extension version, row counts and an integrity check.
pub fn check_database_health(conn: &Connection) -> Result<HealthReport> {
    let schema_version = migrations::get_schema_version(conn)?;
    let sqlite_vec_version: String = conn.query_row("SELECT vec_version()", [], |r| r.get(0))?;
    let embedding_model = migrations::get_embedding_model(conn)?;
    let embedding_dimensions = migrations::get_embedding_dimensions(conn)?;

    let integrity: String = conn.query_row("PRAGMA integrity_check", [], |r| r.get(0))?;
    let integrity_ok = integrity == "ok";

    Ok(HealthReport {
        schema_version,
        sqlite_vec_version,
        embedding_model,
        embedding_dimensions,
        message_count: count(conn, "SELECT COUNT(*) FROM chat_messages")?,
        customer_count: count(conn, "SELECT COUNT(*) FROM customer_profiles")?,
        product_count: count(conn, "SELECT COUNT(*) FROM product_catalog")?,
        unembedded_product_count: count(
            conn,
            // Failed embeddings are stored as zeros with no source.
            "SELECT COUNT(*) FROM product_catalog WHERE embedding IS NULL OR embedding_source IS NULL",
        )?,
        interaction_count: count(conn, "SELECT COUNT(*) FROM interaction_log")?,
        recommendation_count: count(conn, "SELECT COUNT(*) FROM recommendations")?,
        integrity_ok,
        integrity_details: integrity,
    })
}
