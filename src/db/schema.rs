//! SQL DDL for both stores.
//!
//! The assistant store holds the conversation log (`chat_messages`), the
//! embedding-enriched mirrors (`customer_profiles`, `product_catalog`), the
//! append-only audit tables (`interaction_log`, `preference_signals`,
//! `recommendations`) and `schema_meta`. All DDL uses `IF NOT EXISTS` for
//! idempotent initialization.
//!
//! The transactional store schema is owned by the point-of-sale system. Its
//! DDL lives here only so local development databases and tests can be built
//! with the exact relations the query agent is told about.

use rusqlite::Connection;

/// All schema DDL statements for the assistant store.
const SCHEMA_SQL: &str = r#"
-- Conversation log (append-only)
CREATE TABLE IF NOT EXISTS chat_messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    seller_id INTEGER NOT NULL,
    sender TEXT NOT NULL CHECK(sender IN ('requester','assistant')),
    message TEXT NOT NULL,
    embedding BLOB NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_messages_seller ON chat_messages(seller_id);
CREATE INDEX IF NOT EXISTS idx_messages_session ON chat_messages(session_id);

-- Mirrored customers, embedding = mean of purchased product embeddings
CREATE TABLE IF NOT EXISTS customer_profiles (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    email TEXT,
    tax_id TEXT,
    phone TEXT,
    embedding BLOB,
    updated_at TEXT NOT NULL
);

-- Mirrored products
CREATE TABLE IF NOT EXISTS product_catalog (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT,
    price REAL,
    category_id INTEGER,
    embedding BLOB,
    updated_at TEXT NOT NULL
);

-- Audit trail of assistant responses
CREATE TABLE IF NOT EXISTS interaction_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    message_id INTEGER NOT NULL REFERENCES chat_messages(id),
    customer_id INTEGER,
    seller_id INTEGER,
    kind TEXT NOT NULL,
    detail TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS preference_signals (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    customer_id INTEGER NOT NULL,
    key TEXT NOT NULL,
    value TEXT,
    source TEXT NOT NULL DEFAULT 'inferred' CHECK(source IN ('inferred','system','operator')),
    weight REAL NOT NULL DEFAULT 1.0,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_preferences_customer ON preference_signals(customer_id);

CREATE TABLE IF NOT EXISTS recommendations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    customer_id INTEGER,
    seller_id INTEGER,
    product_id INTEGER,
    reason TEXT NOT NULL,
    score REAL NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_recommendations_customer ON recommendations(customer_id);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Relations of the point-of-sale transactional store, as exposed to the query agent.
const STORE_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS customer (
    id INTEGER PRIMARY KEY,
    name TEXT,
    taxId TEXT,
    email TEXT,
    streetNumber TEXT,
    phone TEXT,
    addressId INTEGER,
    complement TEXT
);

CREATE TABLE IF NOT EXISTS "order" (
    id INTEGER PRIMARY KEY,
    orderDate TEXT,
    customerId INTEGER REFERENCES customer(id),
    status TEXT
);

CREATE TABLE IF NOT EXISTS product (
    id INTEGER PRIMARY KEY,
    name TEXT,
    description TEXT,
    price REAL,
    categoryId INTEGER
);

CREATE TABLE IF NOT EXISTS order_line (
    id INTEGER PRIMARY KEY,
    orderId INTEGER REFERENCES "order"(id),
    productId INTEGER REFERENCES product(id),
    quantity INTEGER,
    salePrice REAL,
    discount REAL
);

CREATE INDEX IF NOT EXISTS idx_order_customer ON "order"(customerId);
CREATE INDEX IF NOT EXISTS idx_order_line_order ON order_line(orderId);
CREATE INDEX IF NOT EXISTS idx_order_line_product ON order_line(productId);
"#;

/// Initialize all assistant-store tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    // Set initial schema version if not already present
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}

/// Create the transactional store relations. Local development and tests only.
pub fn init_store_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(STORE_SCHEMA_SQL)
}
