//! Append-only conversation log (`chat_messages`).

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

use super::types::{Message, Sender};
use crate::db::{bytes_to_embedding, embedding_to_bytes};

/// Append a message and return its id. Messages are never updated afterwards.
pub fn append_message(
    conn: &Connection,
    session_id: &str,
    seller_id: i64,
    sender: Sender,
    text: &str,
    embedding: &[f32],
) -> Result<i64> {
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO chat_messages (session_id, seller_id, sender, message, embedding, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            session_id,
            seller_id,
            sender.as_str(),
            text,
            embedding_to_bytes(embedding),
            now
        ],
    )
    .context("failed to insert chat message")?;

    let id = conn.last_insert_rowid();
    tracing::debug!(message_id = id, seller_id, sender = %sender, "message appended");
    Ok(id)
}

/// The most recent session id used for this seller, if any.
pub fn latest_session(conn: &Connection, seller_id: i64) -> Result<Option<String>> {
    conn.query_row(
        "SELECT session_id FROM chat_messages WHERE seller_id = ?1 ORDER BY id DESC LIMIT 1",
        [seller_id],
        |row| row.get(0),
    )
    .optional()
    .context("failed to look up latest session")
}

/// Reuse the seller's latest session, or start a new time-sortable one.
pub fn resolve_session_id(conn: &Connection, seller_id: i64) -> String {
    match latest_session(conn, seller_id) {
        Ok(Some(id)) => id,
        Ok(None) => uuid::Uuid::now_v7().to_string(),
        Err(e) => {
            tracing::warn!(seller_id, error = %e, "session lookup failed, starting new session");
            uuid::Uuid::now_v7().to_string()
        }
    }
}

pub fn get_message(conn: &Connection, id: i64) -> Result<Option<Message>> {
    conn.query_row(
        "SELECT id, session_id, seller_id, sender, message, embedding, created_at
         FROM chat_messages WHERE id = ?1",
        [id],
        |row| {
            let sender: String = row.get(3)?;
            let blob: Vec<u8> = row.get(5)?;
            Ok(Message {
                id: row.get(0)?,
                session_id: row.get(1)?,
                seller_id: row.get(2)?,
                sender: sender.parse().unwrap_or(Sender::Requester),
                text: row.get(4)?,
                embedding: bytes_to_embedding(&blob),
                created_at: row.get(6)?,
            })
        },
    )
    .optional()
    .context("failed to fetch chat message")
}
