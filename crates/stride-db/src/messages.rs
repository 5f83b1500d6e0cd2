use crate::{datetime_from_db_text, datetime_to_db_text, DbError, DbPool};
use chrono::{DateTime, Utc};
use sqlx::Row;

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: i64,
    pub thread_id: i64,
    pub sender_id: i64,
    pub content: String,
    /// JSON list of `{url, name}` objects, when present.
    pub attachments: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::any::AnyRow> for MessageRow {
    fn from_row(row: &'r sqlx::any::AnyRow) -> Result<Self, sqlx::Error> {
        let created_at_raw: String = row.try_get("created_at")?;
        Ok(Self {
            id: row.try_get("id")?,
            thread_id: row.try_get("thread_id")?,
            sender_id: row.try_get("sender_id")?,
            content: row.try_get("content")?,
            attachments: row.try_get("attachments")?,
            created_at: datetime_from_db_text(&created_at_raw)?,
        })
    }
}

/// The message-send write triple: message insert, thread activity stamp,
/// sender read cursor, and one unread receipt per recipient — one
/// transaction, so a reader can never observe a message without its
/// receipts.
pub async fn create_in_thread(
    pool: &DbPool,
    id: i64,
    thread_id: i64,
    sender_id: i64,
    content: &str,
    attachments: Option<&str>,
    recipient_ids: &[i64],
) -> Result<MessageRow, DbError> {
    let now = Utc::now();
    let now_text = datetime_to_db_text(now);

    let mut tx = pool.begin().await?;

    let row = sqlx::query_as::<_, MessageRow>(
        "INSERT INTO messages (id, thread_id, sender_id, content, attachments, created_at)
         VALUES ($1, $2, $3, $4, $5, $6)
         RETURNING id, thread_id, sender_id, content, attachments, created_at",
    )
    .bind(id)
    .bind(thread_id)
    .bind(sender_id)
    .bind(content)
    .bind(attachments)
    .bind(&now_text)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("UPDATE threads SET last_message_at = $2, updated_at = $2 WHERE id = $1")
        .bind(thread_id)
        .bind(&now_text)
        .execute(&mut *tx)
        .await?;

    // Sending implies having read the thread up to this instant.
    sqlx::query(
        "UPDATE thread_participants SET last_read_at = $3
         WHERE thread_id = $1 AND user_id = $2",
    )
    .bind(thread_id)
    .bind(sender_id)
    .bind(&now_text)
    .execute(&mut *tx)
    .await?;

    for user_id in recipient_ids {
        sqlx::query("INSERT INTO message_receipts (message_id, user_id) VALUES ($1, $2)")
            .bind(id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(row)
}

pub async fn get_message(pool: &DbPool, id: i64) -> Result<Option<MessageRow>, DbError> {
    let row = sqlx::query_as::<_, MessageRow>(
        "SELECT id, thread_id, sender_id, content, attachments, created_at
         FROM messages WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Most recent messages first.
pub async fn list_recent(
    pool: &DbPool,
    thread_id: i64,
    limit: i64,
) -> Result<Vec<MessageRow>, DbError> {
    let rows = sqlx::query_as::<_, MessageRow>(
        "SELECT id, thread_id, sender_id, content, attachments, created_at
         FROM messages WHERE thread_id = $1
         ORDER BY created_at DESC, id DESC LIMIT $2",
    )
    .bind(thread_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn latest_for_thread(
    pool: &DbPool,
    thread_id: i64,
) -> Result<Option<MessageRow>, DbError> {
    let row = sqlx::query_as::<_, MessageRow>(
        "SELECT id, thread_id, sender_id, content, attachments, created_at
         FROM messages WHERE thread_id = $1
         ORDER BY created_at DESC, id DESC LIMIT 1",
    )
    .bind(thread_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}
