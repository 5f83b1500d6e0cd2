use crate::{datetime_to_db_text, opt_datetime_from_db_text, DbError, DbPool};
use chrono::{DateTime, Utc};
use sqlx::Row;

#[derive(Debug, Clone)]
pub struct ReceiptRow {
    pub message_id: i64,
    pub user_id: i64,
    pub read_at: Option<DateTime<Utc>>,
}

impl<'r> sqlx::FromRow<'r, sqlx::any::AnyRow> for ReceiptRow {
    fn from_row(row: &'r sqlx::any::AnyRow) -> Result<Self, sqlx::Error> {
        let read_at_raw: Option<String> = row.try_get("read_at")?;
        Ok(Self {
            message_id: row.try_get("message_id")?,
            user_id: row.try_get("user_id")?,
            read_at: opt_datetime_from_db_text(read_at_raw)?,
        })
    }
}

pub async fn get_receipt(
    pool: &DbPool,
    message_id: i64,
    user_id: i64,
) -> Result<Option<ReceiptRow>, DbError> {
    let row = sqlx::query_as::<_, ReceiptRow>(
        "SELECT message_id, user_id, read_at
         FROM message_receipts WHERE message_id = $1 AND user_id = $2",
    )
    .bind(message_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn mark_read(
    pool: &DbPool,
    message_id: i64,
    user_id: i64,
    at: DateTime<Utc>,
) -> Result<u64, DbError> {
    let result = sqlx::query(
        "UPDATE message_receipts SET read_at = $3
         WHERE message_id = $1 AND user_id = $2",
    )
    .bind(message_id)
    .bind(user_id)
    .bind(datetime_to_db_text(at))
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn unread_count_for_user(pool: &DbPool, user_id: i64) -> Result<i64, DbError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM message_receipts WHERE user_id = $1 AND read_at IS NULL",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;
    Ok(count)
}
