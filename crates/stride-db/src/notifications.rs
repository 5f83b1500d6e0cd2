use crate::{
    datetime_from_db_text, datetime_to_db_text, opt_datetime_from_db_text, placeholders, DbError,
    DbPool,
};
use chrono::{DateTime, Utc};
use sqlx::Row;

#[derive(Debug, Clone)]
pub struct NotificationRow {
    pub id: i64,
    pub user_id: i64,
    pub category: String,
    pub channel: String,
    pub priority: String,
    pub title: String,
    pub message: String,
    pub data: Option<String>,
    pub read_at: Option<DateTime<Utc>>,
    pub delivered_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::any::AnyRow> for NotificationRow {
    fn from_row(row: &'r sqlx::any::AnyRow) -> Result<Self, sqlx::Error> {
        let read_at_raw: Option<String> = row.try_get("read_at")?;
        let delivered_at_raw: String = row.try_get("delivered_at")?;
        let created_at_raw: String = row.try_get("created_at")?;
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            category: row.try_get("category")?,
            channel: row.try_get("channel")?,
            priority: row.try_get("priority")?,
            title: row.try_get("title")?,
            message: row.try_get("message")?,
            data: row.try_get("data")?,
            read_at: opt_datetime_from_db_text(read_at_raw)?,
            delivered_at: datetime_from_db_text(&delivered_at_raw)?,
            created_at: datetime_from_db_text(&created_at_raw)?,
        })
    }
}

const COLUMNS: &str =
    "id, user_id, category, channel, priority, title, message, data, read_at, delivered_at, created_at";

#[allow(clippy::too_many_arguments)]
pub async fn create(
    pool: &DbPool,
    id: i64,
    user_id: i64,
    category: &str,
    channel: &str,
    priority: &str,
    title: &str,
    message: &str,
    data: Option<&str>,
) -> Result<NotificationRow, DbError> {
    let now_text = datetime_to_db_text(Utc::now());
    let sql = format!(
        "INSERT INTO notifications (id, user_id, category, channel, priority, title, message, data, delivered_at, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
         RETURNING {COLUMNS}"
    );
    let row = sqlx::query_as::<_, NotificationRow>(&sql)
        .bind(id)
        .bind(user_id)
        .bind(category)
        .bind(channel)
        .bind(priority)
        .bind(title)
        .bind(message)
        .bind(data)
        .bind(&now_text)
        .fetch_one(pool)
        .await?;
    Ok(row)
}

pub async fn list(
    pool: &DbPool,
    user_id: i64,
    category: Option<&str>,
    unread_only: bool,
    search: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<Vec<NotificationRow>, DbError> {
    let unread_clause = if unread_only { " AND read_at IS NULL" } else { "" };
    let rows = match (category, search) {
        (None, None) => {
            let sql = format!(
                "SELECT {COLUMNS} FROM notifications
                 WHERE user_id = $1{unread_clause}
                 ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3"
            );
            sqlx::query_as::<_, NotificationRow>(&sql)
                .bind(user_id)
                .bind(limit)
                .bind(offset)
                .fetch_all(pool)
                .await?
        }
        (Some(cat), None) => {
            let sql = format!(
                "SELECT {COLUMNS} FROM notifications
                 WHERE user_id = $1 AND category = $2{unread_clause}
                 ORDER BY created_at DESC, id DESC LIMIT $3 OFFSET $4"
            );
            sqlx::query_as::<_, NotificationRow>(&sql)
                .bind(user_id)
                .bind(cat)
                .bind(limit)
                .bind(offset)
                .fetch_all(pool)
                .await?
        }
        (None, Some(term)) => {
            let pattern = format!("%{}%", term);
            let sql = format!(
                "SELECT {COLUMNS} FROM notifications
                 WHERE user_id = $1 AND (LOWER(title) LIKE LOWER($2) OR LOWER(message) LIKE LOWER($2)){unread_clause}
                 ORDER BY created_at DESC, id DESC LIMIT $3 OFFSET $4"
            );
            sqlx::query_as::<_, NotificationRow>(&sql)
                .bind(user_id)
                .bind(pattern)
                .bind(limit)
                .bind(offset)
                .fetch_all(pool)
                .await?
        }
        (Some(cat), Some(term)) => {
            let pattern = format!("%{}%", term);
            let sql = format!(
                "SELECT {COLUMNS} FROM notifications
                 WHERE user_id = $1 AND category = $2 AND (LOWER(title) LIKE LOWER($3) OR LOWER(message) LIKE LOWER($3)){unread_clause}
                 ORDER BY created_at DESC, id DESC LIMIT $4 OFFSET $5"
            );
            sqlx::query_as::<_, NotificationRow>(&sql)
                .bind(user_id)
                .bind(cat)
                .bind(pattern)
                .bind(limit)
                .bind(offset)
                .fetch_all(pool)
                .await?
        }
    };
    Ok(rows)
}

pub async fn count(
    pool: &DbPool,
    user_id: i64,
    category: Option<&str>,
    unread_only: bool,
    search: Option<&str>,
) -> Result<i64, DbError> {
    let unread_clause = if unread_only { " AND read_at IS NULL" } else { "" };
    let count: i64 = match (category, search) {
        (None, None) => {
            let sql =
                format!("SELECT COUNT(*) FROM notifications WHERE user_id = $1{unread_clause}");
            sqlx::query_scalar(&sql).bind(user_id).fetch_one(pool).await?
        }
        (Some(cat), None) => {
            let sql = format!(
                "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND category = $2{unread_clause}"
            );
            sqlx::query_scalar(&sql)
                .bind(user_id)
                .bind(cat)
                .fetch_one(pool)
                .await?
        }
        (None, Some(term)) => {
            let pattern = format!("%{}%", term);
            let sql = format!(
                "SELECT COUNT(*) FROM notifications
                 WHERE user_id = $1 AND (LOWER(title) LIKE LOWER($2) OR LOWER(message) LIKE LOWER($2)){unread_clause}"
            );
            sqlx::query_scalar(&sql)
                .bind(user_id)
                .bind(pattern)
                .fetch_one(pool)
                .await?
        }
        (Some(cat), Some(term)) => {
            let pattern = format!("%{}%", term);
            let sql = format!(
                "SELECT COUNT(*) FROM notifications
                 WHERE user_id = $1 AND category = $2 AND (LOWER(title) LIKE LOWER($3) OR LOWER(message) LIKE LOWER($3)){unread_clause}"
            );
            sqlx::query_scalar(&sql)
                .bind(user_id)
                .bind(cat)
                .bind(pattern)
                .fetch_one(pool)
                .await?
        }
    };
    Ok(count)
}

pub async fn unread_count(pool: &DbPool, user_id: i64) -> Result<i64, DbError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND read_at IS NULL",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Sets or clears `read_at` on the given ids, touching only rows owned by
/// `user_id`. Returns the number of rows actually changed.
pub async fn mark_read(
    pool: &DbPool,
    user_id: i64,
    ids: &[i64],
    read: bool,
) -> Result<u64, DbError> {
    if ids.is_empty() {
        return Ok(0);
    }
    let read_at = if read {
        Some(datetime_to_db_text(Utc::now()))
    } else {
        None
    };
    let sql = format!(
        "UPDATE notifications SET read_at = $1 WHERE user_id = $2 AND id IN ({})",
        placeholders(3, ids.len())
    );
    let mut query = sqlx::query(&sql).bind(read_at).bind(user_id);
    for id in ids {
        query = query.bind(id);
    }
    let result = query.execute(pool).await?;
    Ok(result.rows_affected())
}

pub async fn delete_many(pool: &DbPool, user_id: i64, ids: &[i64]) -> Result<u64, DbError> {
    if ids.is_empty() {
        return Ok(0);
    }
    let sql = format!(
        "DELETE FROM notifications WHERE user_id = $1 AND id IN ({})",
        placeholders(2, ids.len())
    );
    let mut query = sqlx::query(&sql).bind(user_id);
    for id in ids {
        query = query.bind(id);
    }
    let result = query.execute(pool).await?;
    Ok(result.rows_affected())
}
