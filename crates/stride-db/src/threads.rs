use crate::{datetime_from_db_text, datetime_to_db_text, opt_datetime_from_db_text, DbError, DbPool};
use chrono::{DateTime, Utc};
use sqlx::Row;

#[derive(Debug, Clone)]
pub struct ThreadRow {
    pub id: i64,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_message_at: Option<DateTime<Utc>>,
}

impl<'r> sqlx::FromRow<'r, sqlx::any::AnyRow> for ThreadRow {
    fn from_row(row: &'r sqlx::any::AnyRow) -> Result<Self, sqlx::Error> {
        let created_at_raw: String = row.try_get("created_at")?;
        let updated_at_raw: String = row.try_get("updated_at")?;
        let last_message_at_raw: Option<String> = row.try_get("last_message_at")?;
        Ok(Self {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            created_at: datetime_from_db_text(&created_at_raw)?,
            updated_at: datetime_from_db_text(&updated_at_raw)?,
            last_message_at: opt_datetime_from_db_text(last_message_at_raw)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ParticipantRow {
    pub thread_id: i64,
    pub user_id: i64,
    pub role: String,
    pub last_read_at: Option<DateTime<Utc>>,
}

impl<'r> sqlx::FromRow<'r, sqlx::any::AnyRow> for ParticipantRow {
    fn from_row(row: &'r sqlx::any::AnyRow) -> Result<Self, sqlx::Error> {
        let last_read_at_raw: Option<String> = row.try_get("last_read_at")?;
        Ok(Self {
            thread_id: row.try_get("thread_id")?,
            user_id: row.try_get("user_id")?,
            role: row.try_get("role")?,
            last_read_at: opt_datetime_from_db_text(last_read_at_raw)?,
        })
    }
}

/// First message created together with its thread.
#[derive(Debug, Clone)]
pub struct SeedMessage {
    pub id: i64,
    pub content: String,
    pub attachments: Option<String>,
}

/// Creates a thread, its participant rows and (optionally) a seed message
/// with receipts, all in one transaction. The creator gets role `owner` and
/// an immediately stamped `last_read_at`; everyone else starts unread.
pub async fn create_thread(
    pool: &DbPool,
    id: i64,
    title: Option<&str>,
    creator_id: i64,
    other_participant_ids: &[i64],
    seed_message: Option<SeedMessage>,
) -> Result<ThreadRow, DbError> {
    let now = Utc::now();
    let now_text = datetime_to_db_text(now);

    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO threads (id, title, created_at, updated_at)
         VALUES ($1, $2, $3, $3)",
    )
    .bind(id)
    .bind(title)
    .bind(&now_text)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO thread_participants (thread_id, user_id, role, last_read_at)
         VALUES ($1, $2, 'owner', $3)",
    )
    .bind(id)
    .bind(creator_id)
    .bind(&now_text)
    .execute(&mut *tx)
    .await?;

    for user_id in other_participant_ids {
        sqlx::query(
            "INSERT INTO thread_participants (thread_id, user_id, role)
             VALUES ($1, $2, 'member')",
        )
        .bind(id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    }

    if let Some(seed) = seed_message {
        sqlx::query(
            "INSERT INTO messages (id, thread_id, sender_id, content, attachments, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(seed.id)
        .bind(id)
        .bind(creator_id)
        .bind(&seed.content)
        .bind(&seed.attachments)
        .bind(&now_text)
        .execute(&mut *tx)
        .await?;

        for user_id in other_participant_ids {
            sqlx::query("INSERT INTO message_receipts (message_id, user_id) VALUES ($1, $2)")
                .bind(seed.id)
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query("UPDATE threads SET last_message_at = $2 WHERE id = $1")
            .bind(id)
            .bind(&now_text)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    get_thread(pool, id).await?.ok_or(DbError::NotFound)
}

pub async fn get_thread(pool: &DbPool, id: i64) -> Result<Option<ThreadRow>, DbError> {
    let row = sqlx::query_as::<_, ThreadRow>(
        "SELECT id, title, created_at, updated_at, last_message_at
         FROM threads WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn get_participants(
    pool: &DbPool,
    thread_id: i64,
) -> Result<Vec<ParticipantRow>, DbError> {
    let rows = sqlx::query_as::<_, ParticipantRow>(
        "SELECT thread_id, user_id, role, last_read_at
         FROM thread_participants WHERE thread_id = $1
         ORDER BY user_id ASC",
    )
    .bind(thread_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn get_participant(
    pool: &DbPool,
    thread_id: i64,
    user_id: i64,
) -> Result<Option<ParticipantRow>, DbError> {
    let row = sqlx::query_as::<_, ParticipantRow>(
        "SELECT thread_id, user_id, role, last_read_at
         FROM thread_participants WHERE thread_id = $1 AND user_id = $2",
    )
    .bind(thread_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn is_participant(
    pool: &DbPool,
    thread_id: i64,
    user_id: i64,
) -> Result<bool, DbError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM thread_participants WHERE thread_id = $1 AND user_id = $2",
    )
    .bind(thread_id)
    .bind(user_id)
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

pub async fn set_last_read(
    pool: &DbPool,
    thread_id: i64,
    user_id: i64,
    at: DateTime<Utc>,
) -> Result<u64, DbError> {
    let result = sqlx::query(
        "UPDATE thread_participants SET last_read_at = $3
         WHERE thread_id = $1 AND user_id = $2",
    )
    .bind(thread_id)
    .bind(user_id)
    .bind(datetime_to_db_text(at))
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Threads the user participates in, newest activity first. Threads that
/// never got a message sort after those that did.
pub async fn list_for_user(
    pool: &DbPool,
    user_id: i64,
    search: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<Vec<ThreadRow>, DbError> {
    let rows = match search {
        Some(term) => {
            let pattern = format!("%{}%", term);
            sqlx::query_as::<_, ThreadRow>(
                "SELECT t.id, t.title, t.created_at, t.updated_at, t.last_message_at
                 FROM threads t
                 JOIN thread_participants p ON p.thread_id = t.id
                 WHERE p.user_id = $1 AND LOWER(t.title) LIKE LOWER($2)
                 ORDER BY CASE WHEN t.last_message_at IS NULL THEN 1 ELSE 0 END,
                          t.last_message_at DESC, t.id DESC
                 LIMIT $3 OFFSET $4",
            )
            .bind(user_id)
            .bind(pattern)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, ThreadRow>(
                "SELECT t.id, t.title, t.created_at, t.updated_at, t.last_message_at
                 FROM threads t
                 JOIN thread_participants p ON p.thread_id = t.id
                 WHERE p.user_id = $1
                 ORDER BY CASE WHEN t.last_message_at IS NULL THEN 1 ELSE 0 END,
                          t.last_message_at DESC, t.id DESC
                 LIMIT $2 OFFSET $3",
            )
            .bind(user_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await?
        }
    };
    Ok(rows)
}

pub async fn count_for_user(
    pool: &DbPool,
    user_id: i64,
    search: Option<&str>,
) -> Result<i64, DbError> {
    let count: i64 = match search {
        Some(term) => {
            let pattern = format!("%{}%", term);
            sqlx::query_scalar(
                "SELECT COUNT(*) FROM threads t
                 JOIN thread_participants p ON p.thread_id = t.id
                 WHERE p.user_id = $1 AND LOWER(t.title) LIKE LOWER($2)",
            )
            .bind(user_id)
            .bind(pattern)
            .fetch_one(pool)
            .await?
        }
        None => {
            sqlx::query_scalar(
                "SELECT COUNT(*) FROM threads t
                 JOIN thread_participants p ON p.thread_id = t.id
                 WHERE p.user_id = $1",
            )
            .bind(user_id)
            .fetch_one(pool)
            .await?
        }
    };
    Ok(count)
}
