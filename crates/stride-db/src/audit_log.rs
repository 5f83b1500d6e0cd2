use crate::{datetime_from_db_text, DbError, DbPool};
use chrono::{DateTime, Utc};
use sqlx::Row;

#[derive(Debug, Clone)]
pub struct AuditLogEntryRow {
    pub id: i64,
    pub user_id: i64,
    pub action: String,
    pub entity: Option<String>,
    pub entity_id: Option<i64>,
    pub metadata: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::any::AnyRow> for AuditLogEntryRow {
    fn from_row(row: &'r sqlx::any::AnyRow) -> Result<Self, sqlx::Error> {
        let created_at_raw: String = row.try_get("created_at")?;
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            action: row.try_get("action")?,
            entity: row.try_get("entity")?,
            entity_id: row.try_get("entity_id")?,
            metadata: row.try_get("metadata")?,
            created_at: datetime_from_db_text(&created_at_raw)?,
        })
    }
}

pub async fn record(
    pool: &DbPool,
    id: i64,
    user_id: i64,
    action: &str,
    entity: Option<&str>,
    entity_id: Option<i64>,
    metadata: Option<&str>,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO audit_log_entries (id, user_id, action, entity, entity_id, metadata)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(id)
    .bind(user_id)
    .bind(action)
    .bind(entity)
    .bind(entity_id)
    .bind(metadata)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn list_for_user(
    pool: &DbPool,
    user_id: i64,
    limit: i64,
) -> Result<Vec<AuditLogEntryRow>, DbError> {
    let rows = sqlx::query_as::<_, AuditLogEntryRow>(
        "SELECT id, user_id, action, entity, entity_id, metadata, created_at
         FROM audit_log_entries WHERE user_id = $1
         ORDER BY id DESC LIMIT $2",
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
