use crate::{datetime_from_db_text, placeholders, DbError, DbPool};
use chrono::{DateTime, Utc};
use sqlx::Row;

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: i64,
    pub email: String,
    pub name: String,
    /// JSON list of role names.
    pub roles: String,
    pub created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::any::AnyRow> for UserRow {
    fn from_row(row: &'r sqlx::any::AnyRow) -> Result<Self, sqlx::Error> {
        let created_at_raw: String = row.try_get("created_at")?;
        Ok(Self {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            name: row.try_get("name")?,
            roles: row.try_get("roles")?,
            created_at: datetime_from_db_text(&created_at_raw)?,
        })
    }
}

pub async fn create_user(
    pool: &DbPool,
    id: i64,
    email: &str,
    name: &str,
    roles: &[String],
) -> Result<UserRow, DbError> {
    let roles_json = serde_json::to_string(roles)
        .map_err(|e| DbError::Sqlx(sqlx::Error::Protocol(e.to_string())))?;
    let row = sqlx::query_as::<_, UserRow>(
        "INSERT INTO users (id, email, name, roles)
         VALUES ($1, $2, $3, $4)
         RETURNING id, email, name, roles, created_at",
    )
    .bind(id)
    .bind(email)
    .bind(name)
    .bind(roles_json)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn get_user_by_id(pool: &DbPool, id: i64) -> Result<Option<UserRow>, DbError> {
    let row = sqlx::query_as::<_, UserRow>(
        "SELECT id, email, name, roles, created_at FROM users WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Resolve a batch of ids in one round trip. Missing ids are simply absent
/// from the result; the caller decides whether that is an error.
pub async fn get_users_by_ids(pool: &DbPool, ids: &[i64]) -> Result<Vec<UserRow>, DbError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT id, email, name, roles, created_at FROM users WHERE id IN ({})",
        placeholders(1, ids.len())
    );
    let mut query = sqlx::query_as::<_, UserRow>(&sql);
    for id in ids {
        query = query.bind(id);
    }
    let rows = query.fetch_all(pool).await?;
    Ok(rows)
}
