use crate::{bool_from_any_row, DbError, DbPool};
use sqlx::Row;

#[derive(Debug, Clone)]
pub struct PreferenceRow {
    pub user_id: i64,
    pub email_enabled: bool,
    pub sms_enabled: bool,
    pub push_enabled: bool,
    pub quiet_hours_start: Option<String>,
    pub quiet_hours_end: Option<String>,
    /// JSON list of category names; empty list means "all".
    pub categories: String,
}

impl<'r> sqlx::FromRow<'r, sqlx::any::AnyRow> for PreferenceRow {
    fn from_row(row: &'r sqlx::any::AnyRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            user_id: row.try_get("user_id")?,
            email_enabled: bool_from_any_row(row, "email_enabled")?,
            sms_enabled: bool_from_any_row(row, "sms_enabled")?,
            push_enabled: bool_from_any_row(row, "push_enabled")?,
            quiet_hours_start: row.try_get("quiet_hours_start")?,
            quiet_hours_end: row.try_get("quiet_hours_end")?,
            categories: row.try_get("categories")?,
        })
    }
}

const COLUMNS: &str =
    "user_id, email_enabled, sms_enabled, push_enabled, quiet_hours_start, quiet_hours_end, categories";

pub async fn get(pool: &DbPool, user_id: i64) -> Result<Option<PreferenceRow>, DbError> {
    let sql = format!("SELECT {COLUMNS} FROM notification_preferences WHERE user_id = $1");
    let row = sqlx::query_as::<_, PreferenceRow>(&sql)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Lazily materializes the default preference row (email/push on, all
/// categories) the first time a user's preferences are needed.
pub async fn get_or_create_default(pool: &DbPool, user_id: i64) -> Result<PreferenceRow, DbError> {
    sqlx::query(
        "INSERT INTO notification_preferences (user_id) VALUES ($1)
         ON CONFLICT (user_id) DO NOTHING",
    )
    .bind(user_id)
    .execute(pool)
    .await?;

    get(pool, user_id).await?.ok_or(DbError::NotFound)
}

#[allow(clippy::too_many_arguments)]
pub async fn upsert(
    pool: &DbPool,
    user_id: i64,
    email_enabled: bool,
    sms_enabled: bool,
    push_enabled: bool,
    quiet_hours_start: Option<&str>,
    quiet_hours_end: Option<&str>,
    categories_json: &str,
) -> Result<PreferenceRow, DbError> {
    let sql = format!(
        "INSERT INTO notification_preferences
             (user_id, email_enabled, sms_enabled, push_enabled, quiet_hours_start, quiet_hours_end, categories)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         ON CONFLICT (user_id) DO UPDATE SET
             email_enabled = $2, sms_enabled = $3, push_enabled = $4,
             quiet_hours_start = $5, quiet_hours_end = $6, categories = $7
         RETURNING {COLUMNS}"
    );
    let row = sqlx::query_as::<_, PreferenceRow>(&sql)
        .bind(user_id)
        .bind(email_enabled)
        .bind(sms_enabled)
        .bind(push_enabled)
        .bind(quiet_hours_start)
        .bind(quiet_hours_end)
        .bind(categories_json)
        .fetch_one(pool)
        .await?;
    Ok(row)
}
