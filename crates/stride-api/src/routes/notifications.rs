use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use stride_core::notify::{self, NotificationQuery};
use stride_core::AppState;
use stride_models::notification::{NotificationPage, Preference, PreferenceUpdate};

use crate::error::ApiError;
use crate::middleware::AuthUser;

pub async fn list(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<NotificationQuery>,
) -> Result<Json<NotificationPage>, ApiError> {
    let page = notify::list(&state, &auth.identity, query).await?;
    Ok(Json(page))
}

fn default_read() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct MarkReadBody {
    pub ids: Vec<i64>,
    #[serde(default = "default_read")]
    pub read: bool,
}

pub async fn mark_read(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<MarkReadBody>,
) -> Result<Json<Value>, ApiError> {
    let updated = notify::mark_read(&state, &auth.identity, &body.ids, body.read).await?;
    Ok(Json(json!({ "updated": updated })))
}

#[derive(Debug, Deserialize)]
pub struct DeleteBody {
    pub ids: Vec<i64>,
}

pub async fn delete_many(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<DeleteBody>,
) -> Result<Json<Value>, ApiError> {
    let deleted = notify::delete(&state, &auth.identity, &body.ids).await?;
    Ok(Json(json!({ "deleted": deleted })))
}

pub async fn get_preferences(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Preference>, ApiError> {
    let preference = notify::get_preferences(&state, &auth.identity).await?;
    Ok(Json(preference))
}

pub async fn update_preferences(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(update): Json<PreferenceUpdate>,
) -> Result<Json<Preference>, ApiError> {
    let preference = notify::update_preferences(&state, &auth.identity, update).await?;
    Ok(Json(preference))
}
