use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use stride_core::messaging::{self, CreateThread, SendMessage, ThreadQuery};
use stride_core::AppState;
use stride_models::message::Message;
use stride_models::thread::{Thread, ThreadDetail, ThreadPage};

use crate::error::ApiError;
use crate::middleware::AuthUser;

pub async fn list_threads(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<ThreadQuery>,
) -> Result<Json<ThreadPage>, ApiError> {
    let page = messaging::list_threads(&state, &auth.identity, query).await?;
    Ok(Json(page))
}

pub async fn create_thread(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(input): Json<CreateThread>,
) -> Result<(StatusCode, Json<Thread>), ApiError> {
    let thread = messaging::create_thread(&state, &auth.identity, input).await?;
    Ok((StatusCode::CREATED, Json(thread)))
}

pub async fn get_thread(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(thread_id): Path<i64>,
) -> Result<Json<ThreadDetail>, ApiError> {
    let detail = messaging::get_thread(&state, &auth.identity, thread_id).await?;
    Ok(Json(detail))
}

pub async fn send_message(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(thread_id): Path<i64>,
    Json(input): Json<SendMessage>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let message = messaging::send_message(&state, &auth.identity, thread_id, input).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

#[derive(Debug, Default, Deserialize)]
pub struct MarkReadBody {
    pub last_message_id: Option<i64>,
}

pub async fn mark_read(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(thread_id): Path<i64>,
    Json(body): Json<MarkReadBody>,
) -> Result<Json<Value>, ApiError> {
    messaging::mark_thread_read(&state, &auth.identity, thread_id, body.last_message_id).await?;
    Ok(Json(json!({ "status": "ok" })))
}
