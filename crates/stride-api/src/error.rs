use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not found")]
    NotFound,
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("internal server error")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, self.to_string()),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, self.to_string()),
            ApiError::Internal(err) => {
                tracing::error!("API internal error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };
        (status, Json(json!({ "error": message, "message": message }))).into_response()
    }
}

impl From<stride_core::CoreError> for ApiError {
    fn from(e: stride_core::CoreError) -> Self {
        match e {
            stride_core::CoreError::Unauthenticated => ApiError::Unauthorized,
            stride_core::CoreError::Forbidden => ApiError::Forbidden,
            stride_core::CoreError::NotFound => ApiError::NotFound,
            stride_core::CoreError::InvalidArgument(msg) => ApiError::BadRequest(msg),
            stride_core::CoreError::Conflict(msg) => ApiError::Conflict(msg),
            stride_core::CoreError::Integrity(msg) => {
                ApiError::Internal(anyhow::anyhow!("integrity violation: {msg}"))
            }
            stride_core::CoreError::Database(_) => {
                ApiError::Internal(anyhow::anyhow!("database error"))
            }
        }
    }
}
