pub mod error;
pub mod middleware;
pub mod routes;

use axum::{
    routing::{get, post, put},
    Json, Router,
};
use serde_json::{json, Value};
use stride_core::AppState;
use tower_http::cors::{Any, CorsLayer};

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "stride" }))
}

fn build_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// All HTTP routes. The gateway websocket route is mounted separately by the
/// server binary.
pub fn build_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/health", get(health))
        .route(
            "/api/v1/threads",
            get(routes::threads::list_threads).post(routes::threads::create_thread),
        )
        .route("/api/v1/threads/{thread_id}", get(routes::threads::get_thread))
        .route(
            "/api/v1/threads/{thread_id}/messages",
            post(routes::threads::send_message),
        )
        .route(
            "/api/v1/threads/{thread_id}/read",
            put(routes::threads::mark_read),
        )
        .route(
            "/api/v1/notifications",
            get(routes::notifications::list).delete(routes::notifications::delete_many),
        )
        .route(
            "/api/v1/notifications/read",
            post(routes::notifications::mark_read),
        )
        .route(
            "/api/v1/notifications/preferences",
            get(routes::notifications::get_preferences)
                .patch(routes::notifications::update_preferences),
        )
        .layer(build_cors_layer())
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
