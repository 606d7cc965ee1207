use super::response::ApiResponse;
use super::state::ApiState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

pub async fn overview(State(state): State<ApiState>) -> (StatusCode, Json<ApiResponse>) {
    let webhooks = match state.store.stats().await {
        Ok(stats) => serde_json::to_value(stats).unwrap_or_default(),
        Err(e) => {
            log::error!("Failed to read webhook stats: {e}");
            json!(null)
        }
    };

    let data = json!({
        "webhooks": webhooks,
        "cache": state.cache.meta().await,
        "batchProcessing": state.executor.status(),
    });
    (StatusCode::OK, Json(ApiResponse::ok(data)))
}

pub async fn batch_status(State(state): State<ApiState>) -> (StatusCode, Json<ApiResponse>) {
    (
        StatusCode::OK,
        Json(ApiResponse::ok(json!({ "batch": state.executor.status() }))),
    )
}

pub async fn metrics(State(state): State<ApiState>) -> (StatusCode, String) {
    match &state.prometheus_handle {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, String::new()),
    }
}
