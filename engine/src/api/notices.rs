use super::response::ApiResponse;
use super::state::ApiState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

const RECENT_LIMIT: usize = 20;

pub async fn recent(State(state): State<ApiState>) -> (StatusCode, Json<ApiResponse>) {
    match state.cache.recent(RECENT_LIMIT).await {
        Ok(notices) => (
            StatusCode::OK,
            Json(ApiResponse::ok(json!({ "notices": notices }))),
        ),
        Err(e) => {
            log::error!("Failed to read recent notices: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error("최근 공고를 불러오지 못했습니다.")),
            )
        }
    }
}
