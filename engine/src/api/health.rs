use super::state::ApiState;
use axum::extract::State;
use axum::Json;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;

#[derive(Serialize)]
pub struct ComponentStatus {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ComponentStatus {
    fn up() -> Self {
        Self {
            status: "up".to_string(),
            error: None,
        }
    }

    fn down(e: impl ToString) -> Self {
        Self {
            status: "down".to_string(),
            error: Some(e.to_string()),
        }
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    timestamp: String,
    cache: ComponentStatus,
}

pub async fn health_check(State(state): State<ApiState>) -> Json<HealthResponse> {
    let cache = match state.state.cache_service.ping().await {
        Ok(()) => ComponentStatus::up(),
        Err(e) => ComponentStatus::down(e),
    };

    Json(HealthResponse {
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        cache,
    })
}
