use super::response::ApiResponse;
use super::state::ApiState;
use crate::cleanup::health_grade;
use crate::webhook::service::RegistrationError;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub url: String,
    pub recaptcha_token: Option<String>,
}

pub async fn register(
    State(state): State<ApiState>,
    Json(body): Json<RegisterRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    match state
        .registration
        .register(&body.url, body.recaptcha_token.as_deref())
        .await
    {
        Ok((row, outcome)) => {
            let response = ApiResponse::ok_with_message(
                "웹훅이 등록되었습니다.",
                json!({ "webhook": row }),
            )
            .with_test_result(json!({ "success": outcome.success }));
            (StatusCode::CREATED, Json(response))
        }
        Err(e) => registration_error_response(e),
    }
}

fn registration_error_response(err: RegistrationError) -> (StatusCode, Json<ApiResponse>) {
    match err {
        RegistrationError::Validation(e) => (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("유효하지 않은 요청입니다.").with_errors(vec![e.to_string()])),
        ),
        RegistrationError::VerificationFailed => (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("사람 확인에 실패했습니다. 다시 시도해 주세요.")),
        ),
        RegistrationError::Duplicate => (
            StatusCode::CONFLICT,
            Json(ApiResponse::error("이미 등록된 웹훅입니다.")),
        ),
        RegistrationError::QuotaExceeded { limit } => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(ApiResponse::error_with_details(
                "등록 가능한 웹훅 수를 초과했습니다.",
                json!({ "limit": limit }),
            )),
        ),
        RegistrationError::TestFailed { kind, message } => (
            StatusCode::BAD_REQUEST,
            Json(
                ApiResponse::error(message)
                    .with_test_result(json!({ "success": false, "category": kind.to_string() })),
            ),
        ),
        RegistrationError::Internal(e) => {
            log::error!("Webhook registration failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error("서버 오류가 발생했습니다.").with_errors(vec![e.to_string()])),
            )
        }
    }
}

pub async fn detailed_stats(State(state): State<ApiState>) -> (StatusCode, Json<ApiResponse>) {
    match state.store.stats().await {
        Ok(stats) => {
            let efficiency = stats.efficiency();
            let data = json!({
                "stats": stats,
                "efficiency": efficiency,
                "grade": health_grade(efficiency),
            });
            (StatusCode::OK, Json(ApiResponse::ok(data)))
        }
        Err(e) => {
            log::error!("Failed to read webhook stats: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error("통계를 불러오지 못했습니다.")),
            )
        }
    }
}

pub async fn system_health(State(state): State<ApiState>) -> (StatusCode, Json<ApiResponse>) {
    match state.store.stats().await {
        Ok(stats) => {
            let efficiency = stats.efficiency();
            let status = if efficiency >= 70.0 {
                "healthy"
            } else {
                "needs_optimization"
            };
            let data = json!({
                "efficiency": efficiency,
                "stats": stats,
                "status": status,
            });
            (StatusCode::OK, Json(ApiResponse::ok(data)))
        }
        Err(e) => {
            log::error!("Failed to read webhook stats: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error("상태를 확인하지 못했습니다.")),
            )
        }
    }
}
