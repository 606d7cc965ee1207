use super::state::ApiState;
use super::{health, notices, stats, webhooks};
use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

pub fn router(api_state: ApiState, frontend_origins: &[String]) -> Router {
    let cors = build_cors(frontend_origins);

    Router::new()
        .route("/api/webhooks", post(webhooks::register))
        .route("/api/webhooks/stats/detailed", get(webhooks::detailed_stats))
        .route("/api/webhooks/system-health", get(webhooks::system_health))
        .route("/api/notices/recent", get(notices::recent))
        .route("/api/stats", get(stats::overview))
        .route("/api/batch/status", get(stats::batch_status))
        .route("/api/health", get(health::health_check))
        .route("/metrics", get(stats::metrics))
        .layer(cors)
        .with_state(api_state)
}

fn build_cors(frontend_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = frontend_origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect();

    let allow_origin = if origins.is_empty() {
        // No allowlist configured: open for local development.
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
}
