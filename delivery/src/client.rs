use common::model::WebhookPayload;
use log::{debug, warn};
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;
use utils::rate_limit::DispatchRateLimiter;

/// Discord error payload for non-2xx responses; `code` carries provider
/// errors such as 10015 (unknown webhook).
#[derive(Debug, Deserialize)]
struct ProviderError {
    code: Option<i64>,
    message: Option<String>,
}

const PROVIDER_CODE_UNKNOWN_WEBHOOK: i64 = 10015;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Closed categorization of delivery failures. Permanent kinds mark the
/// endpoint as structurally invalid and drive deactivation; everything
/// else is retryable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    NotFound,
    Unauthorized,
    Forbidden,
    RateLimited,
    NetworkError,
    InvalidWebhook,
    UnknownError,
}

impl FailureKind {
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            FailureKind::NotFound
                | FailureKind::Unauthorized
                | FailureKind::Forbidden
                | FailureKind::InvalidWebhook
        )
    }

    /// Operator-facing message used when a registration test fails.
    pub fn user_message(&self) -> &'static str {
        match self {
            FailureKind::NotFound => "웹훅을 찾을 수 없습니다. URL을 다시 확인해 주세요.",
            FailureKind::Unauthorized => "웹훅 인증에 실패했습니다.",
            FailureKind::Forbidden => "웹훅에 접근할 수 없습니다.",
            FailureKind::RateLimited => "요청이 너무 많습니다. 잠시 후 다시 시도해 주세요.",
            FailureKind::NetworkError => "웹훅 서버에 연결할 수 없습니다.",
            FailureKind::InvalidWebhook => "유효하지 않은 웹훅 URL입니다.",
            FailureKind::UnknownError => "알 수 없는 오류로 전송에 실패했습니다.",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::NotFound => "NOT_FOUND",
            FailureKind::Unauthorized => "UNAUTHORIZED",
            FailureKind::Forbidden => "FORBIDDEN",
            FailureKind::RateLimited => "RATE_LIMITED",
            FailureKind::NetworkError => "NETWORK_ERROR",
            FailureKind::InvalidWebhook => "INVALID_WEBHOOK",
            FailureKind::UnknownError => "UNKNOWN_ERROR",
        };
        write!(f, "{s}")
    }
}

/// Result of one send attempt. Deliberately infallible at the type level:
/// a failed delivery is data, not an error that aborts the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub success: bool,
    pub kind: Option<FailureKind>,
    pub detail: Option<String>,
}

impl DeliveryOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            kind: None,
            detail: None,
        }
    }

    pub fn failed(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            success: false,
            kind: Some(kind),
            detail: Some(detail.into()),
        }
    }

    pub fn should_delete(&self) -> bool {
        self.kind.map(|k| k.is_permanent()).unwrap_or(false)
    }

    pub fn is_retryable(&self) -> bool {
        !self.success && !self.should_delete()
    }
}

/// Maps an HTTP status (plus an optional provider error code from the
/// response body) onto the closed table. Checked in priority order.
pub fn classify_status(status: u16, provider_code: Option<i64>) -> FailureKind {
    if status == 404 || provider_code == Some(PROVIDER_CODE_UNKNOWN_WEBHOOK) {
        return FailureKind::NotFound;
    }
    match status {
        401 => FailureKind::Unauthorized,
        403 => FailureKind::Forbidden,
        429 => FailureKind::RateLimited,
        400..=499 => FailureKind::InvalidWebhook,
        _ => FailureKind::UnknownError,
    }
}

/// Maps a transport-level failure. Anything unmatched is `UNKNOWN_ERROR`
/// and therefore non-permanent.
pub fn classify_transport(err: &reqwest::Error) -> FailureKind {
    if err.is_connect() || err.is_timeout() {
        FailureKind::NetworkError
    } else if err.is_builder() || err.is_request() {
        FailureKind::InvalidWebhook
    } else {
        FailureKind::UnknownError
    }
}

/// Single-notification sender. One method per use: `deliver` for regular
/// dispatch under both rate-limit tiers, `test_delivery` for the live
/// registration probe (global tier only; the endpoint has no id yet).
#[async_trait::async_trait]
pub trait Deliverer: Send + Sync {
    async fn deliver(&self, webhook_id: i64, url: &str, payload: &WebhookPayload) -> DeliveryOutcome;

    async fn test_delivery(&self, url: &str) -> DeliveryOutcome;
}

pub struct WebhookClient {
    http: reqwest::Client,
    limiter: Arc<DispatchRateLimiter>,
}

impl WebhookClient {
    pub fn new(limiter: Arc<DispatchRateLimiter>) -> errors::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| errors::DeliveryError::BuildFailed(e.into()))?;
        Ok(Self { http, limiter })
    }

    async fn post(&self, url: &str, payload: &WebhookPayload) -> DeliveryOutcome {
        if Url::parse(url).is_err() {
            return DeliveryOutcome::failed(FailureKind::InvalidWebhook, "unparseable url");
        }

        let start = Instant::now();
        let response = match self.http.post(url).json(payload).send().await {
            Ok(res) => res,
            Err(e) => {
                let kind = classify_transport(&e);
                counter!("delivery_requests_total", "result" => kind.to_string()).increment(1);
                return DeliveryOutcome::failed(kind, e.to_string());
            }
        };

        histogram!("delivery_request_duration_seconds").record(start.elapsed().as_secs_f64());

        let status = response.status();
        if status.is_success() {
            counter!("delivery_requests_total", "result" => "success").increment(1);
            return DeliveryOutcome::ok();
        }

        // Non-2xx: the body may refine the status (e.g. Discord 10015).
        let provider = response.json::<ProviderError>().await.ok();
        let provider_code = provider.as_ref().and_then(|p| p.code);
        let kind = classify_status(status.as_u16(), provider_code);
        counter!("delivery_requests_total", "result" => kind.to_string()).increment(1);

        let detail = provider
            .and_then(|p| p.message)
            .unwrap_or_else(|| format!("http status {}", status.as_u16()));
        debug!("Delivery to {url} failed: {kind} ({detail})");
        DeliveryOutcome::failed(kind, detail)
    }
}

#[async_trait::async_trait]
impl Deliverer for WebhookClient {
    async fn deliver(&self, webhook_id: i64, url: &str, payload: &WebhookPayload) -> DeliveryOutcome {
        if let Err(e) = self.limiter.acquire(webhook_id).await {
            warn!("Rate-limit acquire failed for webhook {webhook_id}, sending anyway: {e}");
        }

        let outcome = self.post(url, payload).await;
        if outcome.success {
            self.limiter.record(webhook_id).await;
        }
        outcome
    }

    async fn test_delivery(&self, url: &str) -> DeliveryOutcome {
        if let Err(e) = self.limiter.acquire_global().await {
            warn!("Rate-limit acquire failed for test delivery, sending anyway: {e}");
        }

        let outcome = self.post(url, &WebhookPayload::welcome()).await;
        if outcome.success {
            self.limiter.record_global().await;
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_table_matches_priority_order() {
        assert_eq!(classify_status(404, None), FailureKind::NotFound);
        // Provider code 10015 wins even over an otherwise-retryable status.
        assert_eq!(classify_status(400, Some(10015)), FailureKind::NotFound);
        assert_eq!(classify_status(401, None), FailureKind::Unauthorized);
        assert_eq!(classify_status(403, None), FailureKind::Forbidden);
        assert_eq!(classify_status(429, None), FailureKind::RateLimited);
        assert_eq!(classify_status(400, None), FailureKind::InvalidWebhook);
        assert_eq!(classify_status(422, None), FailureKind::InvalidWebhook);
        assert_eq!(classify_status(500, None), FailureKind::UnknownError);
        assert_eq!(classify_status(503, None), FailureKind::UnknownError);
    }

    #[test]
    fn permanent_set_drives_deletion() {
        for kind in [
            FailureKind::NotFound,
            FailureKind::Unauthorized,
            FailureKind::Forbidden,
            FailureKind::InvalidWebhook,
        ] {
            assert!(kind.is_permanent(), "{kind} should be permanent");
            assert!(DeliveryOutcome::failed(kind, "x").should_delete());
        }
        for kind in [
            FailureKind::RateLimited,
            FailureKind::NetworkError,
            FailureKind::UnknownError,
        ] {
            assert!(!kind.is_permanent(), "{kind} should be transient");
            assert!(DeliveryOutcome::failed(kind, "x").is_retryable());
        }
    }

    #[test]
    fn success_outcome_neither_deletes_nor_retries() {
        let outcome = DeliveryOutcome::ok();
        assert!(!outcome.should_delete());
        assert!(!outcome.is_retryable());
    }

    #[tokio::test]
    async fn unparseable_url_is_classified_without_network() {
        let cache = Arc::new(cacheable::CacheService::new(
            None,
            "delivery-test".to_string(),
            None,
        ));
        let limiter = Arc::new(DispatchRateLimiter::new(cache, 30, 60));
        let client = WebhookClient::new(limiter).unwrap();

        let outcome = client
            .post("not a url", &WebhookPayload::welcome())
            .await;
        assert_eq!(outcome.kind, Some(FailureKind::InvalidWebhook));
        assert!(outcome.should_delete());
    }
}
