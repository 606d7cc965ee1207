use crate::batch::{BatchExecutor, BatchOptions, BatchSummary};
use common::interface::WebhookStore;
use common::model::{Notice, WebhookPayload};
use dashmap::DashMap;
use delivery::{Deliverer, DeliveryOutcome, FailureKind};
use errors::Result;
use log::{debug, error, info, warn};
use metrics::counter;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryResult {
    pub webhook_id: i64,
    pub success: bool,
    pub should_delete: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoticeDispatchReport {
    pub num: i64,
    pub total_endpoints: usize,
    pub success_count: usize,
    pub failed_count: usize,
    pub deactivated: usize,
    pub temporary_failures: usize,
}

/// Fans one batch of new notices out to the active endpoints and drives
/// the endpoint lifecycle from the delivery results.
///
/// One executor job per notice; inside a job the sends run sequentially so
/// the 1 s per-endpoint pacing is honored without contention. Parallelism
/// comes from running notices concurrently.
pub struct DispatchCoordinator {
    store: Arc<dyn WebhookStore>,
    client: Arc<dyn Deliverer>,
    executor: Arc<BatchExecutor>,
    options: BatchOptions,
    /// Endpoints that already failed permanently during the current batch.
    /// Advisory only; the repository stays the source of truth. Cleared
    /// per id once the row is deactivated.
    permanent_failed: DashMap<i64, FailureKind>,
}

impl DispatchCoordinator {
    pub fn new(
        store: Arc<dyn WebhookStore>,
        client: Arc<dyn Deliverer>,
        executor: Arc<BatchExecutor>,
        options: BatchOptions,
    ) -> Self {
        Self {
            store,
            client,
            executor,
            options,
            permanent_failed: DashMap::new(),
        }
    }

    /// Runs delivery jobs for every notice and aggregates their reports.
    pub async fn dispatch_all(self: Arc<Self>, notices: Vec<Notice>) -> Result<BatchSummary> {
        let total_notices = notices.len();
        if total_notices == 0 {
            return Ok(BatchSummary::default());
        }

        let jobs: Vec<_> = notices
            .into_iter()
            .map(|notice| {
                let coordinator = Arc::clone(&self);
                move || {
                    let coordinator = Arc::clone(&coordinator);
                    let notice = notice.clone();
                    async move { coordinator.dispatch_notice(notice).await }
                }
            })
            .collect();

        let results = self.executor.execute_batch(jobs, &self.options).await?;

        let mut summary = BatchSummary {
            total_notices,
            ..Default::default()
        };
        for job in &results {
            match &job.result {
                Ok(report) => {
                    summary.total_deliveries += report.total_endpoints;
                    summary.success_count += report.success_count;
                    summary.failed_count += report.failed_count;
                    summary.deactivated += report.deactivated;
                    summary.temporary_failures += report.temporary_failures;
                }
                Err(e) => {
                    summary.failed_count += 1;
                    error!("Notice dispatch job {} failed: {e}", job.index);
                }
            }
        }

        counter!("dispatch_batches_total").increment(1);
        Ok(summary)
    }

    /// Delivers one notice to the endpoints that are active right now.
    /// The fresh read matters: endpoints deactivated earlier in the batch
    /// must not be retried by later notices.
    async fn dispatch_notice(&self, notice: Notice) -> Result<NoticeDispatchReport> {
        let endpoints = self.store.find_active().await?;
        let payload = WebhookPayload::for_notice(&notice);

        let mut report = NoticeDispatchReport {
            num: notice.num,
            total_endpoints: endpoints.len(),
            success_count: 0,
            failed_count: 0,
            deactivated: 0,
            temporary_failures: 0,
        };

        if endpoints.is_empty() {
            debug!("No active endpoints for notice {}", notice.num);
            return Ok(report);
        }

        let mut results = Vec::with_capacity(endpoints.len());
        for endpoint in &endpoints {
            if self.permanent_failed.contains_key(&endpoint.id) {
                debug!(
                    "Skipping webhook {} for notice {}: already failed permanently in this batch",
                    endpoint.id, notice.num
                );
                results.push(DeliveryResult {
                    webhook_id: endpoint.id,
                    success: false,
                    should_delete: false,
                    error: Some("skipped after permanent failure".to_string()),
                });
                continue;
            }

            let outcome = self.send_with_retry(endpoint.id, &endpoint.url, &payload).await;
            if let (false, Some(kind)) = (outcome.success, outcome.kind) {
                if kind.is_permanent() {
                    self.permanent_failed.insert(endpoint.id, kind);
                }
            }
            results.push(DeliveryResult {
                webhook_id: endpoint.id,
                success: outcome.success,
                should_delete: outcome.should_delete(),
                error: outcome.detail,
            });
        }

        for result in &results {
            if result.success {
                report.success_count += 1;
                continue;
            }
            report.failed_count += 1;

            if result.should_delete {
                // Deactivation errors are logged and swallowed; the
                // dispatch already happened and must stay observable.
                match self.store.deactivate(result.webhook_id).await {
                    Ok(()) => {
                        report.deactivated += 1;
                        self.permanent_failed.remove(&result.webhook_id);
                        info!(
                            "Deactivated webhook {} after permanent failure: {}",
                            result.webhook_id,
                            result.error.as_deref().unwrap_or("unknown")
                        );
                    }
                    Err(e) => {
                        warn!("Failed to deactivate webhook {}: {e}", result.webhook_id);
                    }
                }
            } else {
                report.temporary_failures += 1;
            }
        }

        Ok(report)
    }

    /// One endpoint, one notice: bounded retries with a fixed delay.
    /// Permanent classifications stop immediately, success stops, and
    /// transient failures burn an attempt.
    async fn send_with_retry(&self, webhook_id: i64, url: &str, payload: &WebhookPayload) -> DeliveryOutcome {
        let max_attempts = self.options.retry_count + 1;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let outcome = self.client.deliver(webhook_id, url, payload).await;
            if outcome.success || outcome.should_delete() || attempt >= max_attempts {
                return outcome;
            }
            debug!(
                "Transient delivery failure to webhook {webhook_id} (attempt {attempt}/{max_attempts}): {:?}",
                outcome.kind
            );
            tokio::time::sleep(self.options.retry_delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{notice, MemoryStore, ScriptedDeliverer, SendScript};
    use std::time::Duration;

    fn fast_options() -> BatchOptions {
        BatchOptions {
            concurrency: 10,
            timeout: Duration::from_secs(5),
            retry_count: 3,
            retry_delay: Duration::from_millis(1),
            batch_size: None,
        }
    }

    fn hook_url(n: u64) -> String {
        format!(
            "https://discord.com/api/webhooks/1234567890123456{n}/{}",
            "t".repeat(64)
        )
    }

    async fn coordinator(
        store: Arc<MemoryStore>,
        deliverer: Arc<ScriptedDeliverer>,
    ) -> Arc<DispatchCoordinator> {
        Arc::new(DispatchCoordinator::new(
            store,
            deliverer,
            Arc::new(BatchExecutor::new()),
            fast_options(),
        ))
    }

    #[tokio::test]
    async fn zero_endpoints_dispatches_nothing_without_errors() {
        let store = Arc::new(MemoryStore::new());
        let deliverer = Arc::new(ScriptedDeliverer::all_ok());
        let coordinator = coordinator(Arc::clone(&store), Arc::clone(&deliverer)).await;

        let summary = coordinator.dispatch_all(vec![notice(101)]).await.unwrap();
        assert_eq!(summary.total_notices, 1);
        assert_eq!(summary.total_deliveries, 0);
        assert_eq!(deliverer.total_calls(), 0);
    }

    #[tokio::test]
    async fn successful_batch_delivers_to_every_endpoint() {
        let store = Arc::new(MemoryStore::new());
        for n in 1..=3 {
            store.seed_active(&hook_url(n)).await;
        }
        let deliverer = Arc::new(ScriptedDeliverer::all_ok());
        let coordinator = coordinator(Arc::clone(&store), Arc::clone(&deliverer)).await;

        let summary = coordinator.dispatch_all(vec![notice(101)]).await.unwrap();
        assert_eq!(summary.total_deliveries, 3);
        assert_eq!(summary.success_count, 3);
        assert_eq!(summary.failed_count, 0);
        assert_eq!(deliverer.total_calls(), 3);
    }

    #[tokio::test]
    async fn permanent_failure_deactivates_and_later_notices_skip() {
        let store = Arc::new(MemoryStore::new());
        let bad = store.seed_active(&hook_url(1)).await;
        let good = store.seed_active(&hook_url(2)).await;
        let deliverer =
            Arc::new(ScriptedDeliverer::all_ok().script(bad, SendScript::Fail(FailureKind::NotFound)));
        let coordinator = coordinator(Arc::clone(&store), Arc::clone(&deliverer)).await;

        let summary = coordinator
            .dispatch_all(vec![notice(101), notice(102)])
            .await
            .unwrap();

        // No retries for the permanent endpoint within one notice.
        assert!(deliverer.calls_for(bad) <= 2, "bad endpoint was retried");
        // The good endpoint got both notices.
        assert_eq!(deliverer.calls_for(good), 2);
        assert!(summary.deactivated >= 1);
        assert_eq!(store.active_ids(), vec![good]);
    }

    #[tokio::test]
    async fn transient_failure_retries_and_endpoint_stays_active() {
        let store = Arc::new(MemoryStore::new());
        let flaky = store.seed_active(&hook_url(1)).await;
        let deliverer = Arc::new(
            ScriptedDeliverer::all_ok().script(flaky, SendScript::Fail(FailureKind::RateLimited)),
        );
        let coordinator = coordinator(Arc::clone(&store), Arc::clone(&deliverer)).await;

        let summary = coordinator.dispatch_all(vec![notice(101)]).await.unwrap();

        // retry_count=3 means up to 4 attempts for a transient failure.
        assert_eq!(deliverer.calls_for(flaky), 4);
        assert_eq!(summary.temporary_failures, 1);
        assert_eq!(summary.deactivated, 0);
        assert_eq!(store.active_ids(), vec![flaky]);
    }

    #[tokio::test]
    async fn transient_failure_then_success_recovers_within_job() {
        let store = Arc::new(MemoryStore::new());
        let flaky = store.seed_active(&hook_url(1)).await;
        let deliverer = Arc::new(
            ScriptedDeliverer::all_ok()
                .script(flaky, SendScript::FailThenOk(FailureKind::NetworkError, 2)),
        );
        let coordinator = coordinator(Arc::clone(&store), Arc::clone(&deliverer)).await;

        let summary = coordinator.dispatch_all(vec![notice(101)]).await.unwrap();
        assert_eq!(summary.success_count, 1);
        assert_eq!(deliverer.calls_for(flaky), 3);
    }

    #[tokio::test]
    async fn deactivated_endpoints_are_not_fetched_by_later_batches() {
        let store = Arc::new(MemoryStore::new());
        let bad = store.seed_active(&hook_url(1)).await;
        let deliverer =
            Arc::new(ScriptedDeliverer::all_ok().script(bad, SendScript::Fail(FailureKind::Forbidden)));
        let coordinator = coordinator(Arc::clone(&store), Arc::clone(&deliverer)).await;

        coordinator.clone().dispatch_all(vec![notice(101)]).await.unwrap();
        let calls_after_first = deliverer.calls_for(bad);

        let summary = coordinator.dispatch_all(vec![notice(102)]).await.unwrap();
        assert_eq!(deliverer.calls_for(bad), calls_after_first);
        assert_eq!(summary.total_deliveries, 0);
    }
}
