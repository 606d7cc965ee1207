use common::model::config::DispatchConfig;
use dashmap::DashMap;
use errors::{BatchError, Error, Result};
use log::{error, info, warn};
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub concurrency: usize,
    pub timeout: Duration,
    pub retry_count: usize,
    pub retry_delay: Duration,
    /// When set and the job list is longer, the list is processed in
    /// contiguous slices of this size; the concurrency rule applies inside
    /// each slice.
    pub batch_size: Option<usize>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: 10,
            timeout: Duration::from_millis(30_000),
            retry_count: 3,
            retry_delay: Duration::from_millis(1_000),
            batch_size: None,
        }
    }
}

impl From<&DispatchConfig> for BatchOptions {
    fn from(cfg: &DispatchConfig) -> Self {
        Self {
            concurrency: cfg.concurrency,
            timeout: Duration::from_millis(cfg.job_timeout_ms),
            retry_count: cfg.retry_count,
            retry_delay: Duration::from_millis(cfg.retry_delay_ms),
            batch_size: None,
        }
    }
}

#[derive(Debug)]
pub struct JobResult<T> {
    pub index: usize,
    pub result: Result<T>,
    pub attempts: usize,
    pub duration: Duration,
}

impl<T> JobResult<T> {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Aggregate outcome of one notification batch, logged when the batch
/// finishes and surfaced over the API.
#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub total_notices: usize,
    pub total_deliveries: usize,
    pub success_count: usize,
    pub failed_count: usize,
    pub deactivated: usize,
    pub temporary_failures: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutorStatus {
    pub active_jobs: Vec<String>,
    pub active_count: usize,
    pub completed_batches: u64,
    pub shutting_down: bool,
}

/// Bounded-concurrency job runner with per-job timeout and bounded
/// retries, plus a table of in-flight background batches used to drain on
/// shutdown.
///
/// Once the shutdown gate is set, new work is refused with an explicit
/// error while already-running futures are left to complete.
pub struct BatchExecutor {
    jobs: Arc<DashMap<String, JoinHandle<()>>>,
    /// Results of self-removed batches, held until an awaiter collects them.
    finished: Arc<DashMap<String, Result<BatchSummary>>>,
    shutting_down: AtomicBool,
    completed_batches: AtomicU64,
    job_seq: AtomicU64,
}

impl BatchExecutor {
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(DashMap::new()),
            finished: Arc::new(DashMap::new()),
            shutting_down: AtomicBool::new(false),
            completed_batches: AtomicU64::new(0),
            job_seq: AtomicU64::new(0),
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    pub fn begin_shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    pub fn status(&self) -> ExecutorStatus {
        let active_jobs: Vec<String> = self.jobs.iter().map(|e| e.key().clone()).collect();
        ExecutorStatus {
            active_count: active_jobs.len(),
            active_jobs,
            completed_batches: self.completed_batches.load(Ordering::Relaxed),
            shutting_down: self.is_shutting_down(),
        }
    }

    /// Runs `jobs` with the configured bound and returns one result per
    /// job, in submission order. A failing job never aborts the batch.
    pub async fn execute_batch<T, F, Fut>(
        &self,
        jobs: Vec<F>,
        opts: &BatchOptions,
    ) -> Result<Vec<JobResult<T>>>
    where
        T: Send,
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<T>> + Send,
    {
        if self.is_shutting_down() {
            return Err(Error::shutting_down());
        }

        let total = jobs.len();
        let indexed: Vec<(usize, F)> = jobs.into_iter().enumerate().collect();
        let slice_len = opts.batch_size.unwrap_or(total).max(1);
        let concurrency = opts.concurrency.max(1);

        let mut results = Vec::with_capacity(total);
        for slice in indexed.chunks(slice_len) {
            for chunk in slice.chunks(concurrency) {
                let running = chunk.iter().map(|(index, job)| Self::run_job(*index, job, opts));
                results.extend(futures::future::join_all(running).await);
            }
        }
        Ok(results)
    }

    async fn run_job<T, F, Fut>(index: usize, job: &F, opts: &BatchOptions) -> JobResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let start = Instant::now();
        let max_attempts = opts.retry_count + 1;
        let mut attempts = 0;
        let mut last_error: Option<Error> = None;

        while attempts < max_attempts {
            attempts += 1;
            match tokio::time::timeout(opts.timeout, job()).await {
                Ok(Ok(value)) => {
                    return JobResult {
                        index,
                        result: Ok(value),
                        attempts,
                        duration: start.elapsed(),
                    };
                }
                Ok(Err(e)) => {
                    warn!("Job {index} attempt {attempts}/{max_attempts} failed: {e}");
                    last_error = Some(e);
                }
                Err(_) => {
                    let timeout_ms = opts.timeout.as_millis() as u64;
                    warn!("Job {index} attempt {attempts}/{max_attempts} timed out after {timeout_ms} ms");
                    last_error = Some(BatchError::Timeout(timeout_ms).into());
                }
            }

            if attempts < max_attempts {
                tokio::time::sleep(opts.retry_delay).await;
            }
        }

        JobResult {
            index,
            result: Err(last_error.unwrap_or_else(|| BatchError::JobPanicked("no attempt ran".to_string()).into())),
            attempts,
            duration: start.elapsed(),
        }
    }

    /// Registers `fut` as an in-flight background batch and returns its
    /// job id. The batch logs its aggregate counts and removes itself from
    /// the table when it completes.
    pub fn submit<Fut>(&self, label: &str, fut: Fut) -> Result<String>
    where
        Fut: Future<Output = Result<BatchSummary>> + Send + 'static,
    {
        if self.is_shutting_down() {
            return Err(Error::shutting_down());
        }

        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let seq = self.job_seq.fetch_add(1, Ordering::Relaxed);
        let job_id = format!("{label}_{ts}_{seq}");

        let jobs = Arc::clone(&self.jobs);
        let finished = Arc::clone(&self.finished);
        let id_for_task = job_id.clone();
        let handle = tokio::spawn(async move {
            let result = fut.await;
            match &result {
                Ok(summary) => info!(
                    "Batch {id_for_task} finished: {} notices, {} delivered, {} failed, {} deactivated",
                    summary.total_notices, summary.success_count, summary.failed_count, summary.deactivated
                ),
                Err(e) => error!("Batch {id_for_task} failed: {e}"),
            }
            finished.insert(id_for_task.clone(), result);
            jobs.remove(&id_for_task);
        });

        self.jobs.insert(job_id.clone(), handle);
        Ok(job_id)
    }

    /// Awaits one background batch and collects its summary. Batches
    /// remove themselves from the in-flight table on completion; their
    /// result is parked until the awaiter picks it up here.
    pub async fn await_job(&self, job_id: &str) -> Result<BatchSummary> {
        if let Some((_, handle)) = self.jobs.remove(job_id) {
            if let Err(e) = handle.await {
                self.finished.remove(job_id);
                return Err(BatchError::JobPanicked(e.to_string()).into());
            }
        }

        let Some((_, outcome)) = self.finished.remove(job_id) else {
            return Err(BatchError::UnknownJob(job_id.to_string()).into());
        };
        self.completed_batches.fetch_add(1, Ordering::Relaxed);
        outcome
    }

    /// Awaits every registered background batch, including ones submitted
    /// while draining.
    pub async fn await_all(&self) {
        loop {
            let ids: Vec<String> = self.jobs.iter().map(|e| e.key().clone()).collect();
            if ids.is_empty() {
                break;
            }
            for id in ids {
                let _ = self.await_job(&id).await;
            }
        }
        self.finished.clear();
    }

    /// Drains in-flight batches up to `grace`; returns whether the table
    /// emptied in time.
    pub async fn drain(&self, grace: Duration) -> bool {
        tokio::time::timeout(grace, self.await_all()).await.is_ok()
    }

    /// Clears the in-flight table immediately without awaiting; running
    /// futures are aborted.
    pub fn force_clear(&self) {
        for entry in self.jobs.iter() {
            entry.value().abort();
        }
        self.jobs.clear();
        self.finished.clear();
    }
}

impl Default for BatchExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn fast_opts() -> BatchOptions {
        BatchOptions {
            concurrency: 10,
            timeout: Duration::from_millis(200),
            retry_count: 0,
            retry_delay: Duration::from_millis(1),
            batch_size: None,
        }
    }

    #[tokio::test]
    async fn results_come_back_in_submission_order() {
        let executor = BatchExecutor::new();
        let jobs: Vec<_> = (0..8u64)
            .map(|i| {
                move || async move {
                    // Later jobs finish first.
                    tokio::time::sleep(Duration::from_millis(8 - i)).await;
                    Ok::<u64, errors::Error>(i)
                }
            })
            .collect();

        let results = executor.execute_batch(jobs, &fast_opts()).await.unwrap();
        let values: Vec<u64> = results.into_iter().map(|r| r.result.unwrap()).collect();
        assert_eq!(values, (0..8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn concurrency_ceiling_is_honored() {
        let executor = BatchExecutor::new();
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let jobs: Vec<_> = (0..20)
            .map(|_| {
                let current = Arc::clone(&current);
                let peak = Arc::clone(&peak);
                move || {
                    let current = Arc::clone(&current);
                    let peak = Arc::clone(&peak);
                    async move {
                        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        current.fetch_sub(1, Ordering::SeqCst);
                        Ok::<(), errors::Error>(())
                    }
                }
            })
            .collect();

        let opts = BatchOptions {
            concurrency: 5,
            ..fast_opts()
        };
        executor.execute_batch(jobs, &opts).await.unwrap();
        assert!(peak.load(Ordering::SeqCst) <= 5);
    }

    #[tokio::test]
    async fn failed_attempts_are_retried_until_success() {
        let executor = BatchExecutor::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let calls_job = Arc::clone(&calls);
        let jobs = vec![move || {
            let calls = Arc::clone(&calls_job);
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(errors::BatchError::JobFailed("transient".into()).into())
                } else {
                    Ok::<&str, errors::Error>("done")
                }
            }
        }];

        let opts = BatchOptions {
            retry_count: 3,
            ..fast_opts()
        };
        let results = executor.execute_batch(jobs, &opts).await.unwrap();
        assert!(results[0].is_success());
        assert_eq!(results[0].attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_exhaustion_reports_last_error() {
        let executor = BatchExecutor::new();
        let jobs = vec![|| async {
            Err::<(), errors::Error>(errors::BatchError::JobFailed("always".into()).into())
        }];

        let opts = BatchOptions {
            retry_count: 2,
            ..fast_opts()
        };
        let results = executor.execute_batch(jobs, &opts).await.unwrap();
        assert!(!results[0].is_success());
        assert_eq!(results[0].attempts, 3);
        assert!(results[0].result.as_ref().unwrap_err().to_string().contains("always"));
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_jobs_report_timeout() {
        let executor = BatchExecutor::new();
        let jobs = vec![|| async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok::<(), errors::Error>(())
        }];

        let opts = BatchOptions {
            timeout: Duration::from_millis(50),
            retry_count: 0,
            ..fast_opts()
        };
        let results = executor.execute_batch(jobs, &opts).await.unwrap();
        let err = results[0].result.as_ref().unwrap_err();
        assert!(err.to_string().contains("timed out"), "got: {err}");
    }

    #[tokio::test]
    async fn batch_size_slices_are_processed_sequentially() {
        let executor = BatchExecutor::new();
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let jobs: Vec<_> = (0..9)
            .map(|_| {
                let current = Arc::clone(&current);
                let peak = Arc::clone(&peak);
                move || {
                    let current = Arc::clone(&current);
                    let peak = Arc::clone(&peak);
                    async move {
                        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        current.fetch_sub(1, Ordering::SeqCst);
                        Ok::<(), errors::Error>(())
                    }
                }
            })
            .collect();

        let opts = BatchOptions {
            concurrency: 10,
            batch_size: Some(3),
            ..fast_opts()
        };
        executor.execute_batch(jobs, &opts).await.unwrap();
        // Slices cap parallelism even below the concurrency ceiling.
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn shutdown_gate_refuses_new_work() {
        let executor = BatchExecutor::new();
        executor.begin_shutdown();

        let batch = executor
            .execute_batch(vec![|| async { Ok::<(), errors::Error>(()) }], &fast_opts())
            .await;
        assert!(batch.is_err());

        let submitted = executor.submit("notification_batch", async { Ok(BatchSummary::default()) });
        assert!(submitted.is_err());
    }

    #[tokio::test]
    async fn submitted_batches_can_be_awaited_and_drain() {
        let executor = BatchExecutor::new();
        let summary = BatchSummary {
            total_notices: 2,
            success_count: 4,
            ..Default::default()
        };
        let job_id = executor
            .submit("notification_batch", async move { Ok(summary) })
            .unwrap();
        assert!(job_id.starts_with("notification_batch_"));

        let awaited = executor.await_job(&job_id).await.unwrap();
        assert_eq!(awaited.total_notices, 2);

        assert!(executor.drain(Duration::from_secs(1)).await);
        assert_eq!(executor.status().active_count, 0);
    }
}
