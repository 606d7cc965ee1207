use cacheable::CacheService;
use errors::Result;
use log::warn;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Smooth dispatch throttle over two tiers: one interval shared by every
/// outbound send, one per subscriber endpoint.
///
/// Last-send timestamps live in the shared cache so pacing survives across
/// requests (and process bounces when Redis backs the cache). Writes are
/// last-write-wins; two racing senders at worst record a slightly
/// too-recent timestamp, which only makes the limiter more cautious.
///
/// Cache failures degrade to best-effort: the missing timestamp is treated
/// as zero and dispatch proceeds.
#[derive(Clone)]
pub struct DispatchRateLimiter {
    cache: Arc<CacheService>,
    global_min_interval_ms: u64,
    endpoint_min_interval_ms: u64,
}

impl DispatchRateLimiter {
    /// `global_per_second` and `per_endpoint_per_minute` are converted to
    /// minimum inter-send intervals (e.g. 30/s -> 33 ms, 60/min -> 1000 ms).
    pub fn new(cache: Arc<CacheService>, global_per_second: u32, per_endpoint_per_minute: u32) -> Self {
        Self {
            cache,
            global_min_interval_ms: 1000 / global_per_second.max(1) as u64,
            endpoint_min_interval_ms: 60_000 / per_endpoint_per_minute.max(1) as u64,
        }
    }

    fn global_key(&self) -> String {
        format!("{}:rate_limit:global", self.cache.namespace())
    }

    fn endpoint_key(&self, webhook_id: i64) -> String {
        format!("{}:rate_limit:webhook:{}", self.cache.namespace(), webhook_id)
    }

    fn now_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    async fn last_send_ms(&self, key: &str) -> u64 {
        match self.cache.get(key).await {
            Ok(Some(bytes)) => String::from_utf8(bytes)
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(0),
            Ok(None) => 0,
            Err(e) => {
                warn!("Rate-limit state unavailable for {key}, proceeding best-effort: {e}");
                0
            }
        }
    }

    fn wait_for(last_send: u64, now: u64, min_interval: u64) -> u64 {
        let elapsed = now.saturating_sub(last_send);
        min_interval.saturating_sub(elapsed)
    }

    /// Returns `(global_wait_ms, endpoint_wait_ms)` without sleeping.
    pub async fn pending_wait(&self, webhook_id: i64) -> (u64, u64) {
        let now = Self::now_ms();
        let global_last = self.last_send_ms(&self.global_key()).await;
        let endpoint_last = self.last_send_ms(&self.endpoint_key(webhook_id)).await;
        (
            Self::wait_for(global_last, now, self.global_min_interval_ms),
            Self::wait_for(endpoint_last, now, self.endpoint_min_interval_ms),
        )
    }

    /// Blocks until a send to `webhook_id` honors both tiers.
    pub async fn acquire(&self, webhook_id: i64) -> Result<()> {
        let (global_wait, endpoint_wait) = self.pending_wait(webhook_id).await;
        let wait = global_wait.max(endpoint_wait);
        if wait > 0 {
            tokio::time::sleep(Duration::from_millis(wait)).await;
        }
        Ok(())
    }

    /// Blocks until the global tier alone allows a send. Used for test
    /// deliveries against endpoints that have no id yet.
    pub async fn acquire_global(&self) -> Result<()> {
        let now = Self::now_ms();
        let last = self.last_send_ms(&self.global_key()).await;
        let wait = Self::wait_for(last, now, self.global_min_interval_ms);
        if wait > 0 {
            tokio::time::sleep(Duration::from_millis(wait)).await;
        }
        Ok(())
    }

    /// Records a successful send to `webhook_id`. Failed sends must not be
    /// recorded so they do not consume quota.
    pub async fn record(&self, webhook_id: i64) {
        let now = Self::now_ms();
        self.write_stamp(&self.global_key(), now, self.global_min_interval_ms).await;
        self.write_stamp(&self.endpoint_key(webhook_id), now, self.endpoint_min_interval_ms)
            .await;
    }

    /// Records a successful send that only consumed the global tier.
    pub async fn record_global(&self) {
        let now = Self::now_ms();
        self.write_stamp(&self.global_key(), now, self.global_min_interval_ms).await;
    }

    async fn write_stamp(&self, key: &str, now: u64, min_interval_ms: u64) {
        // TTL of twice the guarded interval keeps the record alive for the
        // next check while letting idle keys expire.
        let ttl = Duration::from_millis((min_interval_ms * 2).max(1000));
        if let Err(e) = self
            .cache
            .set(key, now.to_string().as_bytes(), Some(ttl))
            .await
        {
            warn!("Failed to record rate-limit stamp for {key}: {e}");
        }
    }

    pub fn global_min_interval_ms(&self) -> u64 {
        self.global_min_interval_ms
    }

    pub fn endpoint_min_interval_ms(&self) -> u64 {
        self.endpoint_min_interval_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn limiter(global_per_second: u32, per_endpoint_per_minute: u32) -> DispatchRateLimiter {
        let cache = Arc::new(CacheService::new(
            None,
            "limiter-test".to_string(),
            Some(Duration::from_secs(60)),
        ));
        DispatchRateLimiter::new(cache, global_per_second, per_endpoint_per_minute)
    }

    #[test]
    fn intervals_follow_configured_quotas() {
        let limiter = limiter(30, 60);
        assert_eq!(limiter.global_min_interval_ms(), 33);
        assert_eq!(limiter.endpoint_min_interval_ms(), 1000);
    }

    #[tokio::test]
    async fn first_acquire_does_not_wait() {
        let limiter = limiter(30, 60);
        let (global_wait, endpoint_wait) = limiter.pending_wait(1).await;
        assert_eq!(global_wait, 0);
        assert_eq!(endpoint_wait, 0);
    }

    #[tokio::test]
    async fn record_arms_both_tiers() {
        let limiter = limiter(30, 60);
        limiter.record(7).await;

        let (global_wait, endpoint_wait) = limiter.pending_wait(7).await;
        assert!(global_wait <= 33);
        assert!(endpoint_wait > 900, "endpoint wait was {endpoint_wait}");

        // A different endpoint only observes the global tier.
        let (_, other_endpoint_wait) = limiter.pending_wait(8).await;
        assert_eq!(other_endpoint_wait, 0);
    }

    #[tokio::test]
    async fn acquire_sleeps_out_the_endpoint_interval() {
        // 60000/1200 = 50ms per-endpoint interval keeps the test fast.
        let limiter = limiter(1000, 1200);
        limiter.record(3).await;

        let start = Instant::now();
        limiter.acquire(3).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn failures_do_not_consume_quota() {
        let limiter = limiter(30, 60);
        // Nothing recorded: repeated acquires stay free.
        limiter.acquire(5).await.unwrap();
        let (_, endpoint_wait) = limiter.pending_wait(5).await;
        assert_eq!(endpoint_wait, 0);
    }
}
