use crate::batch::BatchExecutor;
use crate::dispatch::DispatchCoordinator;
use crate::notice::cache::NoticeCache;
use common::interface::NoticeSource;
use errors::Result;
use log::{debug, error, info, warn};
use metrics::counter;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Periodic crawl → diff → dispatch loop.
///
/// Strictly non-reentrant: a tick that finds the previous one still
/// running logs and returns. Until the cache has been initialized by a
/// successful crawl, ticks only retry initialization; nothing is
/// dispatched from an unseeded diff oracle.
pub struct CrawlScheduler {
    cache: Arc<NoticeCache>,
    source: Arc<dyn NoticeSource>,
    dispatcher: Arc<DispatchCoordinator>,
    executor: Arc<BatchExecutor>,
    interval: Duration,
    is_processing: AtomicBool,
}

impl CrawlScheduler {
    pub fn new(
        cache: Arc<NoticeCache>,
        source: Arc<dyn NoticeSource>,
        dispatcher: Arc<DispatchCoordinator>,
        executor: Arc<BatchExecutor>,
        interval: Duration,
    ) -> Self {
        Self {
            cache,
            source,
            dispatcher,
            executor,
            interval,
            is_processing: AtomicBool::new(false),
        }
    }

    /// One startup crawl to warm the diff oracle. Failure is not fatal:
    /// the scheduler arms anyway and retries on every tick.
    pub async fn initialize_cache(&self) -> Result<()> {
        match self.source.fetch_latest().await {
            Ok(notices) => {
                self.cache.initialize(notices).await?;
                info!("Notice cache initialized");
                Ok(())
            }
            Err(e) => {
                error!("Initial crawl failed; cache stays cold until a tick succeeds: {e}");
                Err(e)
            }
        }
    }

    pub fn start(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) {
        tokio::spawn(async move {
            info!("CrawlScheduler started with interval {:?}", self.interval);
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick of a tokio interval fires immediately;
            // initialization already crawled, so consume it.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("CrawlScheduler received shutdown signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = self.tick().await {
                            error!("Crawl tick failed: {e}");
                        }
                    }
                }
            }

            info!("CrawlScheduler loop ended");
        });
    }

    pub async fn tick(&self) -> Result<()> {
        if !self.cache.is_initialized() {
            debug!("Cache not initialized; retrying initialization instead of dispatching");
            return self.initialize_cache().await;
        }

        if self.is_processing.swap(true, Ordering::SeqCst) {
            warn!("Previous crawl tick still running; skipping this one");
            return Ok(());
        }

        counter!("crawl_ticks_total").increment(1);
        let result = self.run_cycle().await;
        self.is_processing.store(false, Ordering::SeqCst);
        result
    }

    async fn run_cycle(&self) -> Result<()> {
        let crawled = match self.source.fetch_latest().await {
            Ok(list) => list,
            Err(e) => {
                warn!("Crawl failed; skipping this cycle: {e}");
                return Ok(());
            }
        };
        if crawled.is_empty() {
            warn!("Crawler returned no data; skipping this cycle");
            return Ok(());
        }

        let new_notices = self.cache.find_new(&crawled).await;
        if new_notices.is_empty() {
            debug!("No new notices among {} crawled", crawled.len());
            // Still merge so ordering stays fresh; update itself no-ops
            // when nothing is actually new.
            self.cache.update(&crawled).await?;
            return Ok(());
        }

        info!("Found {} new notices; dispatching", new_notices.len());
        let dispatcher = Arc::clone(&self.dispatcher);
        let dispatch_result = match self
            .executor
            .submit("notification_batch", dispatcher.dispatch_all(new_notices))
        {
            // The only blocking dispatch path: the cache must not absorb
            // this crawl before delivery has been attempted.
            Ok(job_id) => self.executor.await_job(&job_id).await,
            Err(e) => Err(e),
        };

        match dispatch_result {
            Ok(summary) => {
                info!(
                    "Dispatch complete: {}/{} deliveries succeeded, {} endpoints deactivated",
                    summary.success_count, summary.total_deliveries, summary.deactivated
                );
                self.cache.update(&crawled).await?;
                Ok(())
            }
            Err(e) => {
                // Update anyway so the next tick does not re-fire on the
                // same notices; surface the dispatch error.
                if let Err(update_err) = self.cache.update(&crawled).await {
                    warn!("Cache update after failed dispatch also failed: {update_err}");
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::BatchOptions;
    use crate::testing::{notice, MemoryStore, ScriptedDeliverer, StaticSource};
    use cacheable::CacheService;

    fn hook_url(n: u64) -> String {
        format!(
            "https://discord.com/api/webhooks/1234567890123456{n}/{}",
            "t".repeat(64)
        )
    }

    fn fast_options() -> BatchOptions {
        BatchOptions {
            retry_count: 0,
            retry_delay: Duration::from_millis(1),
            ..Default::default()
        }
    }

    struct Fixture {
        scheduler: CrawlScheduler,
        store: Arc<MemoryStore>,
        deliverer: Arc<ScriptedDeliverer>,
        cache: Arc<NoticeCache>,
    }

    fn fixture(source: StaticSource, store: MemoryStore) -> Fixture {
        let store = Arc::new(store);
        let deliverer = Arc::new(ScriptedDeliverer::all_ok());
        let executor = Arc::new(BatchExecutor::new());
        let cache = Arc::new(NoticeCache::new(Arc::new(CacheService::new(
            None,
            "scheduler-test".to_string(),
            None,
        ))));
        let dispatcher = Arc::new(DispatchCoordinator::new(
            Arc::clone(&store) as Arc<dyn common::interface::WebhookStore>,
            Arc::clone(&deliverer) as Arc<dyn delivery::Deliverer>,
            Arc::clone(&executor),
            fast_options(),
        ));
        let scheduler = CrawlScheduler::new(
            Arc::clone(&cache),
            Arc::new(source),
            dispatcher,
            executor,
            Duration::from_secs(600),
        );
        Fixture {
            scheduler,
            store,
            deliverer,
            cache,
        }
    }

    #[tokio::test]
    async fn warm_cache_dispatches_only_new_notices() {
        let source = StaticSource::new(vec![
            Ok(vec![notice(100), notice(99)]),
            Ok(vec![notice(101), notice(100), notice(99)]),
        ]);
        let f = fixture(source, MemoryStore::new());
        for n in 1..=3 {
            f.store.seed_active(&hook_url(n)).await;
        }

        f.scheduler.initialize_cache().await.unwrap();
        f.scheduler.tick().await.unwrap();

        // One new notice against three endpoints.
        assert_eq!(f.deliverer.total_calls(), 3);
        let recent = f.cache.recent(20).await.unwrap();
        assert_eq!(recent.iter().map(|n| n.num).collect::<Vec<_>>(), vec![101, 100, 99]);
    }

    #[tokio::test]
    async fn identical_crawl_twice_notifies_once() {
        let source = StaticSource::new(vec![
            Ok(vec![notice(100)]),
            Ok(vec![notice(101), notice(100)]),
        ]);
        let f = fixture(source, MemoryStore::new());
        f.store.seed_active(&hook_url(1)).await;

        f.scheduler.initialize_cache().await.unwrap();
        f.scheduler.tick().await.unwrap();
        assert_eq!(f.deliverer.total_calls(), 1);

        // Same crawl again: no new diff, no dispatch.
        f.scheduler.tick().await.unwrap();
        assert_eq!(f.deliverer.total_calls(), 1);
    }

    #[tokio::test]
    async fn failed_initialization_retries_on_tick_until_success() {
        let source = StaticSource::new(vec![
            Err(errors::CrawlError::EmptyIndex.into()),
            Ok(vec![notice(100)]),
        ]);
        let f = fixture(source, MemoryStore::new());
        f.store.seed_active(&hook_url(1)).await;

        assert!(f.scheduler.initialize_cache().await.is_err());
        assert!(!f.cache.is_initialized());

        // Tick retries initialization; a successful crawl seeds the cache
        // without dispatching anything.
        f.scheduler.tick().await.unwrap();
        assert!(f.cache.is_initialized());
        assert_eq!(f.deliverer.total_calls(), 0);
    }

    #[tokio::test]
    async fn empty_crawl_skips_cycle_entirely() {
        let source = StaticSource::new(vec![Ok(vec![notice(100)]), Ok(vec![])]);
        let f = fixture(source, MemoryStore::new());
        f.store.seed_active(&hook_url(1)).await;

        f.scheduler.initialize_cache().await.unwrap();
        f.scheduler.tick().await.unwrap();

        assert_eq!(f.deliverer.total_calls(), 0);
        let meta = f.cache.meta().await;
        assert_eq!(meta.size, 1);
    }

    #[tokio::test]
    async fn crawl_error_is_recoverable_skip() {
        let source = StaticSource::new(vec![
            Ok(vec![notice(100)]),
            Err(errors::CrawlError::Timeout(3).into()),
        ]);
        let f = fixture(source, MemoryStore::new());
        f.store.seed_active(&hook_url(1)).await;

        f.scheduler.initialize_cache().await.unwrap();
        // A failing crawl must not error the tick nor dispatch anything.
        f.scheduler.tick().await.unwrap();
        assert_eq!(f.deliverer.total_calls(), 0);
    }
}
