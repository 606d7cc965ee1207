use cacheable::{CacheAble, CacheService};
use chrono::{SecondsFormat, Utc};
use common::model::Notice;
use errors::Result;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

pub const MAX_CACHE_SIZE: usize = 50;

const CACHE_SLOT: &str = "latest";

#[derive(Debug, Default, Serialize, Deserialize)]
struct RecentNotices {
    notices: Vec<Notice>,
}

impl CacheAble for RecentNotices {
    fn field() -> impl AsRef<str> {
        "recent_notices"
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct NoticeIdSet {
    ids: Vec<i64>,
}

impl CacheAble for NoticeIdSet {
    fn field() -> impl AsRef<str> {
        "new_notices_set"
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheMeta {
    pub size: usize,
    pub last_updated: Option<String>,
    pub max_size: usize,
    pub is_initialized: bool,
}

impl CacheAble for CacheMeta {
    fn field() -> impl AsRef<str> {
        "cache_info"
    }
}

/// Bounded window of the most recently seen notices, persisted in the
/// shared cache. The id set is the diff oracle for crawling; the record
/// list exists so a restarted process can rebuild the set instead of
/// re-notifying everything it has already announced.
///
/// All operations serialize on one internal lock, so callers observe each
/// operation as atomic.
pub struct NoticeCache {
    cache: Arc<CacheService>,
    lock: Mutex<()>,
    initialized: AtomicBool,
}

impl NoticeCache {
    pub fn new(cache: Arc<CacheService>) -> Self {
        Self {
            cache,
            lock: Mutex::new(()),
            initialized: AtomicBool::new(false),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    fn now_string() -> String {
        Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    fn normalize(mut notices: Vec<Notice>) -> Vec<Notice> {
        notices.sort_by(|a, b| b.num.cmp(&a.num));
        notices.dedup_by_key(|n| n.num);
        notices.truncate(MAX_CACHE_SIZE);
        notices
    }

    async fn store_window(&self, notices: &[Notice]) -> Result<()> {
        let window = RecentNotices {
            notices: notices.to_vec(),
        };
        window.send(CACHE_SLOT, &self.cache).await?;

        let id_set = NoticeIdSet {
            ids: notices.iter().map(|n| n.num).collect(),
        };
        id_set.send(CACHE_SLOT, &self.cache).await?;

        let meta = CacheMeta {
            size: notices.len(),
            last_updated: Some(Self::now_string()),
            max_size: MAX_CACHE_SIZE,
            is_initialized: true,
        };
        meta.send(CACHE_SLOT, &self.cache).await?;

        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Seeds the cache from one crawl. A warm store is never overwritten:
    /// a restarted process only refreshes the meta record, which protects
    /// the diff state from being clobbered into "everything is new".
    pub async fn initialize(&self, notices: Vec<Notice>) -> Result<()> {
        let _guard = self.lock.lock().await;

        let existing = RecentNotices::sync(CACHE_SLOT, &self.cache).await?;
        if let Some(existing) = existing {
            if !existing.notices.is_empty() {
                info!(
                    "Cache already warm with {} notices; keeping existing window",
                    existing.notices.len()
                );
                let meta = CacheMeta {
                    size: existing.notices.len(),
                    last_updated: Some(Self::now_string()),
                    max_size: MAX_CACHE_SIZE,
                    is_initialized: true,
                };
                meta.send(CACHE_SLOT, &self.cache).await?;
                self.initialized.store(true, Ordering::SeqCst);
                return Ok(());
            }
        }

        let window = Self::normalize(notices);
        info!("Initializing notice cache with {} notices", window.len());
        self.store_window(&window).await
    }

    /// Returns the crawled notices whose `num` is not yet known.
    ///
    /// If this process has not initialized but a previous one left a warm
    /// window behind, the id set is rebuilt from it first and the true
    /// diff is returned. Cache errors degrade to treating everything as
    /// new rather than silently dropping notices.
    pub async fn find_new(&self, crawled: &[Notice]) -> Vec<Notice> {
        let _guard = self.lock.lock().await;

        let ids = match self.load_ids().await {
            Ok(Some(ids)) => ids,
            Ok(None) => {
                debug!("No cached id set; treating all {} crawled notices as new", crawled.len());
                return crawled.to_vec();
            }
            Err(e) => {
                warn!("Could not read notice id set, degrading to full diff: {e}");
                return crawled.to_vec();
            }
        };

        crawled
            .iter()
            .filter(|n| !ids.contains(&n.num))
            .cloned()
            .collect()
    }

    async fn load_ids(&self) -> Result<Option<HashSet<i64>>> {
        if let Some(set) = NoticeIdSet::sync(CACHE_SLOT, &self.cache).await? {
            self.initialized.store(true, Ordering::SeqCst);
            return Ok(Some(set.ids.into_iter().collect()));
        }

        // Restart-safe path: a warm window without an id set (or a cold
        // process against a warm store) reconstructs the set.
        if let Some(window) = RecentNotices::sync(CACHE_SLOT, &self.cache).await? {
            if !window.notices.is_empty() {
                info!(
                    "Rebuilding notice id set from {} persisted notices",
                    window.notices.len()
                );
                let ids: Vec<i64> = window.notices.iter().map(|n| n.num).collect();
                let id_set = NoticeIdSet { ids: ids.clone() };
                id_set.send(CACHE_SLOT, &self.cache).await?;
                self.initialized.store(true, Ordering::SeqCst);
                return Ok(Some(ids.into_iter().collect()));
            }
        }

        Ok(None)
    }

    /// Merges one crawl into the window. A crawl with nothing new is a
    /// no-op; otherwise the merged window is re-sorted descending and
    /// truncated. After this returns, `find_new` over the same input is
    /// empty.
    pub async fn update(&self, crawled: &[Notice]) -> Result<()> {
        let _guard = self.lock.lock().await;

        let existing = RecentNotices::sync(CACHE_SLOT, &self.cache)
            .await?
            .unwrap_or_default()
            .notices;
        let known: HashSet<i64> = existing.iter().map(|n| n.num).collect();

        let fresh: Vec<Notice> = crawled
            .iter()
            .filter(|n| !known.contains(&n.num))
            .cloned()
            .collect();
        if fresh.is_empty() {
            return Ok(());
        }

        let mut merged = existing;
        merged.extend(fresh);
        let window = Self::normalize(merged);
        debug!("Notice cache updated to {} entries", window.len());
        self.store_window(&window).await
    }

    /// Most recent cached notices, newest first.
    pub async fn recent(&self, limit: usize) -> Result<Vec<Notice>> {
        let window = RecentNotices::sync(CACHE_SLOT, &self.cache)
            .await?
            .unwrap_or_default();
        Ok(window
            .notices
            .into_iter()
            .take(limit.min(MAX_CACHE_SIZE))
            .collect())
    }

    pub async fn meta(&self) -> CacheMeta {
        match CacheMeta::sync(CACHE_SLOT, &self.cache).await {
            Ok(Some(meta)) => meta,
            Ok(None) => CacheMeta {
                max_size: MAX_CACHE_SIZE,
                ..Default::default()
            },
            Err(e) => {
                warn!("Could not read cache meta: {e}");
                CacheMeta {
                    max_size: MAX_CACHE_SIZE,
                    ..Default::default()
                }
            }
        }
    }

    pub async fn clear(&self) -> Result<()> {
        let _guard = self.lock.lock().await;

        RecentNotices::delete(CACHE_SLOT, &self.cache).await?;
        NoticeIdSet::delete(CACHE_SLOT, &self.cache).await?;
        let meta = CacheMeta {
            size: 0,
            last_updated: None,
            max_size: MAX_CACHE_SIZE,
            is_initialized: false,
        };
        meta.send(CACHE_SLOT, &self.cache).await?;
        self.initialized.store(false, Ordering::SeqCst);
        Ok(())
    }

    pub async fn ping(&self) -> bool {
        self.cache.ping().await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notice(num: i64) -> Notice {
        Notice::new(num, format!("공고 {num}"), "의원", "법제사법위원회", format!("https://example.org/{num}"))
    }

    fn service() -> Arc<CacheService> {
        Arc::new(CacheService::new(None, "notice-cache-test".to_string(), None))
    }

    #[tokio::test]
    async fn cold_start_initializes_and_second_crawl_diffs_empty() {
        let cache = NoticeCache::new(service());
        cache.initialize(vec![notice(100), notice(99)]).await.unwrap();

        assert!(cache.is_initialized());
        let meta = cache.meta().await;
        assert_eq!(meta.size, 2);
        assert!(meta.is_initialized);

        let diff = cache.find_new(&[notice(100), notice(99)]).await;
        assert!(diff.is_empty());
    }

    #[tokio::test]
    async fn update_then_find_new_is_empty() {
        let cache = NoticeCache::new(service());
        cache.initialize(vec![notice(100), notice(99)]).await.unwrap();

        let crawled = vec![notice(101), notice(100), notice(99)];
        let diff = cache.find_new(&crawled).await;
        assert_eq!(diff.iter().map(|n| n.num).collect::<Vec<_>>(), vec![101]);

        cache.update(&crawled).await.unwrap();
        assert!(cache.find_new(&crawled).await.is_empty());

        let recent = cache.recent(20).await.unwrap();
        assert_eq!(recent.iter().map(|n| n.num).collect::<Vec<_>>(), vec![101, 100, 99]);
    }

    #[tokio::test]
    async fn window_is_truncated_to_max_size() {
        let cache = NoticeCache::new(service());
        let many: Vec<Notice> = (1..=80).map(notice).collect();
        cache.initialize(many).await.unwrap();

        let meta = cache.meta().await;
        assert_eq!(meta.size, MAX_CACHE_SIZE);

        let recent = cache.recent(100).await.unwrap();
        assert_eq!(recent.len(), MAX_CACHE_SIZE);
        // Highest nums survive the truncation.
        assert_eq!(recent[0].num, 80);
        assert_eq!(recent.last().unwrap().num, 31);
    }

    #[tokio::test]
    async fn restart_against_warm_store_returns_true_diff() {
        let service = service();

        // First process warms the cache.
        {
            let cache = NoticeCache::new(Arc::clone(&service));
            let window: Vec<Notice> = (1..=30).map(notice).collect();
            cache.initialize(window).await.unwrap();
        }

        // Cold process, same store. 30 known + 1 new.
        let restarted = NoticeCache::new(Arc::clone(&service));
        assert!(!restarted.is_initialized());

        let mut crawled: Vec<Notice> = (1..=30).map(notice).collect();
        crawled.insert(0, notice(31));
        let diff = restarted.find_new(&crawled).await;

        assert_eq!(diff.iter().map(|n| n.num).collect::<Vec<_>>(), vec![31]);
        assert!(restarted.is_initialized());
    }

    #[tokio::test]
    async fn id_set_is_rebuilt_from_persisted_window() {
        let service = service();
        {
            let cache = NoticeCache::new(Arc::clone(&service));
            cache.initialize((1..=5).map(notice).collect()).await.unwrap();
        }

        // Simulate a store where only the record window survived.
        service
            .del("notice-cache-test:new_notices_set:latest")
            .await
            .unwrap();

        let restarted = NoticeCache::new(Arc::clone(&service));
        let diff = restarted.find_new(&[notice(6), notice(5)]).await;
        assert_eq!(diff.iter().map(|n| n.num).collect::<Vec<_>>(), vec![6]);
        assert!(restarted.is_initialized());
    }

    #[tokio::test]
    async fn initialize_does_not_clobber_warm_store() {
        let service = service();

        let cache = NoticeCache::new(Arc::clone(&service));
        cache.initialize(vec![notice(100), notice(99)]).await.unwrap();

        // A second initialize (e.g. restart) must not replace the window.
        let restarted = NoticeCache::new(Arc::clone(&service));
        restarted.initialize(vec![notice(7)]).await.unwrap();

        let recent = restarted.recent(20).await.unwrap();
        assert_eq!(recent.iter().map(|n| n.num).collect::<Vec<_>>(), vec![100, 99]);
        assert!(restarted.is_initialized());
    }

    #[tokio::test]
    async fn update_with_nothing_new_keeps_meta() {
        let cache = NoticeCache::new(service());
        cache.initialize(vec![notice(100)]).await.unwrap();
        let before = cache.meta().await;

        cache.update(&[notice(100)]).await.unwrap();
        let after = cache.meta().await;
        assert_eq!(before.last_updated, after.last_updated);
    }

    #[tokio::test]
    async fn clear_resets_state() {
        let cache = NoticeCache::new(service());
        cache.initialize(vec![notice(100)]).await.unwrap();

        cache.clear().await.unwrap();
        assert!(!cache.is_initialized());

        let meta = cache.meta().await;
        assert_eq!(meta.size, 0);
        assert!(!meta.is_initialized);
        assert!(cache.recent(20).await.unwrap().is_empty());
    }
}
