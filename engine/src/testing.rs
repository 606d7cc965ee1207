//! Hand-rolled doubles for the interface traits, shared by the engine's
//! unit tests.

use crate::webhook::canonical::canonicalize_url;
use async_trait::async_trait;
use chrono::Utc;
use common::interface::{HumanVerifier, NoticeSource, WebhookStore};
use common::model::entity::webhook;
use common::model::{BulkOutcome, Notice, WebhookPayload, WebhookStats};
use delivery::{Deliverer, DeliveryOutcome, FailureKind};
use errors::{RepositoryError, Result};
use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;

pub(crate) struct MemoryStore {
    rows: Mutex<Vec<webhook::Model>>,
    next_id: AtomicI64,
    pub deactivate_calls: AtomicUsize,
    pub cleanup_ages: Mutex<Vec<i64>>,
    pub delete_all_calls: AtomicUsize,
    /// When set, `stats()` reports this instead of deriving from rows.
    pub fixed_stats: Mutex<Option<WebhookStats>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(1),
            deactivate_calls: AtomicUsize::new(0),
            cleanup_ages: Mutex::new(Vec::new()),
            delete_all_calls: AtomicUsize::new(0),
            fixed_stats: Mutex::new(None),
        }
    }

    pub fn with_stats(stats: WebhookStats) -> Self {
        let store = Self::new();
        *store.fixed_stats.lock().unwrap() = Some(stats);
        store
    }

    pub async fn seed_active(&self, url: &str) -> i64 {
        let row = self.create_or_reactivate(url).await.expect("seed should succeed");
        row.id
    }

    pub fn active_ids(&self) -> Vec<i64> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.is_active)
            .map(|r| r.id)
            .collect()
    }
}

#[async_trait]
impl WebhookStore for MemoryStore {
    async fn create_or_reactivate(&self, url: &str) -> Result<webhook::Model> {
        let canonical = canonicalize_url(url);
        let mut rows = self.rows.lock().unwrap();

        if let Some(row) = rows.iter_mut().find(|r| r.url == canonical) {
            if !row.is_active {
                row.is_active = true;
                row.updated_at = Utc::now().naive_utc();
            }
            return Ok(row.clone());
        }

        let now = Utc::now().naive_utc();
        let row = webhook::Model {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            url: canonical,
            is_active: true,
            description: None,
            created_at: now,
            updated_at: now,
        };
        rows.push(row.clone());
        Ok(row)
    }

    async fn find_active(&self) -> Result<Vec<webhook::Model>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.is_active)
            .cloned()
            .collect())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<webhook::Model>> {
        Ok(self.rows.lock().unwrap().iter().find(|r| r.id == id).cloned())
    }

    async fn find_by_url(&self, url: &str) -> Result<Option<webhook::Model>> {
        let canonical = canonicalize_url(url);
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.url == canonical)
            .cloned())
    }

    async fn deactivate(&self, id: i64) -> Result<()> {
        self.deactivate_calls.fetch_add(1, Ordering::SeqCst);
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(RepositoryError::NotFound)?;
        row.is_active = false;
        row.updated_at = Utc::now().naive_utc();
        Ok(())
    }

    async fn delete_permanent(&self, ids: &[i64]) -> Result<u64> {
        let targets: HashSet<i64> = ids.iter().copied().collect();
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|r| !targets.contains(&r.id));
        Ok((before - rows.len()) as u64)
    }

    async fn cleanup_older_inactive(&self, age_days: i64) -> Result<u64> {
        self.cleanup_ages.lock().unwrap().push(age_days);
        Ok(0)
    }

    async fn delete_all_inactive(&self) -> Result<u64> {
        self.delete_all_calls.fetch_add(1, Ordering::SeqCst);
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|r| r.is_active);
        Ok((before - rows.len()) as u64)
    }

    async fn stats(&self) -> Result<WebhookStats> {
        if let Some(stats) = *self.fixed_stats.lock().unwrap() {
            return Ok(stats);
        }
        let rows = self.rows.lock().unwrap();
        let total = rows.len() as u64;
        let active = rows.iter().filter(|r| r.is_active).count() as u64;
        Ok(WebhookStats {
            total,
            active,
            inactive: total - active,
            old_inactive: 0,
            recent_inactive: total - active,
        })
    }

    async fn bulk_create(&self, urls: &[String]) -> Result<BulkOutcome> {
        let mut outcome = BulkOutcome::default();
        for url in urls {
            let existed = self.find_by_url(url).await?;
            match existed {
                Some(row) if row.is_active => outcome.duplicates += 1,
                Some(_) => {
                    self.create_or_reactivate(url).await?;
                    outcome.reactivated += 1;
                }
                None => {
                    self.create_or_reactivate(url).await?;
                    outcome.created += 1;
                }
            }
        }
        Ok(outcome)
    }

    async fn count_active(&self) -> Result<u64> {
        Ok(self.rows.lock().unwrap().iter().filter(|r| r.is_active).count() as u64)
    }
}

/// Behavior of one scripted endpoint for `deliver`.
#[derive(Debug, Clone, Copy)]
pub(crate) enum SendScript {
    Ok,
    Fail(FailureKind),
    /// Fails `0` times, then succeeds (for retry tests).
    FailThenOk(FailureKind, usize),
}

pub(crate) struct ScriptedDeliverer {
    scripts: Mutex<Vec<(i64, SendScript)>>,
    per_endpoint_calls: Mutex<Vec<i64>>,
    test_outcome: Option<FailureKind>,
    test_call_count: AtomicUsize,
}

impl ScriptedDeliverer {
    pub fn all_ok() -> Self {
        Self {
            scripts: Mutex::new(Vec::new()),
            per_endpoint_calls: Mutex::new(Vec::new()),
            test_outcome: None,
            test_call_count: AtomicUsize::new(0),
        }
    }

    pub fn test_failing(kind: FailureKind) -> Self {
        Self {
            test_outcome: Some(kind),
            ..Self::all_ok()
        }
    }

    pub fn script(self, webhook_id: i64, script: SendScript) -> Self {
        self.scripts.lock().unwrap().push((webhook_id, script));
        self
    }

    pub fn calls_for(&self, webhook_id: i64) -> usize {
        self.per_endpoint_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|id| **id == webhook_id)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.per_endpoint_calls.lock().unwrap().len()
    }

    pub fn test_calls(&self) -> usize {
        self.test_call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Deliverer for ScriptedDeliverer {
    async fn deliver(&self, webhook_id: i64, _url: &str, _payload: &WebhookPayload) -> DeliveryOutcome {
        let calls_so_far = {
            let mut calls = self.per_endpoint_calls.lock().unwrap();
            calls.push(webhook_id);
            calls.iter().filter(|id| **id == webhook_id).count() - 1
        };

        let script = self
            .scripts
            .lock()
            .unwrap()
            .iter()
            .find(|(id, _)| *id == webhook_id)
            .map(|(_, s)| *s)
            .unwrap_or(SendScript::Ok);

        match script {
            SendScript::Ok => DeliveryOutcome::ok(),
            SendScript::Fail(kind) => DeliveryOutcome::failed(kind, "scripted failure"),
            SendScript::FailThenOk(kind, failures) => {
                if calls_so_far < failures {
                    DeliveryOutcome::failed(kind, "scripted transient failure")
                } else {
                    DeliveryOutcome::ok()
                }
            }
        }
    }

    async fn test_delivery(&self, _url: &str) -> DeliveryOutcome {
        self.test_call_count.fetch_add(1, Ordering::SeqCst);
        match self.test_outcome {
            None => DeliveryOutcome::ok(),
            Some(kind) => DeliveryOutcome::failed(kind, "scripted test failure"),
        }
    }
}

pub(crate) struct FixedVerifier(pub bool);

#[async_trait]
impl HumanVerifier for FixedVerifier {
    async fn verify(&self, _token: &str) -> Result<bool> {
        Ok(self.0)
    }
}

pub(crate) struct StaticSource {
    batches: Mutex<Vec<Result<Vec<Notice>>>>,
    pub fetch_count: AtomicUsize,
}

impl StaticSource {
    /// Batches are served oldest-first; the last batch repeats once the
    /// script runs out.
    pub fn new(batches: Vec<Result<Vec<Notice>>>) -> Self {
        let mut batches = batches;
        batches.reverse();
        Self {
            batches: Mutex::new(batches),
            fetch_count: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl NoticeSource for StaticSource {
    async fn fetch_latest(&self) -> Result<Vec<Notice>> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        let mut batches = self.batches.lock().unwrap();
        if batches.len() > 1 {
            return batches.pop().expect("non-empty");
        }
        match batches.last() {
            Some(Ok(notices)) => Ok(notices.clone()),
            Some(Err(_)) => Err(errors::CrawlError::EmptyIndex.into()),
            None => Ok(Vec::new()),
        }
    }
}

pub(crate) fn notice(num: i64) -> Notice {
    Notice::new(
        num,
        format!("공고 {num}"),
        "의원",
        "행정안전위원회",
        format!("https://example.org/{num}"),
    )
}
