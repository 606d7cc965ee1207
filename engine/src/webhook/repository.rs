use super::canonical::canonicalize_url;
use chrono::Utc;
use common::interface::WebhookStore;
use common::model::entity::prelude::Webhook;
use common::model::entity::webhook;
use common::model::{BulkOutcome, WebhookStats};
use errors::{RepositoryError, Result};
use log::debug;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    FromQueryResult, PaginatorTrait, QueryFilter, QuerySelect, Set, Statement,
};
use std::collections::HashSet;
use std::sync::Arc;

/// Hard deletes run in id chunks to bound statement size.
const DELETE_CHUNK: usize = 500;
/// Age-based cleanup selects ids page-wise before deleting.
const CLEANUP_PAGE: u64 = 1000;

const OLD_INACTIVE_DAYS: i64 = 30;
const RECENT_INACTIVE_DAYS: i64 = 7;

pub struct SqlWebhookRepository {
    db: Arc<DatabaseConnection>,
}

#[derive(Debug, FromQueryResult)]
struct StatsRow {
    total: i64,
    active: Option<i64>,
    old_inactive: Option<i64>,
    recent_inactive: Option<i64>,
}

impl SqlWebhookRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        let backend = self.db.get_database_backend();
        let sql = "CREATE TABLE IF NOT EXISTS webhooks (\
            id INTEGER PRIMARY KEY AUTOINCREMENT, \
            url TEXT NOT NULL UNIQUE, \
            is_active INTEGER NOT NULL DEFAULT 1, \
            description TEXT, \
            created_at TEXT NOT NULL, \
            updated_at TEXT NOT NULL)";
        self.db
            .execute(Statement::from_string(backend, sql))
            .await
            .map_err(|e| RepositoryError::Query(e.into()))?;
        Ok(())
    }

    fn now() -> chrono::NaiveDateTime {
        Utc::now().naive_utc()
    }
}

#[async_trait::async_trait]
impl WebhookStore for SqlWebhookRepository {
    async fn create_or_reactivate(&self, url: &str) -> Result<webhook::Model> {
        let canonical = canonicalize_url(url);

        let existing = Webhook::find()
            .filter(webhook::Column::Url.eq(&canonical))
            .one(self.db.as_ref())
            .await
            .map_err(|e| RepositoryError::Query(e.into()))?;

        match existing {
            Some(row) if row.is_active => Ok(row),
            Some(row) => {
                debug!("Reactivating webhook {} for {}", row.id, canonical);
                let mut model: webhook::ActiveModel = row.into();
                model.is_active = Set(true);
                model.updated_at = Set(Self::now());
                model
                    .update(self.db.as_ref())
                    .await
                    .map_err(|e| RepositoryError::Query(e.into()).into())
            }
            None => {
                let now = Self::now();
                let model = webhook::ActiveModel {
                    url: Set(canonical),
                    is_active: Set(true),
                    description: Set(None),
                    created_at: Set(now),
                    updated_at: Set(now),
                    ..Default::default()
                };
                model
                    .insert(self.db.as_ref())
                    .await
                    .map_err(|e| RepositoryError::Query(e.into()).into())
            }
        }
    }

    async fn find_active(&self) -> Result<Vec<webhook::Model>> {
        Webhook::find()
            .filter(webhook::Column::IsActive.eq(true))
            .all(self.db.as_ref())
            .await
            .map_err(|e| RepositoryError::Query(e.into()).into())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<webhook::Model>> {
        Webhook::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| RepositoryError::Query(e.into()).into())
    }

    async fn find_by_url(&self, url: &str) -> Result<Option<webhook::Model>> {
        let canonical = canonicalize_url(url);
        Webhook::find()
            .filter(webhook::Column::Url.eq(canonical))
            .one(self.db.as_ref())
            .await
            .map_err(|e| RepositoryError::Query(e.into()).into())
    }

    async fn deactivate(&self, id: i64) -> Result<()> {
        let row = self
            .find_by_id(id)
            .await?
            .ok_or(RepositoryError::NotFound)?;

        let mut model: webhook::ActiveModel = row.into();
        model.is_active = Set(false);
        model.updated_at = Set(Self::now());
        model
            .update(self.db.as_ref())
            .await
            .map_err(|e| RepositoryError::Query(e.into()))?;
        Ok(())
    }

    async fn delete_permanent(&self, ids: &[i64]) -> Result<u64> {
        let mut deleted = 0u64;
        for chunk in ids.chunks(DELETE_CHUNK) {
            let res = Webhook::delete_many()
                .filter(webhook::Column::Id.is_in(chunk.iter().copied()))
                .exec(self.db.as_ref())
                .await
                .map_err(|e| RepositoryError::Query(e.into()))?;
            deleted += res.rows_affected;
        }
        Ok(deleted)
    }

    async fn cleanup_older_inactive(&self, age_days: i64) -> Result<u64> {
        let cutoff = Self::now() - chrono::Duration::days(age_days);
        let mut total = 0u64;

        loop {
            let page: Vec<i64> = Webhook::find()
                .select_only()
                .column(webhook::Column::Id)
                .filter(webhook::Column::IsActive.eq(false))
                .filter(webhook::Column::UpdatedAt.lt(cutoff))
                .limit(CLEANUP_PAGE)
                .into_tuple()
                .all(self.db.as_ref())
                .await
                .map_err(|e| RepositoryError::Query(e.into()))?;

            if page.is_empty() {
                break;
            }
            let page_len = page.len() as u64;

            let res = Webhook::delete_many()
                .filter(webhook::Column::Id.is_in(page))
                .exec(self.db.as_ref())
                .await
                .map_err(|e| RepositoryError::Query(e.into()))?;
            total += res.rows_affected;

            if page_len < CLEANUP_PAGE {
                break;
            }
        }

        Ok(total)
    }

    async fn delete_all_inactive(&self) -> Result<u64> {
        let res = Webhook::delete_many()
            .filter(webhook::Column::IsActive.eq(false))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| RepositoryError::Query(e.into()))?;
        Ok(res.rows_affected)
    }

    async fn stats(&self) -> Result<WebhookStats> {
        let backend = self.db.get_database_backend();
        let old_cutoff = Self::now() - chrono::Duration::days(OLD_INACTIVE_DAYS);
        let recent_cutoff = Self::now() - chrono::Duration::days(RECENT_INACTIVE_DAYS);

        let sql = "SELECT COUNT(*) AS total, \
            COALESCE(SUM(CASE WHEN is_active = 1 THEN 1 ELSE 0 END), 0) AS active, \
            COALESCE(SUM(CASE WHEN is_active = 0 AND updated_at < ? THEN 1 ELSE 0 END), 0) AS old_inactive, \
            COALESCE(SUM(CASE WHEN is_active = 0 AND updated_at > ? THEN 1 ELSE 0 END), 0) AS recent_inactive \
            FROM webhooks";

        let row = StatsRow::find_by_statement(Statement::from_sql_and_values(
            backend,
            sql,
            [old_cutoff.into(), recent_cutoff.into()],
        ))
        .one(self.db.as_ref())
        .await
        .map_err(|e| RepositoryError::Query(e.into()))?
        .ok_or_else(|| RepositoryError::InvalidData("empty stats row".to_string()))?;

        let total = row.total.max(0) as u64;
        let active = row.active.unwrap_or(0).max(0) as u64;
        Ok(WebhookStats {
            total,
            active,
            inactive: total.saturating_sub(active),
            old_inactive: row.old_inactive.unwrap_or(0).max(0) as u64,
            recent_inactive: row.recent_inactive.unwrap_or(0).max(0) as u64,
        })
    }

    async fn bulk_create(&self, urls: &[String]) -> Result<BulkOutcome> {
        let mut outcome = BulkOutcome::default();
        let mut seen: HashSet<String> = HashSet::new();

        for url in urls {
            let canonical = canonicalize_url(url);
            if !seen.insert(canonical.clone()) {
                outcome.duplicates += 1;
                continue;
            }

            match self.find_by_url(&canonical).await? {
                Some(row) if row.is_active => outcome.duplicates += 1,
                Some(_) => {
                    self.create_or_reactivate(&canonical).await?;
                    outcome.reactivated += 1;
                }
                None => {
                    self.create_or_reactivate(&canonical).await?;
                    outcome.created += 1;
                }
            }
        }

        Ok(outcome)
    }

    async fn count_active(&self) -> Result<u64> {
        Webhook::find()
            .filter(webhook::Column::IsActive.eq(true))
            .count(self.db.as_ref())
            .await
            .map_err(|e| RepositoryError::Query(e.into()).into())
    }
}
