use crate::model::entity::webhook;
use crate::model::{BulkOutcome, WebhookStats};
use errors::Result;

/// Durable endpoint store. The single source of truth for endpoint state;
/// everything above it (dispatch hints, caches) is advisory.
///
/// URLs passed in are canonicalized by implementations; uniqueness is
/// enforced on the canonical form across active and soft-deleted rows.
#[async_trait::async_trait]
pub trait WebhookStore: Send + Sync {
    /// Revives a soft-deleted row for the same canonical URL instead of
    /// inserting a duplicate; an already-active row is returned as-is.
    async fn create_or_reactivate(&self, url: &str) -> Result<webhook::Model>;

    async fn find_active(&self) -> Result<Vec<webhook::Model>>;

    async fn find_by_id(&self, id: i64) -> Result<Option<webhook::Model>>;

    async fn find_by_url(&self, url: &str) -> Result<Option<webhook::Model>>;

    /// Soft delete. Fails with `RepositoryError::NotFound` for unknown ids.
    async fn deactivate(&self, id: i64) -> Result<()>;

    /// Physical removal, chunked internally. Returns rows deleted.
    async fn delete_permanent(&self, ids: &[i64]) -> Result<u64>;

    /// Physically deletes rows inactive for longer than `age_days`.
    async fn cleanup_older_inactive(&self, age_days: i64) -> Result<u64>;

    /// Physically deletes every inactive row.
    async fn delete_all_inactive(&self) -> Result<u64>;

    async fn stats(&self) -> Result<WebhookStats>;

    async fn bulk_create(&self, urls: &[String]) -> Result<BulkOutcome>;

    async fn count_active(&self) -> Result<u64>;
}
