use crate::model::Notice;
use errors::Result;

/// Upstream index of legislative notices. Implementations own their fetch
/// policy (timeouts, retries); a returned error means the whole crawl
/// attempt is unusable and the caller should skip this cycle.
#[async_trait::async_trait]
pub trait NoticeSource: Send + Sync {
    async fn fetch_latest(&self) -> Result<Vec<Notice>>;
}
