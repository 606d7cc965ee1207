use super::service::CacheService;
use errors::CacheError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Serde-JSON persistence for cache-resident state.
///
/// `field()` names the logical slot; the stored key is
/// `<namespace>:<field>:<id>`, so multiple deployments sharing one Redis
/// stay isolated through the service namespace.
#[async_trait::async_trait]
pub trait CacheAble: Send + Sync + Sized
where
    Self: Serialize + for<'de> Deserialize<'de> + 'static,
{
    fn field() -> impl AsRef<str>;

    fn cache_id(id: &str, sync: &CacheService) -> String {
        format!("{}:{}:{}", sync.namespace, Self::field().as_ref(), id)
    }

    async fn send(&self, id: &str, sync: &CacheService) -> Result<(), CacheError> {
        let key = Self::cache_id(id, sync);
        let content = serde_json::to_vec(self)?;
        sync.backend.set(&key, &content, sync.default_ttl).await?;
        Ok(())
    }

    async fn send_with_ttl(&self, id: &str, sync: &CacheService, ttl: Duration) -> Result<(), CacheError> {
        let key = Self::cache_id(id, sync);
        let content = serde_json::to_vec(self)?;
        sync.backend.set(&key, &content, Some(ttl)).await?;
        Ok(())
    }

    async fn sync(id: &str, sync: &CacheService) -> Result<Option<Self>, CacheError> {
        let key = Self::cache_id(id, sync);
        if let Some(bytes) = sync.backend.get(&key).await? {
            let val = serde_json::from_slice(&bytes).map_err(CacheError::Serde)?;
            Ok(Some(val))
        } else {
            Ok(None)
        }
    }

    async fn delete(id: &str, sync: &CacheService) -> Result<(), CacheError> {
        let key = Self::cache_id(id, sync);
        sync.backend.del(&key).await?;
        Ok(())
    }

    async fn scan(pattern_suffix: &str, sync: &CacheService) -> Result<Vec<String>, CacheError> {
        let pattern = format!("{}:{}:{}", sync.namespace, Self::field().as_ref(), pattern_suffix);
        sync.backend.keys(&pattern).await
    }
}
