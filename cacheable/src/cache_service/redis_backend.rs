use super::backend::CacheBackend;
use deadpool_redis::redis::AsyncCommands;
use deadpool_redis::Pool;
use errors::CacheError;
use std::time::Duration;

pub struct RedisBackend {
    pool: Pool,
}

impl RedisBackend {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CacheBackend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut conn = self.pool.get().await.map_err(|e| CacheError::Pool(e.to_string()))?;
        let result: Option<Vec<u8>> = conn.get(key).await.map_err(CacheError::Redis)?;
        Ok(result)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), CacheError> {
        let mut conn = self.pool.get().await.map_err(|e| CacheError::Pool(e.to_string()))?;
        if let Some(duration) = ttl {
            let _: () = conn
                .set_ex(key, value, duration.as_secs().max(1))
                .await
                .map_err(CacheError::Redis)?;
        } else {
            let _: () = conn.set(key, value).await.map_err(CacheError::Redis)?;
        }
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.pool.get().await.map_err(|e| CacheError::Pool(e.to_string()))?;
        conn.del(key).await.map_err(CacheError::Redis)
    }

    async fn del_batch(&self, keys: &[&str]) -> Result<u64, CacheError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.pool.get().await.map_err(|e| CacheError::Pool(e.to_string()))?;

        let mut pipe = deadpool_redis::redis::pipe();
        for key in keys {
            pipe.del(*key);
        }

        let results: Vec<i64> = pipe.query_async(&mut conn).await.map_err(CacheError::Redis)?;
        Ok(results.iter().sum::<i64>() as u64)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        self.keys_with_limit(pattern, usize::MAX).await
    }

    async fn keys_with_limit(&self, pattern: &str, limit: usize) -> Result<Vec<String>, CacheError> {
        let mut conn = self.pool.get().await.map_err(|e| CacheError::Pool(e.to_string()))?;

        let mut keys: Vec<String> = Vec::new();
        let mut cursor: u64 = 0;
        let scan_count = std::cmp::min(limit, 1000);

        loop {
            let (new_cursor, batch): (u64, Vec<String>) = deadpool_redis::redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(scan_count)
                .query_async(&mut conn)
                .await
                .map_err(CacheError::Redis)?;

            for key in batch {
                if keys.len() >= limit {
                    return Ok(keys);
                }
                keys.push(key);
            }

            cursor = new_cursor;
            if cursor == 0 {
                break;
            }
        }
        Ok(keys)
    }

    async fn set_nx(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<bool, CacheError> {
        let mut conn = self.pool.get().await.map_err(|e| CacheError::Pool(e.to_string()))?;

        let result: Option<String> = if let Some(ttl) = ttl {
            deadpool_redis::redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("NX")
                .arg("EX")
                .arg(ttl.as_secs().max(1))
                .query_async(&mut conn)
                .await
                .map_err(CacheError::Redis)?
        } else {
            deadpool_redis::redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("NX")
                .query_async(&mut conn)
                .await
                .map_err(CacheError::Redis)?
        };
        Ok(result.is_some())
    }

    async fn mget(&self, keys: &[&str]) -> Result<Vec<Option<Vec<u8>>>, CacheError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.pool.get().await.map_err(|e| CacheError::Pool(e.to_string()))?;

        let values: Vec<Option<Vec<u8>>> = deadpool_redis::redis::cmd("MGET")
            .arg(keys)
            .query_async(&mut conn)
            .await
            .map_err(CacheError::Redis)?;
        Ok(values)
    }

    async fn incr(&self, key: &str, delta: i64) -> Result<i64, CacheError> {
        let mut conn = self.pool.get().await.map_err(|e| CacheError::Pool(e.to_string()))?;

        deadpool_redis::redis::cmd("INCRBY")
            .arg(key)
            .arg(delta)
            .query_async(&mut conn)
            .await
            .map_err(CacheError::Redis)
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.pool.get().await.map_err(|e| CacheError::Pool(e.to_string()))?;
        let _: String = deadpool_redis::redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(CacheError::Redis)?;
        Ok(())
    }
}
