use crate::model::config::Config;

use cacheable::CacheService;
use log::{info, warn};
use std::sync::Arc;
use tokio::sync::RwLock;
use utils::connector::{create_redis_pool, sqlite_connection};
use utils::rate_limit::DispatchRateLimiter;

#[derive(Clone)]
pub struct State {
    pub db: Arc<sea_orm::DatabaseConnection>,
    pub config: Arc<RwLock<Config>>,
    pub cache_service: Arc<CacheService>,
    pub limiter: Arc<DispatchRateLimiter>,
}

impl State {
    pub async fn new(path: &str) -> Self {
        let config = Config::load(path).expect("failed to parse config.toml");
        Self::from_config(config).await
    }

    pub async fn from_config(config: Config) -> Self {
        let db = Arc::new(
            sqlite_connection(&config.db.path)
                .await
                .expect("Failed to open sqlite database"),
        );
        info!("SQLite database connected successfully");

        let cache_pool = match &config.redis {
            Some(redis) => {
                let pool = create_redis_pool(&redis.url);
                if pool.is_none() {
                    warn!("Redis configured but pool creation failed; falling back to local cache");
                }
                pool
            }
            None => None,
        };

        let cache_service = Arc::new(CacheService::new(
            cache_pool,
            config.cache_namespace(),
            None,
        ));
        match cache_service.ping().await {
            Ok(()) => info!("Cache backend reachable"),
            Err(e) => warn!("Cache backend unreachable at startup, running best-effort: {e}"),
        }

        let limiter = Arc::new(DispatchRateLimiter::new(
            Arc::clone(&cache_service),
            config.limits.global_per_second,
            config.limits.per_webhook_per_minute,
        ));

        State {
            db,
            config: Arc::new(RwLock::new(config)),
            cache_service,
            limiter,
        }
    }
}
