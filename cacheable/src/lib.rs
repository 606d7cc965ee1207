pub mod cache_service;

pub use cache_service::backend::CacheBackend;
pub use cache_service::cache_able::CacheAble;
pub use cache_service::local_backend::LocalBackend;
pub use cache_service::redis_backend::RedisBackend;
pub use cache_service::service::CacheService;
