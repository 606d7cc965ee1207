pub mod cache;

pub use cache::{CacheMeta, NoticeCache, MAX_CACHE_SIZE};
