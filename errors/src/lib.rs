pub mod error;

pub use error::{
    BatchError, BoxError, CacheError, ConfigError, CrawlError, DeliveryError, Error, ErrorKind,
    RateLimitError, RepositoryError, Result, ValidationError, VerifyError,
};
