use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    Crawl,
    Delivery,
    Cache,
    Repository,
    RateLimit,
    Batch,
    Verify,
    Validation,
    Config,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Crawl => write!(f, "crawl"),
            ErrorKind::Delivery => write!(f, "delivery"),
            ErrorKind::Cache => write!(f, "cache"),
            ErrorKind::Repository => write!(f, "repository"),
            ErrorKind::RateLimit => write!(f, "rate limit"),
            ErrorKind::Batch => write!(f, "batch"),
            ErrorKind::Verify => write!(f, "verify"),
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::Config => write!(f, "config"),
        }
    }
}

pub struct ErrorInner {
    pub kind: ErrorKind,
    pub source: Option<BoxError>,
    pub message: Option<String>,
}

pub struct Error {
    pub inner: Box<ErrorInner>,
}

impl Error {
    pub fn new<E>(kind: ErrorKind, source: Option<E>) -> Error
    where
        E: Into<BoxError>,
    {
        Error {
            inner: Box::new(ErrorInner {
                kind,
                source: source.map(Into::into),
                message: None,
            }),
        }
    }

    pub fn with_message<E>(kind: ErrorKind, message: String, source: Option<E>) -> Error
    where
        E: Into<BoxError>,
    {
        Error {
            inner: Box::new(ErrorInner {
                kind,
                source: source.map(Into::into),
                message: Some(message),
            }),
        }
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.inner.kind
    }

    pub fn is_crawl(&self) -> bool {
        matches!(self.inner.kind, ErrorKind::Crawl)
    }

    pub fn is_delivery(&self) -> bool {
        matches!(self.inner.kind, ErrorKind::Delivery)
    }

    pub fn is_cache(&self) -> bool {
        matches!(self.inner.kind, ErrorKind::Cache)
    }

    pub fn is_repository(&self) -> bool {
        matches!(self.inner.kind, ErrorKind::Repository)
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(self.inner.kind, ErrorKind::RateLimit)
    }

    pub fn is_batch(&self) -> bool {
        matches!(self.inner.kind, ErrorKind::Batch)
    }

    pub fn is_validation(&self) -> bool {
        matches!(self.inner.kind, ErrorKind::Validation)
    }

    pub fn is_timeout(&self) -> bool {
        if let Some(source) = &self.inner.source {
            let msg = source.to_string().to_lowercase();
            msg.contains("timed out") || msg.contains("timeout")
        } else {
            false
        }
    }

    pub fn is_connect(&self) -> bool {
        if let Some(source) = &self.inner.source {
            let msg = source.to_string().to_lowercase();
            msg.contains("connect") || msg.contains("connection")
        } else {
            false
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut f = f.debug_struct("lawhook::Error");
        f.field("kind", &self.inner.kind);
        if let Some(ref message) = self.inner.message {
            f.field("message", message);
        }
        if let Some(ref source) = self.inner.source {
            f.field("source", source);
        }
        f.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref message) = self.inner.message {
            write!(f, "{} error: {}", self.inner.kind, message)?;
        } else {
            write!(f, "{} error", self.inner.kind)?;
        }

        if let Some(ref source) = self.inner.source {
            write!(f, ": {source}")?;
        }

        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner
            .source
            .as_ref()
            .map(|e| &**e as &(dyn StdError + 'static))
    }
}

impl From<CrawlError> for Error {
    fn from(err: CrawlError) -> Self {
        Error::new(ErrorKind::Crawl, Some(err))
    }
}

impl From<DeliveryError> for Error {
    fn from(err: DeliveryError) -> Self {
        Error::new(ErrorKind::Delivery, Some(err))
    }
}

impl From<RepositoryError> for Error {
    fn from(err: RepositoryError) -> Self {
        Error::new(ErrorKind::Repository, Some(err))
    }
}

impl From<RateLimitError> for Error {
    fn from(err: RateLimitError) -> Self {
        Error::new(ErrorKind::RateLimit, Some(err))
    }
}

impl From<BatchError> for Error {
    fn from(err: BatchError) -> Self {
        Error::new(ErrorKind::Batch, Some(err))
    }
}

impl From<VerifyError> for Error {
    fn from(err: VerifyError) -> Self {
        Error::new(ErrorKind::Verify, Some(err))
    }
}

impl From<ValidationError> for Error {
    fn from(err: ValidationError) -> Self {
        Error::new(ErrorKind::Validation, Some(err))
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::new(ErrorKind::Config, Some(err))
    }
}

impl From<CacheError> for Error {
    fn from(err: CacheError) -> Self {
        Error::new(ErrorKind::Cache, Some(err))
    }
}

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("fetch failed: {0}")]
    FetchFailed(#[source] BoxError),
    #[error("fetch timed out after {0} attempts")]
    Timeout(usize),
    #[error("index parse failed: {0}")]
    Parse(String),
    #[error("empty index")]
    EmptyIndex,
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("invalid webhook url: {0}")]
    InvalidUrl(String),
    #[error("request build failed: {0}")]
    BuildFailed(#[source] BoxError),
    #[error("network error: {0}")]
    Network(#[source] BoxError),
}

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error: {0}")]
    Connection(#[source] BoxError),
    #[error("query execution error: {0}")]
    Query(#[source] BoxError),
    #[error("webhook not found")]
    NotFound,
    #[error("invalid data: {0}")]
    InvalidData(String),
}

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("{0}")]
    Cache(#[source] BoxError),
    #[error("wait time: {0} ms")]
    WaitTime(u64),
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("executor is shutting down")]
    ShuttingDown,
    #[error("job timed out after {0} ms")]
    Timeout(u64),
    #[error("job failed: {0}")]
    JobFailed(#[source] BoxError),
    #[error("job panicked: {0}")]
    JobPanicked(String),
    #[error("unknown job id: {0}")]
    UnknownJob(String),
}

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("verification request failed: {0}")]
    RequestFailed(#[source] BoxError),
    #[error("verification rejected")]
    Rejected,
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("url is not parseable")]
    Unparseable,
    #[error("scheme must be https")]
    SchemeNotHttps,
    #[error("host is not a recognized webhook provider")]
    HostNotAllowed,
    #[error("url exceeds {0} characters")]
    TooLong(usize),
    #[error("webhook path is malformed")]
    MalformedPath,
    #[error("webhook id is malformed")]
    MalformedId,
    #[error("webhook token is malformed")]
    MalformedToken,
    #[error("missing verification token")]
    MissingToken,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[source] BoxError),
    #[error("failed to parse config: {0}")]
    Parse(#[source] BoxError),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Currency of the cacheable crate. Kept standalone so cache users can
/// degrade to best-effort on it without unwrapping the generic `Error`.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] deadpool_redis::redis::RedisError),
    #[error("pool error: {0}")]
    Pool(String),
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut => Error::new(ErrorKind::Crawl, Some(err)),
            _ => Error::new(ErrorKind::Config, Some(err)),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::new(ErrorKind::Cache, Some(err))
    }
}

impl Error {
    pub fn crawl_timeout(attempts: usize) -> Self {
        Error::from(CrawlError::Timeout(attempts))
    }

    pub fn shutting_down() -> Self {
        Error::from(BatchError::ShuttingDown)
    }

    pub fn repository_not_found() -> Self {
        Error::from(RepositoryError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::crawl_timeout(3);
        assert!(err.is_crawl());
        assert!(err.is_timeout());
    }

    #[test]
    fn test_error_display() {
        let err = Error::repository_not_found();
        assert_eq!(err.to_string(), "repository error: webhook not found");
    }

    #[test]
    fn test_error_source() {
        let io_err = std::io::Error::new(std::io::ErrorKind::TimedOut, "connection timed out");
        let err = Error::from(io_err);
        assert!(err.source().is_some());
    }

    #[test]
    fn test_error_kinds() {
        let err = Error::shutting_down();
        assert!(err.is_batch());
        assert!(!err.is_crawl());

        let err = Error::from(ValidationError::SchemeNotHttps);
        assert!(err.is_validation());
    }
}
