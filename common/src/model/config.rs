use errors::{ConfigError, Result};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ApiConfig {
    pub port: u16,
    #[serde(default)]
    pub frontend_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: 3001,
            frontend_origins: Vec::new(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DbConfig {
    pub path: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: "data/lawhook.db".to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
    pub key_prefix: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CrawlConfig {
    pub list_url: String,
    #[serde(default = "default_crawl_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_crawl_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_crawl_retries")]
    pub retries: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_crawl_interval_secs() -> u64 {
    600
}
fn default_crawl_timeout_secs() -> u64 {
    15
}
fn default_crawl_retries() -> usize {
    3
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (compatible; lawhook/1.0; +https://github.com/lawhook)".to_string()
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DispatchConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_job_timeout_ms")]
    pub job_timeout_ms: u64,
    #[serde(default = "default_retry_count")]
    pub retry_count: usize,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            job_timeout_ms: default_job_timeout_ms(),
            retry_count: default_retry_count(),
            retry_delay_ms: default_retry_delay_ms(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

fn default_concurrency() -> usize {
    10
}
fn default_job_timeout_ms() -> u64 {
    30_000
}
fn default_retry_count() -> usize {
    3
}
fn default_retry_delay_ms() -> u64 {
    1_000
}
fn default_shutdown_grace_secs() -> u64 {
    25
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LimitConfig {
    #[serde(default = "default_global_per_second")]
    pub global_per_second: u32,
    #[serde(default = "default_per_webhook_per_minute")]
    pub per_webhook_per_minute: u32,
    #[serde(default = "default_max_active_webhooks")]
    pub max_active_webhooks: u64,
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            global_per_second: default_global_per_second(),
            per_webhook_per_minute: default_per_webhook_per_minute(),
            max_active_webhooks: default_max_active_webhooks(),
        }
    }
}

fn default_global_per_second() -> u32 {
    30
}
fn default_per_webhook_per_minute() -> u32 {
    60
}
fn default_max_active_webhooks() -> u64 {
    100
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CleanupConfig {
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_daily_cron")]
    pub daily_cron: String,
    #[serde(default = "default_optimize_cron")]
    pub optimize_cron: String,
    #[serde(default = "default_monitor_cron")]
    pub monitor_cron: String,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            daily_cron: default_daily_cron(),
            optimize_cron: default_optimize_cron(),
            monitor_cron: default_monitor_cron(),
        }
    }
}

fn default_timezone() -> String {
    "Asia/Seoul".to_string()
}
fn default_daily_cron() -> String {
    "0 0 0 * * *".to_string()
}
fn default_optimize_cron() -> String {
    "0 0 2 * * *".to_string()
}
fn default_monitor_cron() -> String {
    "0 0 * * * *".to_string()
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct RecaptchaConfig {
    pub secret_key: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    pub name: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub db: DbConfig,
    pub redis: Option<RedisConfig>,
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub limits: LimitConfig,
    #[serde(default)]
    pub cleanup: CleanupConfig,
    #[serde(default)]
    pub recaptcha: RecaptchaConfig,
    pub log_level: Option<String>,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let config_str =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.into()))?;
        let mut config: Config =
            toml::from_str(&config_str).map_err(|e| ConfigError::Parse(e.into()))?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Deploy-time environment variables take precedence over the file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(port) = std::env::var("PORT") {
            if let Ok(port) = port.parse() {
                self.api.port = port;
            }
        }
        if let Ok(path) = std::env::var("DATABASE_PATH") {
            self.db.path = path;
        }
        if let Ok(url) = std::env::var("REDIS_URL") {
            match &mut self.redis {
                Some(redis) => redis.url = url,
                None => {
                    self.redis = Some(RedisConfig {
                        url,
                        key_prefix: None,
                    })
                }
            }
        }
        if let Ok(prefix) = std::env::var("REDIS_KEY_PREFIX") {
            if let Some(redis) = &mut self.redis {
                redis.key_prefix = Some(prefix);
            }
        }
        if let Ok(secret) = std::env::var("RECAPTCHA_SECRET_KEY") {
            self.recaptcha.secret_key = Some(secret);
        }
        if let Ok(origins) = std::env::var("FRONTEND_URL") {
            self.api.frontend_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Ok(tz) = std::env::var("CRON_TIMEZONE") {
            self.cleanup.timezone = tz;
        }
    }

    /// Cache/limiter namespace: explicit key prefix wins, app name otherwise.
    pub fn cache_namespace(&self) -> String {
        self.redis
            .as_ref()
            .and_then(|r| r.key_prefix.clone())
            .unwrap_or_else(|| self.name.clone())
    }
}
