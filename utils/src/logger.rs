use chrono::{SecondsFormat, Utc};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::Rotation;
use tracing_log::LogTracer;
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::{util::SubscriberInitExt, EnvFilter};

#[derive(Debug)]
pub enum LogError {
    Io(std::io::Error),
    Init(tracing_appender::rolling::InitError),
}

impl From<std::io::Error> for LogError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<tracing_appender::rolling::InitError> for LogError {
    fn from(err: tracing_appender::rolling::InitError) -> Self {
        Self::Init(err)
    }
}

impl std::fmt::Display for LogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogError::Io(err) => write!(f, "{err}"),
            LogError::Init(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for LogError {}

#[derive(Debug, Clone)]
pub struct LogRecord {
    pub time: String,
    pub level: Level,
    pub module: String,
    pub message: String,
    pub job_id: Option<String>,
    pub webhook_id: Option<i64>,
    pub notice_num: Option<i64>,
    pub category: Option<String>,
    pub retry_count: Option<u32>,
    pub traceback: Option<String>,
}

impl LogRecord {
    fn new(level: Level, module: impl Into<String>, message: impl Into<String>) -> Self {
        let time = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        Self {
            time,
            level,
            module: module.into(),
            message: message.into(),
            job_id: None,
            webhook_id: None,
            notice_num: None,
            category: None,
            retry_count: None,
            traceback: None,
        }
    }
}

pub trait LogSink: Send + Sync {
    fn name(&self) -> &'static str;
    fn min_level(&self) -> Level;
    fn emit(&self, record: &LogRecord) -> Result<(), LogError>;
}

struct LogDispatcher {
    sinks: Vec<Arc<dyn LogSink>>,
}

impl LogDispatcher {
    fn new(sinks: Vec<Arc<dyn LogSink>>) -> Self {
        Self { sinks }
    }

    fn emit(&self, record: LogRecord) {
        for sink in &self.sinks {
            if record.level > sink.min_level() {
                continue;
            }
            if sink.emit(&record).is_err() {
                metrics::counter!("log_sink_errors_total", "sink" => sink.name()).increment(1);
            }
        }
    }
}

struct LogSinkLayer {
    dispatcher: Arc<LogDispatcher>,
}

impl<S> Layer<S> for LogSinkLayer
where
    S: Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let mut visitor = LogVisitor::new();
        event.record(&mut visitor);

        let message = if visitor.message.is_empty() {
            metadata.name().to_string()
        } else {
            visitor.message
        };

        let mut record = LogRecord::new(*metadata.level(), metadata.target(), message);
        record.job_id = visitor.job_id;
        record.webhook_id = visitor.webhook_id;
        record.notice_num = visitor.notice_num;
        record.category = visitor.category;
        record.retry_count = visitor.retry_count;
        record.traceback = visitor.traceback;

        self.dispatcher.emit(record);
    }
}

struct ConsoleSink {
    min_level: Level,
    writer: Mutex<tracing_appender::non_blocking::NonBlocking>,
    _guard: WorkerGuard,
}

impl ConsoleSink {
    fn new(min_level: Level) -> Self {
        let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());
        Self {
            min_level,
            writer: Mutex::new(writer),
            _guard: guard,
        }
    }
}

impl LogSink for ConsoleSink {
    fn name(&self) -> &'static str {
        "console"
    }

    fn min_level(&self) -> Level {
        self.min_level
    }

    fn emit(&self, record: &LogRecord) -> Result<(), LogError> {
        let line = format_log_record_text(record);
        if let Ok(mut writer) = self.writer.lock() {
            use std::io::Write;
            writeln!(writer, "{}", line)?;
        }
        metrics::counter!("log_events_total", "sink" => self.name(), "level" => record.level.as_str()).increment(1);
        Ok(())
    }
}

struct FileSink {
    min_level: Level,
    writer: Mutex<tracing_appender::non_blocking::NonBlocking>,
    _guard: WorkerGuard,
}

impl FileSink {
    fn new(path: &Path, min_level: Level, rotation: Rotation) -> Result<Self, LogError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file_prefix = path.file_name().and_then(|n| n.to_str()).unwrap_or("lawhook");
        let file_appender = tracing_appender::rolling::Builder::new()
            .rotation(rotation)
            .filename_prefix(file_prefix)
            .filename_suffix("log")
            .build(path.parent().unwrap_or_else(|| Path::new(".")))?;
        let (writer, guard) = tracing_appender::non_blocking(file_appender);
        Ok(Self {
            min_level,
            writer: Mutex::new(writer),
            _guard: guard,
        })
    }
}

impl LogSink for FileSink {
    fn name(&self) -> &'static str {
        "file"
    }

    fn min_level(&self) -> Level {
        self.min_level
    }

    fn emit(&self, record: &LogRecord) -> Result<(), LogError> {
        let line = format_log_record_text(record);
        if let Ok(mut writer) = self.writer.lock() {
            use std::io::Write;
            writeln!(writer, "{}", line)?;
        }
        metrics::counter!("log_events_total", "sink" => self.name(), "level" => record.level.as_str()).increment(1);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum LogOutputConfig {
    Console {},
    File {
        path: PathBuf,
        rotation: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub enabled: bool,
    pub level: String,
    pub outputs: Vec<LogOutputConfig>,
}

impl LoggerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: impl AsRef<str>) -> Self {
        self.level = level.as_ref().into();
        self
    }

    pub fn with_output(mut self, output: LogOutputConfig) -> Self {
        self.outputs.push(output);
        self
    }

    pub fn for_app(namespace: &str) -> Self {
        let mut config = Self::default();
        config.outputs = vec![
            LogOutputConfig::Console {},
            LogOutputConfig::File {
                path: PathBuf::from("logs").join(format!("lawhook.{namespace}.log")),
                rotation: Some("daily".to_string()),
            },
        ];
        config
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: DEFAULT_APP_LOG_LEVEL.to_string(),
            outputs: vec![LogOutputConfig::Console {}],
        }
    }
}

const DEFAULT_APP_LOG_LEVEL: &str = "info,engine=debug,sqlx=warn,sea_orm=warn";

static LOGGER_INITIALIZED: AtomicBool = AtomicBool::new(false);

pub fn is_logging_disabled() -> bool {
    let value = env::var("DISABLE_LOGS")
        .or_else(|_| env::var("LAWHOOK_DISABLE_LOGS"))
        .unwrap_or_default();
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}

pub async fn init_app_logger(namespace: &str) -> Result<bool, Box<dyn std::error::Error>> {
    if is_logging_disabled() {
        return Ok(false);
    }

    let config = LoggerConfig::for_app(namespace);
    init_logger(config).await?;
    Ok(true)
}

pub async fn init_logger(config: LoggerConfig) -> Result<(), Box<dyn std::error::Error>> {
    if is_logging_disabled() {
        let _ = LOGGER_INITIALIZED.swap(true, Ordering::SeqCst);
        return Ok(());
    }
    if LOGGER_INITIALIZED.swap(true, Ordering::SeqCst) {
        tracing::warn!("Logger already initialized, skipping re-initialization");
        return Ok(());
    }

    let _ = LogTracer::builder()
        .with_max_level(log::LevelFilter::Trace)
        .init();

    let configured_filter = normalize_filter_string(&config.level);
    let filter = if configured_filter != DEFAULT_APP_LOG_LEVEL {
        EnvFilter::try_new(&configured_filter).unwrap_or_else(|_| EnvFilter::new("info"))
    } else {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&configured_filter))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let sinks = build_sinks(&config)?;
    let dispatcher = Arc::new(LogDispatcher::new(sinks));
    let layer = LogSinkLayer { dispatcher };

    let _ = tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init();

    Ok(())
}

fn build_sinks(config: &LoggerConfig) -> Result<Vec<Arc<dyn LogSink>>, LogError> {
    if !config.enabled {
        return Ok(Vec::new());
    }

    let mut sinks: Vec<Arc<dyn LogSink>> = Vec::new();
    let base_level = base_level_from_filter(&config.level).unwrap_or(Level::INFO);

    for output in &config.outputs {
        match output {
            LogOutputConfig::Console {} => {
                sinks.push(Arc::new(ConsoleSink::new(base_level)));
            }
            LogOutputConfig::File { path, rotation } => {
                let rotation = match rotation.as_deref() {
                    Some("daily") | None => Rotation::DAILY,
                    Some("hourly") => Rotation::HOURLY,
                    Some("never") => Rotation::NEVER,
                    Some("minutely") => Rotation::MINUTELY,
                    _ => Rotation::DAILY,
                };
                sinks.push(Arc::new(FileSink::new(path.as_path(), base_level, rotation)?));
            }
        }
    }

    Ok(sinks)
}

fn normalize_filter_string(filter: &str) -> String {
    let trimmed = filter.trim();
    if trimmed.contains('=') || trimmed.contains(',') {
        return trimmed.to_string();
    }
    let lower = trimmed.to_lowercase();
    let normalized = match lower.as_str() {
        "all" => "trace",
        "fatal" => "error",
        "warning" => "warn",
        other => other,
    };
    build_allowlist_filter(normalized)
}

fn build_allowlist_filter(level: &str) -> String {
    format!(
        "off,cacheable={level},common={level},delivery={level},engine={level},errors={level},lawhook={level},utils={level},sqlx=warn,sea_orm=warn"
    )
}

fn base_level_from_filter(level: &str) -> Option<Level> {
    let candidate = level
        .split(',')
        .next()
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())?;
    candidate.parse::<Level>().ok()
}

fn format_log_record_text(record: &LogRecord) -> String {
    let mut line = format!(
        "{} [{}] {} - {}",
        record.time, record.level, record.module, record.message
    );

    if let Some(value) = &record.job_id {
        line.push_str(&format!(" job_id={value}"));
    }
    if let Some(value) = &record.webhook_id {
        line.push_str(&format!(" webhook_id={value}"));
    }
    if let Some(value) = &record.notice_num {
        line.push_str(&format!(" notice_num={value}"));
    }
    if let Some(value) = &record.category {
        line.push_str(&format!(" category={value}"));
    }
    if let Some(value) = &record.retry_count {
        line.push_str(&format!(" retry.count={value}"));
    }
    if let Some(value) = &record.traceback {
        line.push_str(&format!(" traceback={value}"));
    }

    line
}

struct LogVisitor {
    message: String,
    job_id: Option<String>,
    webhook_id: Option<i64>,
    notice_num: Option<i64>,
    category: Option<String>,
    retry_count: Option<u32>,
    traceback: Option<String>,
}

impl LogVisitor {
    fn new() -> Self {
        Self {
            message: String::with_capacity(64),
            job_id: None,
            webhook_id: None,
            notice_num: None,
            category: None,
            retry_count: None,
            traceback: None,
        }
    }
}

impl Visit for LogVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            use std::fmt::Write;
            let _ = write!(self.message, "{:?}", value);
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message.push_str(value),
            "job_id" => self.job_id = Some(value.to_string()),
            "category" => self.category = Some(value.to_string()),
            "traceback" => self.traceback = Some(value.to_string()),
            _ => {}
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        match field.name() {
            "webhook_id" => self.webhook_id = Some(value),
            "notice_num" => self.notice_num = Some(value),
            _ => {}
        }
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        match field.name() {
            "retry_count" => self.retry_count = Some(value as u32),
            "webhook_id" => self.webhook_id = Some(value as i64),
            "notice_num" => self.notice_num = Some(value as i64),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::{debug, error, info, warn};

    #[test]
    fn test_logger_config_builder() {
        let config = LoggerConfig::new()
            .with_level("debug")
            .with_output(LogOutputConfig::Console {});

        assert_eq!(config.level, "debug");
        assert!(!config.outputs.is_empty());
    }

    #[test]
    fn test_allowlist_filter_includes_workspace_crates() {
        let filter = normalize_filter_string("debug");
        assert!(filter.contains("engine=debug"));
        assert!(filter.contains("sea_orm=warn"));
    }

    #[test]
    fn test_record_formatting_appends_domain_fields() {
        let mut record = LogRecord::new(Level::WARN, "engine::dispatch", "delivery failed");
        record.webhook_id = Some(42);
        record.category = Some("NOT_FOUND".to_string());

        let line = format_log_record_text(&record);
        assert!(line.contains("webhook_id=42"));
        assert!(line.contains("category=NOT_FOUND"));
    }

    #[tokio::test]
    async fn test_log_levels() {
        let config = LoggerConfig::new().with_level("debug");
        let _ = init_logger(config).await;

        debug!("Debug message");
        info!("Info message");
        warn!("Warning message");
        error!("Error message");
    }
}
