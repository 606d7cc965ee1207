use chrono::Utc;
use common::interface::WebhookStore;
use common::model::config::CleanupConfig;
use common::model::WebhookStats;
use cron::Schedule;
use errors::{ConfigError, Result};
use log::{error, info, warn};
use metrics::counter;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Webhook counts above this are only warned about; growth itself is not
/// an error condition.
const TOTAL_WARN_THRESHOLD: u64 = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupAction {
    /// Physically delete inactive rows older than this many days.
    DeleteOlderThan(i64),
    /// Physically delete every inactive row.
    DeleteAllInactive,
}

/// Daily cleanup: always prune 14-day-old inactive rows, tighten to 7 days
/// under 70% efficiency, purge everything inactive under 50%.
pub fn daily_plan(stats: &WebhookStats) -> Vec<CleanupAction> {
    let efficiency = stats.efficiency();
    let mut actions = vec![CleanupAction::DeleteOlderThan(14)];
    if efficiency < 70.0 {
        actions.push(CleanupAction::DeleteOlderThan(7));
    }
    if efficiency < 50.0 {
        actions.push(CleanupAction::DeleteAllInactive);
    }
    actions
}

/// Optimization pass: a mostly-dead table is reset wholesale.
pub fn optimization_plan(stats: &WebhookStats) -> Vec<CleanupAction> {
    if stats.efficiency() < 80.0 && stats.inactive > 0 {
        vec![CleanupAction::DeleteAllInactive]
    } else {
        Vec::new()
    }
}

/// Hourly monitor: emergency purge when the table is large and nearly all
/// dead, otherwise trim a growing backlog of old inactive rows.
pub fn monitor_plan(stats: &WebhookStats) -> Vec<CleanupAction> {
    if stats.efficiency() < 30.0 && stats.total > 100 {
        vec![CleanupAction::DeleteAllInactive]
    } else if stats.old_inactive > 50 {
        vec![CleanupAction::DeleteOlderThan(3)]
    } else {
        Vec::new()
    }
}

pub fn health_grade(efficiency: f64) -> &'static str {
    if efficiency >= 90.0 {
        "excellent"
    } else if efficiency >= 80.0 {
        "good"
    } else if efficiency >= 60.0 {
        "fair"
    } else if efficiency >= 40.0 {
        "poor"
    } else {
        "critical"
    }
}

#[derive(Debug, Clone, Copy)]
enum JanitorTask {
    Daily,
    Optimization,
    Monitor,
}

impl JanitorTask {
    fn name(&self) -> &'static str {
        match self {
            JanitorTask::Daily => "daily",
            JanitorTask::Optimization => "optimization",
            JanitorTask::Monitor => "monitor",
        }
    }
}

/// Adaptive endpoint cleanup on three independent cron schedules, all
/// evaluated in the configured timezone. Each run reads the aggregate
/// stats once and acts on them.
pub struct WebhookJanitor {
    store: Arc<dyn WebhookStore>,
    tz: chrono_tz::Tz,
    daily: Schedule,
    optimization: Schedule,
    monitor: Schedule,
}

impl WebhookJanitor {
    pub fn new(store: Arc<dyn WebhookStore>, cfg: &CleanupConfig) -> Result<Self> {
        let tz: chrono_tz::Tz = cfg
            .timezone
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("unknown timezone {}", cfg.timezone)))?;

        let parse = |expr: &str| {
            Schedule::from_str(expr)
                .map_err(|e| ConfigError::Invalid(format!("bad cron expression {expr}: {e}")))
        };

        Ok(Self {
            store,
            tz,
            daily: parse(&cfg.daily_cron)?,
            optimization: parse(&cfg.optimize_cron)?,
            monitor: parse(&cfg.monitor_cron)?,
        })
    }

    pub fn start(self: Arc<Self>, shutdown_tx: &broadcast::Sender<()>) {
        let tasks = [
            (JanitorTask::Daily, self.daily.clone()),
            (JanitorTask::Optimization, self.optimization.clone()),
            (JanitorTask::Monitor, self.monitor.clone()),
        ];

        for (task, schedule) in tasks {
            let janitor = Arc::clone(&self);
            let mut shutdown_rx = shutdown_tx.subscribe();
            tokio::spawn(async move {
                info!("Webhook janitor schedule '{}' armed", task.name());
                loop {
                    let now = Utc::now().with_timezone(&janitor.tz);
                    let Some(next) = schedule.after(&now).next() else {
                        warn!("Janitor schedule '{}' has no upcoming firing", task.name());
                        break;
                    };
                    let wait = (next - now).to_std().unwrap_or_default();

                    tokio::select! {
                        _ = shutdown_rx.recv() => {
                            info!("Janitor schedule '{}' received shutdown signal", task.name());
                            break;
                        }
                        _ = tokio::time::sleep(wait) => {
                            if let Err(e) = janitor.run(task).await {
                                error!("Janitor {} run failed: {e}", task.name());
                            }
                        }
                    }
                }
            });
        }
    }

    async fn run(&self, task: JanitorTask) -> Result<u64> {
        let stats = self.store.stats().await?;
        let efficiency = stats.efficiency();
        info!(
            "Janitor {} run: {} total, {} active, efficiency {:.1}% ({})",
            task.name(),
            stats.total,
            stats.active,
            efficiency,
            health_grade(efficiency)
        );

        let actions = match task {
            JanitorTask::Daily => daily_plan(&stats),
            JanitorTask::Optimization => {
                if stats.total > TOTAL_WARN_THRESHOLD {
                    warn!(
                        "Webhook table has grown to {} rows; consider raising cleanup cadence",
                        stats.total
                    );
                }
                optimization_plan(&stats)
            }
            JanitorTask::Monitor => {
                let actions = monitor_plan(&stats);
                if actions == vec![CleanupAction::DeleteAllInactive] {
                    error!(
                        "Emergency cleanup: efficiency {:.1}% across {} rows",
                        efficiency, stats.total
                    );
                }
                actions
            }
        };

        self.execute(task, &actions).await
    }

    async fn execute(&self, task: JanitorTask, actions: &[CleanupAction]) -> Result<u64> {
        let mut removed = 0u64;
        for action in actions {
            removed += match action {
                CleanupAction::DeleteOlderThan(days) => {
                    self.store.cleanup_older_inactive(*days).await?
                }
                CleanupAction::DeleteAllInactive => self.store.delete_all_inactive().await?,
            };
        }

        if removed > 0 {
            info!("Janitor {} removed {} webhooks", task.name(), removed);
            counter!("janitor_removed_total", "schedule" => task.name()).increment(removed);
        }
        Ok(removed)
    }
}
