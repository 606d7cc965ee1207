use crate::api::router::router;
use crate::api::state::ApiState;
use crate::batch::{BatchExecutor, BatchOptions};
use crate::cleanup::WebhookJanitor;
use crate::dispatch::DispatchCoordinator;
use crate::notice::cache::NoticeCache;
use crate::scheduler::CrawlScheduler;
use crate::webhook::repository::SqlWebhookRepository;
use crate::webhook::service::RegistrationService;
use common::interface::{HumanVerifier, NoticeSource, WebhookStore};
use common::State;
use delivery::Deliverer;
use errors::Result;
use log::{error, info, warn};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Owns the component graph and its lifecycle.
///
/// Startup order: repository schema → cache warm → schedulers armed; no
/// tick dispatches until the cache is initialized. Shutdown first gates
/// the executor so no new batches are accepted, then drains in-flight
/// batches up to the configured grace, then signals every loop.
pub struct Engine {
    state: Arc<State>,
    store: Arc<dyn WebhookStore>,
    executor: Arc<BatchExecutor>,
    scheduler: Arc<CrawlScheduler>,
    janitor: Arc<WebhookJanitor>,
    registration: Arc<RegistrationService>,
    cache: Arc<NoticeCache>,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_grace: Duration,
    prometheus_handle: Option<PrometheusHandle>,
}

impl Engine {
    pub async fn new(
        state: Arc<State>,
        source: Arc<dyn NoticeSource>,
        verifier: Arc<dyn HumanVerifier>,
        client: Arc<dyn Deliverer>,
    ) -> Result<Self> {
        // Ignore the error if a recorder is already installed (tests).
        let prometheus_handle = PrometheusBuilder::new().install_recorder().ok();

        let cfg = state.config.read().await.clone();

        let repository = Arc::new(SqlWebhookRepository::new(Arc::clone(&state.db)));
        repository.ensure_schema().await?;
        let store: Arc<dyn WebhookStore> = repository;

        let executor = Arc::new(BatchExecutor::new());
        let dispatcher = Arc::new(DispatchCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&client),
            Arc::clone(&executor),
            BatchOptions::from(&cfg.dispatch),
        ));

        let cache = Arc::new(NoticeCache::new(Arc::clone(&state.cache_service)));
        let scheduler = Arc::new(CrawlScheduler::new(
            Arc::clone(&cache),
            source,
            dispatcher,
            Arc::clone(&executor),
            Duration::from_secs(cfg.crawl.interval_secs),
        ));

        let janitor = Arc::new(WebhookJanitor::new(Arc::clone(&store), &cfg.cleanup)?);

        let registration = Arc::new(RegistrationService::new(
            Arc::clone(&store),
            verifier,
            client,
            cfg.limits.max_active_webhooks,
        ));

        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            state,
            store,
            executor,
            scheduler,
            janitor,
            registration,
            cache,
            shutdown_tx,
            shutdown_grace: Duration::from_secs(cfg.dispatch.shutdown_grace_secs),
            prometheus_handle,
        })
    }

    /// Warms the cache and arms the schedulers. A failed warm-up is not
    /// fatal; the crawl scheduler keeps retrying initialization per tick.
    pub async fn start(&self) {
        if let Err(e) = self.scheduler.initialize_cache().await {
            error!("Cache warm-up failed, scheduler will retry on its ticks: {e}");
        }

        Arc::clone(&self.scheduler).start(self.shutdown_tx.subscribe());
        Arc::clone(&self.janitor).start(&self.shutdown_tx);
        info!("Engine started");
    }

    /// Binds the API server and serves it on a background task.
    pub async fn start_api(&self, port: u16) {
        let frontend_origins = self.state.config.read().await.api.frontend_origins.clone();
        let api_state = ApiState {
            state: Arc::clone(&self.state),
            registration: Arc::clone(&self.registration),
            cache: Arc::clone(&self.cache),
            executor: Arc::clone(&self.executor),
            store: Arc::clone(&self.store),
            prometheus_handle: self.prometheus_handle.clone(),
        };

        tokio::spawn(async move {
            let app = router(api_state, &frontend_origins);
            let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
            let listener = match tokio::net::TcpListener::bind(addr).await {
                Ok(listener) => {
                    info!("API server listening on {addr}");
                    listener
                }
                Err(e) => {
                    error!("Failed to bind API server to {addr}: {e}");
                    std::process::exit(1);
                }
            };
            match axum::serve(listener, app.into_make_service()).await {
                Ok(()) => info!("API server stopped gracefully"),
                Err(e) => error!("API server error: {e}"),
            }
        });
    }

    /// Graceful shutdown: refuse new batches, drain in-flight work within
    /// the grace ceiling, then stop every background loop.
    pub async fn shutdown(&self) {
        info!("Shutting down engine");
        self.executor.begin_shutdown();

        if !self.executor.drain(self.shutdown_grace).await {
            warn!(
                "In-flight batches did not finish within {:?}; force-clearing job table",
                self.shutdown_grace
            );
            self.executor.force_clear();
        }

        let _ = self.shutdown_tx.send(());
        info!("Engine shutdown completed");
    }

    /// Immediate shutdown without draining.
    pub fn force_shutdown(&self) {
        self.executor.begin_shutdown();
        self.executor.force_clear();
        let _ = self.shutdown_tx.send(());
    }

    pub fn executor(&self) -> &Arc<BatchExecutor> {
        &self.executor
    }

    pub fn cache(&self) -> &Arc<NoticeCache> {
        &self.cache
    }

    pub fn store(&self) -> &Arc<dyn WebhookStore> {
        &self.store
    }
}
