use crate::batch::BatchExecutor;
use crate::notice::cache::NoticeCache;
use crate::webhook::service::RegistrationService;
use common::interface::WebhookStore;
use common::State;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

#[derive(Clone)]
pub struct ApiState {
    pub state: Arc<State>,
    pub registration: Arc<RegistrationService>,
    pub cache: Arc<NoticeCache>,
    pub executor: Arc<BatchExecutor>,
    pub store: Arc<dyn WebhookStore>,
    pub prometheus_handle: Option<PrometheusHandle>,
}
