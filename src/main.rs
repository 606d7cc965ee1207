use common::model::Config;
use common::State;
use delivery::{RecaptchaVerifier, WebhookClient};
use engine::{AssemblyNoticeSource, Engine};
use log::{error, info};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let config_path =
        std::env::var("LAWHOOK_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let config = Config::load(&config_path).expect("failed to parse config.toml");

    {
        let mut logger = utils::logger::LoggerConfig::for_app(&config.name);
        if let Some(level) = &config.log_level {
            logger = logger.with_level(level);
        }
        if let Err(e) = utils::logger::init_logger(logger).await {
            eprintln!("Failed to initialize logger: {e}");
        }
    }

    let port = config.api.port;
    let crawl_cfg = config.crawl.clone();
    let recaptcha_secret = config.recaptcha.secret_key.clone();

    let state = Arc::new(State::from_config(config).await);

    let source = Arc::new(
        AssemblyNoticeSource::new(&crawl_cfg).expect("Failed to build notice source"),
    );
    let verifier = Arc::new(
        RecaptchaVerifier::new(recaptcha_secret).expect("Failed to build verifier"),
    );
    let client = Arc::new(
        WebhookClient::new(Arc::clone(&state.limiter)).expect("Failed to build webhook client"),
    );

    let engine = match Engine::new(Arc::clone(&state), source, verifier, client).await {
        Ok(engine) => engine,
        Err(e) => {
            error!("Engine construction failed: {e}");
            std::process::exit(1);
        }
    };

    engine.start().await;
    engine.start_api(port).await;

    wait_for_signal().await;
    engine.shutdown().await;
    info!("Bye");
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sig) => sig,
        Err(e) => {
            error!("Failed to install SIGTERM handler: {e}");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C, initiating shutdown"),
        _ = sigterm.recv() => info!("Received SIGTERM, initiating shutdown"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Received Ctrl+C, initiating shutdown");
    }
}
