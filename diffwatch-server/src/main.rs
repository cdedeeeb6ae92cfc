//! Process entry point: load config, open the store, wire collaborators,
//! spawn the scheduler, serve the HTTP API. Grounded on the teacher's
//! `main.rs` startup sequence (config → database → services → router →
//! `axum::serve`), trimmed of the media-server-specific services (TLS,
//! websockets, transcoding) this system has no counterpart for.

use std::sync::Arc;

use diffwatch_core::{ReqwestFetcher, Scheduler, SenderRegistry, SqliteStore, SystemClock};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use diffwatch_server::senders::MailgunSender;
use diffwatch_server::{AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!(environment = %config.environment, "starting diffwatch");

    let store = SqliteStore::connect(&config.database_url).await?;
    store.migrate().await?;
    let store: Arc<dyn diffwatch_core::Store> = Arc::new(store);

    let fetcher: Arc<dyn diffwatch_core::Fetcher> = Arc::new(ReqwestFetcher::new());

    let mut registry = SenderRegistry::new();
    if let (Some(api_key), Some(domain), Some(from)) = (
        config.mailgun_api_key.clone(),
        config.mailgun_domain.clone(),
        config.mailgun_sender_from.clone(),
    ) {
        let timeout = std::time::Duration::from_secs(config.mailgun_timeout_secs);
        let mailgun = MailgunSender::new(api_key, domain, from, timeout)?;
        registry.register("email", Arc::new(mailgun));
    } else {
        tracing::warn!("MAILGUN_API_KEY/MAILGUN_DOMAIN/MAILGUN_SENDER_FROM unset, no email sender registered");
    }
    let senders = Arc::new(registry);

    let scheduler = Arc::new(Scheduler::new(
        store.clone(),
        fetcher.clone(),
        senders.clone(),
        config.scheduler_config(),
    ));

    let state = AppState {
        store,
        fetcher,
        senders,
        config: Arc::new(config.clone()),
    };

    let cancel = CancellationToken::new();

    let clock = Arc::new(SystemClock::new(config.wakeup_interval, config.chase_interval));
    let scheduler_handle = {
        let scheduler = scheduler.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { scheduler.run(clock, cancel).await })
    };

    let app = diffwatch_server::router(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.server_port)).await?;
    tracing::info!(port = config.server_port, "listening");

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal(cancel.clone()));

    if let Err(error) = server.await {
        tracing::error!(%error, "server error");
    }

    cancel.cancel();
    let _ = scheduler_handle.await;

    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
    cancel.cancel();
}
