//! paypipe-webhooks - webhook intake server

use anyhow::Result;
use paypipe_common::config::Settings;
use paypipe_common::logging::{init_logging, LogConfig};
use paypipe_common::storage;
use paypipe_server::webhook::WebhookHandler;
use paypipe_server::{create_router, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let log_config = LogConfig::builder()
        .log_file_prefix("paypipe-webhooks".to_string())
        .filter_directives("paypipe_server=info,tower_http=info".to_string())
        .build();

    // Environment variables take precedence
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);
    let _log_guard = init_logging(&log_config)?;

    let settings = Settings::from_env()?;
    info!(env = %settings.pipeline_env, "Starting webhook server");

    let store = storage::open_store(&settings).await?;
    let state = AppState {
        handler: Arc::new(WebhookHandler::new(store, settings.webhook.clone())),
    };
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", settings.webhook.host, settings.webhook.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting graceful shutdown"),
        _ = terminate => info!("Received terminate signal, starting graceful shutdown"),
    }
}
