//! SyncBridge - source to target synchronization service
//!
//! Main entry point for the HTTP service.

use std::sync::Arc;

use anyhow::Context;
use syncbridge_app::utils::logging::init_tracing;
use syncbridge_app::{router, AppContext};
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = syncbridge_infra::config::load().context("failed to load configuration")?;
    init_tracing(&config.logging).context("failed to initialise tracing")?;

    info!(version = env!("CARGO_PKG_VERSION"), "SyncBridge starting...");

    let bind_addr = config.server.bind_addr.clone();
    let ctx = Arc::new(AppContext::new(config).await.context("failed to start services")?);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    info!(addr = %bind_addr, "listening");

    axum::serve(listener, router(ctx.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    ctx.shutdown().await.context("shutdown failed")?;
    info!("SyncBridge stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    info!("shutdown signal received");
}
