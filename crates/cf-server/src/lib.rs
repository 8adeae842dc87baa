//! cf-server: HTTP API for uploading, compiling and streaming videos.
//!
//! This crate ties the store, upload sessions and the `cf-av` compile
//! actions into a running server. It provides:
//!
//! - Byte-range delivery of stored videos
//! - Chunked and multipart uploads with per-session staging
//! - Transcription of stored videos and transcript publishing
//! - A background reaper for abandoned upload sessions
//! - Graceful shutdown via signal handling

pub mod context;
pub mod error;
pub mod ingest;
pub mod middleware;
pub mod queue;
pub mod router;
pub mod routes;
pub mod sessions;
pub mod store;
pub mod transcription;

use std::net::SocketAddr;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use cf_core::config::{Config, ToolsConfig};

use crate::context::AppContext;

/// How often expired upload sessions are looked for.
const REAPER_INTERVAL: Duration = Duration::from_secs(60);

/// Start the clipforge server.
///
/// Prepares the storage root, discovers external tools, spawns the session
/// reaper and serves HTTP until a shutdown signal is received.
pub async fn start(config: Config) -> cf_core::Result<()> {
    for warning in config.validate() {
        tracing::warn!("Config warning: {warning}");
    }

    let tools = discover_tools(&config.tools).await?;
    let ctx = AppContext::from_config(config, tools);
    ctx.store.ensure_root().await?;
    tracing::info!("Storing videos in {}", ctx.store.root().display());

    let addr: SocketAddr = format!("{}:{}", ctx.config.server.host, ctx.config.server.port)
        .parse()
        .map_err(|e| cf_core::Error::Internal(format!("Invalid server address: {e}")))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| cf_core::Error::Internal(format!("Failed to bind to {addr}: {e}")))?;

    serve(listener, ctx, CancellationToken::new()).await
}

/// Locate external tools and log what was found.
///
/// PATH lookup and version checks spawn processes synchronously, so both run
/// on the blocking pool.
async fn discover_tools(config: &ToolsConfig) -> cf_core::Result<cf_av::ToolRegistry> {
    let config = config.clone();
    let (tools, infos) = tokio::task::spawn_blocking(move || {
        let tools = cf_av::ToolRegistry::discover(&config);
        let infos = tools.check_all();
        (tools, infos)
    })
    .await
    .map_err(|e| cf_core::Error::Internal(format!("spawn_blocking join error: {e}")))?;

    for info in infos {
        if info.available {
            tracing::info!(
                "Tool found: {} ({})",
                info.name,
                info.version.as_deref().unwrap_or("unknown version")
            );
        } else {
            tracing::warn!("Tool not found: {}", info.name);
        }
    }
    Ok(tools)
}

/// Serve the application on an already-bound listener until `cancel` fires
/// or a shutdown signal arrives.
pub async fn serve(
    listener: tokio::net::TcpListener,
    ctx: AppContext,
    cancel: CancellationToken,
) -> cf_core::Result<()> {
    let reaper_handle = tokio::spawn(sessions::run_reaper(
        ctx.sessions.clone(),
        REAPER_INTERVAL,
        cancel.clone(),
    ));

    let app = router::build_router(ctx);

    if let Ok(addr) = listener.local_addr() {
        tracing::info!("Starting server on {addr}");
    }

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await
        .map_err(|e| cf_core::Error::Internal(format!("Server error: {e}")));

    // Stop background tasks.
    cancel.cancel();
    let _ = reaper_handle.await;

    tracing::info!("Server shutdown complete");
    result
}

/// Wait for a shutdown signal (SIGINT or SIGTERM) or cancellation.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = cancel.cancelled() => {}
    }

    tracing::info!("Shutdown signal received");
}
