//! Reelforge media artifact server: the HTTP + SSE surface wired on top of
//! `reelforge-core`'s scheduling engine.

use std::time::Duration;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use reelforge_server::config::ServerConfig;
use reelforge_server::state::AppState;
use reelforge_server::routes;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reelforge_server=info,reelforge_core=info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::load()?;
    tracing::info!(
        media_root = %config.media_root.display(),
        bind_addr = %config.bind_addr,
        state_dir = %config.state_dir.display(),
        global_max_concurrency = config.runtime.global_max_concurrency,
        "starting reelforge-server"
    );

    let state = AppState::bootstrap(config)?;
    state.scheduler.spawn_loop();
    state.scheduler.wake();

    let bind_addr = state.config.bind_addr;
    let app = routes::build_router(state.clone());
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %bind_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state.clone()))
        .await?;

    Ok(())
}

/// Waits for SIGINT or SIGTERM, then pauses the scheduler, gives running
/// jobs up to `shutdown_grace` to finish cooperating with cancellation, and
/// persists the job store.
async fn shutdown_signal(state: AppState) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install ctrl-c handler");
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
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("shutdown signal received, pausing scheduler");
    state.scheduler.pause();

    let grace = state.config.runtime.shutdown_grace;
    let deadline = tokio::time::Instant::now() + grace;
    while tokio::time::Instant::now() < deadline {
        if state.store.active_job_ids().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    if let Err(err) = state.persist_job_store() {
        tracing::error!(error = %err, "failed to persist job store on shutdown");
    } else {
        tracing::info!("job store persisted, exiting");
    }
}
