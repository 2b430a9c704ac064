//! Process lifecycle: scheduler plus query server, torn down together.

use std::future::Future;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::{AppContext, run_scheduler, serve};

/// Start polling and serving, then run until `shutdown` resolves or the
/// server fails.  Binding the listener happens first so an unusable address
/// is a startup error.
pub async fn run_service<F>(ctx: AppContext, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    let addr = ctx.config.server_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind query server on {addr}"))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    info!(
        url = %ctx.config.source.url,
        store = %ctx.store.path().display(),
        "pagewatch service starting"
    );
    let scheduler = tokio::spawn(run_scheduler(
        ctx.watcher.clone(),
        ctx.poll_interval(),
        shutdown_rx.clone(),
    ));
    let mut server = tokio::spawn(serve(listener, ctx, shutdown_rx));

    let early_exit = tokio::select! {
        _ = shutdown => {
            info!("shutdown requested");
            None
        }
        joined = &mut server => {
            warn!("query server exited unexpectedly");
            Some(joined)
        }
    };

    let _ = shutdown_tx.send(true);
    let server_result = match early_exit {
        Some(joined) => joined,
        None => server.await,
    };
    scheduler.await?;
    server_result??;

    info!("pagewatch service stopped");
    Ok(())
}
