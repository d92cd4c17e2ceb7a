use heavyrain_core::CancellationToken;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Cancels `token` on SIGINT or SIGTERM. In-flight requests still run to completion.
pub(crate) fn spawn_signal_handler(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            () = ctrl_c() => {}
            () = terminate() => {}
        }
        tracing::info!("shutdown signal received");
        eprintln!("stopping: letting in-flight requests finish");
        token.cancel();
    })
}

async fn ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn terminate() {
    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            term.recv().await;
        }
        Err(err) => {
            tracing::warn!(error = %err, "failed to register SIGTERM handler");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
