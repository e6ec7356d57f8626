//! Process signals to the shared shutdown flag.

use std::future::Future;
use tokio::signal;
use tokio::sync::watch;
use tracing::info;

/// Resolves on Ctrl+C or SIGTERM.
pub async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C signal"),
        _ = terminate => info!("Received SIGTERM signal"),
    }
}

/// Flips the flag once `trigger` resolves. Observers that already stopped
/// are ignored.
pub async fn signal_shutdown(trigger: impl Future<Output = ()>, flag: watch::Sender<bool>) {
    trigger.await;
    info!("Shutting down");
    let _ = flag.send(true);
}
