//! Shutdown signal handling

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Resolve on Ctrl+C, or SIGTERM on Unix
pub async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let term_signal = match signal(SignalKind::terminate()) {
            Ok(sig) => Some(sig),
            Err(e) => {
                warn!("SIGTERM handler unavailable ({}); only Ctrl+C will stop the bridge", e);
                None
            },
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = async {
                match term_signal {
                    Some(mut sig) => { sig.recv().await; },
                    None => std::future::pending::<()>().await,
                }
            } => {},
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Cancel `token` once a shutdown signal arrives
pub fn cancel_on_signal(token: CancellationToken) {
    tokio::spawn(async move {
        wait_for_shutdown().await;
        info!("Shutdown signal received");
        token.cancel();
    });
}
