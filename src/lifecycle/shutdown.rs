//! Signal handling for graceful shutdown

use tracing::{debug, warn};

/// Handles shutdown requests (Ctrl-C / console close, SIGTERM on Unix)
pub struct ShutdownSignal;

impl ShutdownSignal {
    /// Create a new shutdown signal handler
    pub fn new() -> Self {
        Self
    }

    /// Wait for a shutdown signal
    pub async fn wait(&self) {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = sigterm.recv() => debug!("received SIGTERM"),
                        _ = ctrl_c() => {}
                    }
                    return;
                }
                Err(e) => warn!(error = %e, "failed to register SIGTERM handler"),
            }
        }

        ctrl_c().await;
    }
}

async fn ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => debug!("received Ctrl-C"),
        Err(e) => {
            warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}
