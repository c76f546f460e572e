//! OS signal handling for graceful shutdown

use tokio::sync::mpsc;

use hivekeeper_core::prelude::*;

/// Which signal asked us to shut down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
}

/// Spawn a task that waits for SIGINT/SIGTERM (Ctrl+C on windows) and
/// reports it once on `tx`
pub fn spawn_signal_handler(tx: mpsc::Sender<ShutdownSignal>) {
    tokio::spawn(async move {
        let signal = match wait_for_signal().await {
            Ok(signal) => signal,
            Err(e) => {
                error!("Signal handler error: {}", e);
                return;
            }
        };

        info!("Shutdown signal received: {:?}", signal);
        let _ = tx.send(signal).await;
    });
}

/// Wait for a termination signal
async fn wait_for_signal() -> Result<ShutdownSignal> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())
            .map_err(|e| Error::signal(format!("Failed to create SIGINT handler: {}", e)))?;
        let mut sigterm = signal(SignalKind::terminate())
            .map_err(|e| Error::signal(format!("Failed to create SIGTERM handler: {}", e)))?;

        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT");
                Ok(ShutdownSignal::Interrupt)
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
                Ok(ShutdownSignal::Terminate)
            }
        }
    }

    #[cfg(windows)]
    {
        tokio::signal::ctrl_c()
            .await
            .map_err(|e| Error::signal(format!("Failed to listen for Ctrl+C: {}", e)))?;
        info!("Received Ctrl+C");
        Ok(ShutdownSignal::Interrupt)
    }
}
