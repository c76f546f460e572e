//! Relay bootstrap after the daemon becomes ready
//!
//! One pass: read the relay list from the daemon, then dial every relay
//! concurrently. Each outcome is logged on its own; nothing here can fail the
//! supervisor.

use std::sync::Arc;

use futures_util::future::join_all;
use tokio::task::JoinHandle;

use hivekeeper_core::prelude::*;
use hivekeeper_daemon::config::BootstrapConfig;
use hivekeeper_daemon::rpc::{relay_list, DaemonRpc};

/// What one bootstrap pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    /// Number of connect calls made
    pub attempted: usize,
    pub connected: Vec<String>,
    /// Failed relays with the reason
    pub failed: Vec<(String, String)>,
    /// Set when the relay list could not be read and nothing was attempted
    pub abandoned: Option<String>,
}

impl BootstrapReport {
    pub fn is_abandoned(&self) -> bool {
        self.abandoned.is_some()
    }
}

pub struct Bootstrapper<R> {
    rpc: Arc<R>,
    config: BootstrapConfig,
}

impl<R> Bootstrapper<R>
where
    R: DaemonRpc + Sync + 'static,
{
    pub fn new(rpc: Arc<R>, config: BootstrapConfig) -> Self {
        Self { rpc, config }
    }

    /// Daemon-provided relays followed by configured extras not already listed
    async fn relays(&self) -> Result<Vec<String>> {
        let mut relays = relay_list(self.rpc.as_ref(), &self.config.config_key).await?;
        for extra in &self.config.extra_relays {
            if !relays.contains(extra) {
                relays.push(extra.clone());
            }
        }
        Ok(relays)
    }

    pub async fn run(&self) -> BootstrapReport {
        let relays = match self.relays().await {
            Ok(relays) => relays,
            Err(e) => {
                warn!(
                    "Relay bootstrap abandoned, could not read '{}': {}",
                    self.config.config_key, e
                );
                return BootstrapReport {
                    abandoned: Some(e.to_string()),
                    ..Default::default()
                };
            }
        };

        info!("Bootstrapping {} relay(s)", relays.len());
        let timeout = self.config.connect_timeout;

        let attempts = relays.iter().map(|address| {
            let rpc = Arc::clone(&self.rpc);
            async move {
                let outcome = match tokio::time::timeout(timeout, rpc.connect(address)).await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(_) => Err(format!("timed out after {:?}", timeout)),
                };
                (address.clone(), outcome)
            }
        });

        let mut report = BootstrapReport {
            attempted: relays.len(),
            ..Default::default()
        };

        for (address, outcome) in join_all(attempts).await {
            match outcome {
                Ok(()) => {
                    info!("{} connected", address);
                    report.connected.push(address);
                }
                Err(reason) => {
                    warn!("{} failed: {}", address, reason);
                    report.failed.push((address, reason));
                }
            }
        }

        info!(
            "Relay bootstrap done: {} connected, {} failed",
            report.connected.len(),
            report.failed.len()
        );
        report
    }

    pub fn spawn(self) -> JoinHandle<BootstrapReport> {
        tokio::spawn(async move { self.run().await })
    }
}
