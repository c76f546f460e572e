//! Test utilities for daemon types
//!
//! A scripted [`DaemonRpc`] and shell scripts that stand in for the daemon
//! binary.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde_json::Value;

use hivekeeper_core::{Error, Result};

use crate::rpc::DaemonRpc;

/// Scripted RPC client recording every connect attempt
#[derive(Debug)]
pub struct MockRpc {
    config: std::result::Result<Value, String>,
    failing: HashSet<String>,
    connect_delay: Option<Duration>,
    connects: Mutex<Vec<String>>,
    config_calls: AtomicUsize,
}

impl Default for MockRpc {
    fn default() -> Self {
        Self {
            config: Ok(Value::Array(Vec::new())),
            failing: HashSet::new(),
            connect_delay: None,
            connects: Mutex::new(Vec::new()),
            config_calls: AtomicUsize::new(0),
        }
    }
}

impl MockRpc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer config reads with this relay list
    pub fn with_relays<I, S>(mut self, relays: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config = Ok(Value::Array(
            relays.into_iter().map(|r| Value::String(r.into())).collect(),
        ));
        self
    }

    /// Answer config reads with an arbitrary value
    pub fn with_config_value(mut self, value: Value) -> Self {
        self.config = Ok(value);
        self
    }

    /// Fail every config read
    pub fn with_config_error(mut self, message: impl Into<String>) -> Self {
        self.config = Err(message.into());
        self
    }

    /// Make connects to `address` fail
    pub fn failing(mut self, address: impl Into<String>) -> Self {
        self.failing.insert(address.into());
        self
    }

    /// Delay every connect
    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = Some(delay);
        self
    }

    /// Addresses passed to `connect`, in call order
    pub fn connect_calls(&self) -> Vec<String> {
        self.connects
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    pub fn config_calls(&self) -> usize {
        self.config_calls.load(Ordering::SeqCst)
    }
}

impl DaemonRpc for MockRpc {
    async fn get_config(&self, _key: &str) -> Result<Value> {
        self.config_calls.fetch_add(1, Ordering::SeqCst);
        self.config.clone().map_err(Error::rpc)
    }

    async fn connect(&self, address: &str) -> Result<()> {
        if let Ok(mut calls) = self.connects.lock() {
            calls.push(address.to_string());
        }
        if let Some(delay) = self.connect_delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.contains(address) {
            return Err(Error::rpc(format!("failed to dial {}", address)));
        }
        Ok(())
    }
}

/// Handles `<binary> init` by writing `$IPFS_PATH/config`
pub const INIT_HANDLER: &str = r#"if [ "$1" = "init" ]; then
  mkdir -p "$IPFS_PATH"
  echo '{}' > "$IPFS_PATH/config"
  exit 0
fi"#;

/// Starts, reports ready, then runs until interrupted
pub const SERVING_DAEMON: &str = r#"trap 'echo "Received interrupt signal, shutting down..."; exit 0' INT
echo "Initializing daemon..."
echo "API server listening on /ip4/127.0.0.1/tcp/5001"
echo "Daemon is ready"
while :; do sleep 0.05; done"#;

/// Starts, reports ready, then dies on its own
pub const CRASHING_DAEMON: &str = r#"echo "Initializing daemon..."
echo "Daemon is ready"
sleep 0.2
echo "Error: repo lock lost" >&2
exit 1"#;

/// Exits before ever becoming ready
pub const BROKEN_DAEMON: &str = r#"echo "Error: cannot acquire lock" >&2
exit 1"#;

/// Full script text running `body` after [`INIT_HANDLER`], e.g. to serve as a download
pub fn fake_daemon_script(body: &str) -> String {
    format!("#!/bin/sh\n{}\n{}\n", INIT_HANDLER, body)
}

/// Write [`fake_daemon_script`] as an executable `ipfs` in `dir`
#[cfg(unix)]
pub fn write_fake_daemon(dir: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    std::fs::create_dir_all(dir).expect("create fake daemon dir");
    let path = dir.join("ipfs");
    std::fs::write(&path, fake_daemon_script(body)).expect("write fake daemon");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("chmod fake daemon");
    path
}
