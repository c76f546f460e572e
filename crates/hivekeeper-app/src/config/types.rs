//! Configuration types for hivekeeper
//!
//! Defines:
//! - `Settings` - Top-level `config.toml` contents
//! - `DaemonSettings`, `DownloadSettings`, `BootstrapSettings` - its sections

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use hivekeeper_core::prelude::*;
use hivekeeper_daemon::config::{
    BootstrapConfig, ServiceConfig, DEFAULT_BINARY_NAME, DEFAULT_READY_MARKER,
    DEFAULT_RELAY_CONFIG_KEY, DEFAULT_REPO_ENV_VAR,
};
use hivekeeper_daemon::rpc::DEFAULT_API_URL;

/// Directory name used under the platform config and data directories
pub const APP_DIR: &str = "hivekeeper";

/// Application settings (`config.toml`)
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub daemon: DaemonSettings,

    #[serde(default)]
    pub download: DownloadSettings,

    #[serde(default)]
    pub bootstrap: BootstrapSettings,
}

/// `[daemon]` section
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DaemonSettings {
    #[serde(default = "default_binary_name")]
    pub binary_name: String,

    /// Defaults to `<data_local_dir>/hivekeeper`
    #[serde(default)]
    pub bin_dir: Option<PathBuf>,

    /// Defaults to `<bin_dir>/repo`
    #[serde(default)]
    pub repo_dir: Option<PathBuf>,

    #[serde(default = "default_args")]
    pub args: Vec<String>,

    /// Rendered as `--enable-<name>` when true
    #[serde(default = "default_features")]
    pub features: BTreeMap<String, bool>,

    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,

    #[serde(default = "default_repo_env_var")]
    pub repo_env_var: String,

    #[serde(default = "default_init_args")]
    pub init_args: Vec<String>,

    #[serde(default = "default_ready_marker")]
    pub ready_marker: String,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            binary_name: default_binary_name(),
            bin_dir: None,
            repo_dir: None,
            args: default_args(),
            features: default_features(),
            api_url: default_api_url(),
            rpc_timeout_ms: default_rpc_timeout_ms(),
            repo_env_var: default_repo_env_var(),
            init_args: default_init_args(),
            ready_marker: default_ready_marker(),
        }
    }
}

/// `[download]` section. Downloading is off unless `url` is set.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct DownloadSettings {
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub version: Option<String>,
}

/// `[bootstrap]` section
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BootstrapSettings {
    #[serde(default = "default_config_key")]
    pub config_key: String,

    #[serde(default)]
    pub extra_relays: Vec<String>,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for BootstrapSettings {
    fn default() -> Self {
        Self {
            config_key: default_config_key(),
            extra_relays: Vec::new(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

fn default_binary_name() -> String {
    DEFAULT_BINARY_NAME.to_string()
}

fn default_args() -> Vec<String> {
    vec!["daemon".to_string()]
}

fn default_features() -> BTreeMap<String, bool> {
    BTreeMap::from([
        ("namesys-pubsub".to_string(), true),
        ("pubsub-experiment".to_string(), true),
    ])
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_rpc_timeout_ms() -> u64 {
    30_000
}

fn default_repo_env_var() -> String {
    DEFAULT_REPO_ENV_VAR.to_string()
}

fn default_init_args() -> Vec<String> {
    vec!["init".to_string()]
}

fn default_ready_marker() -> String {
    DEFAULT_READY_MARKER.to_string()
}

fn default_config_key() -> String {
    DEFAULT_RELAY_CONFIG_KEY.to_string()
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

/// `<data_local_dir>/hivekeeper`, or a temp-dir fallback on systems without one
pub fn default_bin_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR)
}

impl Settings {
    pub fn bin_dir(&self) -> PathBuf {
        self.daemon.bin_dir.clone().unwrap_or_else(default_bin_dir)
    }

    pub fn repo_dir(&self) -> PathBuf {
        self.daemon
            .repo_dir
            .clone()
            .unwrap_or_else(|| self.bin_dir().join("repo"))
    }

    pub fn api_url(&self) -> Result<Url> {
        Url::parse(&self.daemon.api_url).map_err(|e| {
            Error::configuration(format!("invalid api_url '{}': {}", self.daemon.api_url, e))
        })
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.daemon.rpc_timeout_ms)
    }

    /// Build and validate the immutable service configuration
    pub fn service_config(&self) -> Result<ServiceConfig> {
        self.api_url()?;

        let mut config = ServiceConfig::new(self.bin_dir(), self.repo_dir())
            .with_binary_name(self.daemon.binary_name.clone())
            .with_args(self.daemon.args.iter().cloned())
            .with_init_args(self.daemon.init_args.iter().cloned())
            .with_ready_marker(self.daemon.ready_marker.clone())
            .with_bootstrap(BootstrapConfig {
                config_key: self.bootstrap.config_key.clone(),
                extra_relays: self.bootstrap.extra_relays.clone(),
                connect_timeout: Duration::from_millis(self.bootstrap.connect_timeout_ms),
            });
        config.repo_env_var = self.daemon.repo_env_var.clone();
        config.features = self.daemon.features.clone();

        match (&self.download.url, &self.download.version) {
            (Some(url), Some(version)) => config = config.with_download(url.clone(), version.clone()),
            (Some(_), None) => {
                return Err(Error::configuration(
                    "download.version is required when download.url is set",
                ))
            }
            (None, _) => {}
        }

        config.validate()?;
        Ok(config)
    }
}
